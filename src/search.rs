//! Scholarly publication search.
//!
//! [`SearchProvider`] maps a free-text query to at most `limit`
//! [`Publication`]s. The production provider fetches a Google Scholar results
//! page with `ureq` and scrapes it with `scraper`. Result entries that cannot
//! be parsed are skipped, so a partially malformed page still yields the
//! entries that did parse.

use std::sync::LazyLock;
use std::time::Duration;

use miette::Diagnostic;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Publication, NOT_AVAILABLE};

/// Errors from the search provider.
#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("search request failed: {message}")]
    #[diagnostic(
        code(libris::search::request_failed),
        help("The search provider may be rate limiting this host. Try again later.")
    )]
    RequestFailed { message: String },

    #[error("search response could not be read: {message}")]
    #[diagnostic(
        code(libris::search::response),
        help("The provider returned a body that is not valid text.")
    )]
    Response { message: String },
}

/// Result type for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Default number of results fetched per query.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Source of publication records.
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> SearchResult<Vec<Publication>>;
}

/// Configuration for [`ScholarSearch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://scholar.google.com".into(),
            max_results: DEFAULT_MAX_RESULTS,
            timeout_secs: 15,
            user_agent: concat!("libris/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Google Scholar results-page scraper.
pub struct ScholarSearch {
    config: SearchConfig,
    agent: ureq::Agent,
}

impl ScholarSearch {
    pub fn new(config: SearchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        Self { config, agent }
    }
}

impl SearchProvider for ScholarSearch {
    fn search(&self, query: &str, limit: usize) -> SearchResult<Vec<Publication>> {
        let url = format!("{}/scholar", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .agent
            .get(&url)
            .query("q", query)
            .query("hl", "en")
            .call()
            .map_err(|e| SearchError::RequestFailed {
                message: e.to_string(),
            })?;
        let body = resp.into_string().map_err(|e| SearchError::Response {
            message: e.to_string(),
        })?;

        let results = parse_results_page(&body, limit);
        tracing::debug!(query, count = results.len(), "scholar search complete");
        Ok(results)
    }
}

/// Run a search, degrading any provider failure to an empty list.
pub fn search_or_empty(provider: &dyn SearchProvider, query: &str, limit: usize) -> Vec<Publication> {
    match provider.search(query, limit) {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(query, error = %e, "search failed, returning no results");
            Vec::new()
        }
    }
}

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap_or_else(|e| panic!("year pattern: {e}"))
});

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a leading `[PDF]`/`[BOOK]`/`[CITATION]` style marker from a title.
fn strip_kind_marker(title: &str) -> &str {
    let mut rest = title.trim_start();
    while rest.starts_with('[') {
        match rest.find(']') {
            Some(end) => rest = rest[end + 1..].trim_start(),
            None => break,
        }
    }
    rest
}

/// Parse a Google Scholar results page into publications.
///
/// Each `div.gs_ri` block is one result. The title comes from `h3.gs_rt`
/// (required), the URL from its link, and the author list and year from the
/// `div.gs_a` byline ("A Author, B Author - Journal, 2019 - publisher").
pub fn parse_results_page(html: &str, limit: usize) -> Vec<Publication> {
    let document = Html::parse_document(html);
    let (Some(result_sel), Some(title_sel), Some(link_sel), Some(byline_sel)) = (
        selector("div.gs_ri"),
        selector("h3.gs_rt"),
        selector("h3.gs_rt a"),
        selector("div.gs_a"),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in document.select(&result_sel) {
        if out.len() >= limit {
            break;
        }

        let Some(title_el) = entry.select(&title_sel).next() else {
            continue;
        };
        let title = strip_kind_marker(&element_text(title_el)).to_string();
        if title.is_empty() {
            continue;
        }

        let url = entry
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let byline = entry.select(&byline_sel).next().map(element_text);
        let author = byline
            .as_deref()
            .and_then(|b| b.split(" - ").next())
            .map(|a| a.trim().trim_end_matches('…').trim_end_matches(',').trim())
            .filter(|a| !a.is_empty())
            .unwrap_or(NOT_AVAILABLE)
            .to_string();
        let year = byline
            .as_deref()
            .and_then(|b| YEAR_RE.find(b))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        out.push(Publication {
            title,
            author,
            year,
            url,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
      <div class="gs_r">
        <div class="gs_ri">
          <h3 class="gs_rt"><span class="gs_ctg2">[PDF]</span>
            <a href="https://example.org/whaling">Whaling and the  American economy</a></h3>
          <div class="gs_a">J Smith, K Jones - Journal of Maritime History, 1998 - example.org</div>
        </div>
      </div>
      <div class="gs_r">
        <div class="gs_ri">
          <div class="gs_a">No title here - 2001</div>
        </div>
      </div>
      <div class="gs_r">
        <div class="gs_ri">
          <h3 class="gs_rt"><span>[CITATION]</span> Letters from Nantucket</h3>
        </div>
      </div>
      <div class="gs_r">
        <div class="gs_ri">
          <h3 class="gs_rt"><a href="https://example.org/third">Third result</a></h3>
          <div class="gs_a">A Author - Press, 2015</div>
        </div>
      </div>
    </body></html>"#;

    #[test]
    fn parses_complete_and_partial_entries() {
        let results = parse_results_page(PAGE, 10);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].title, "Whaling and the American economy");
        assert_eq!(results[0].author, "J Smith, K Jones");
        assert_eq!(results[0].year, "1998");
        assert_eq!(results[0].url, "https://example.org/whaling");

        assert_eq!(results[1].title, "Letters from Nantucket");
        assert_eq!(results[1].author, NOT_AVAILABLE);
        assert_eq!(results[1].year, NOT_AVAILABLE);
        assert_eq!(results[1].url, NOT_AVAILABLE);
    }

    #[test]
    fn respects_limit() {
        let results = parse_results_page(PAGE, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_results_page("<<not html", 10).is_empty());
    }

    struct Failing;

    impl SearchProvider for Failing {
        fn search(&self, _query: &str, _limit: usize) -> SearchResult<Vec<Publication>> {
            Err(SearchError::RequestFailed {
                message: "429 Too Many Requests".into(),
            })
        }
    }

    #[test]
    fn failures_degrade_to_empty() {
        assert!(search_or_empty(&Failing, "whaling", 10).is_empty());
    }

    #[test]
    fn unreachable_provider_errors() {
        let provider = ScholarSearch::new(SearchConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        });
        assert!(provider.search("whaling", 5).is_err());
    }
}
