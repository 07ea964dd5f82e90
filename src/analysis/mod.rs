//! Finding-aid analysis through an external language model.
//!
//! The model is asked for a summary followed by a line reading
//! `Research Topics:` and one topic per line. [`parse_response`] splits on
//! the first occurrence of that marker; a response without it is all
//! summary. [`AnalysisClient`] adds a fixed retry cap and an owned LRU memo
//! on top of any [`CompletionBackend`].

pub mod cache;
pub mod error;
pub mod openai;

use serde::{Deserialize, Serialize};

use crate::model::EducationLevel;

pub use cache::{AnalysisCache, CacheKey, CacheStats, DEFAULT_CACHE_CAPACITY};
pub use error::{AnalysisError, AnalysisResult};
pub use openai::{OpenAiBackend, OpenAiConfig};

/// Marker line separating the summary from the topic list.
pub const TOPICS_MARKER: &str = "Research Topics:";

/// Sampling temperature sent with every request.
pub const TEMPERATURE: f32 = 0.7;

/// Completion token limit sent with every request.
pub const MAX_TOKENS: u32 = 1000;

/// Default attempt cap for one analysis.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Everything a backend needs for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A text-completion service.
pub trait CompletionBackend: Send + Sync {
    /// Run one completion and return the assistant's text.
    fn complete(&self, request: &CompletionRequest) -> AnalysisResult<String>;
}

/// Parsed result of one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub research_topics: Vec<String>,
}

/// Tunables for [`AnalysisClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Total attempts per analysis, including the first.
    pub max_attempts: u32,
    /// Memo capacity. Zero disables memoization.
    pub cache_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Build the system + user prompt for a text and audience.
pub fn build_request(text: &str, level: EducationLevel) -> CompletionRequest {
    let system = format!(
        "You are an AI assistant analyzing a finding aid for a {level} student. \
         Provide a summary of the finding aid and suggest 5 research topics based on \
         its content. Start the research topics with '{TOPICS_MARKER}' on a new line."
    );
    let user = format!("Analyze this finding aid for a {level} student: {text}");

    CompletionRequest {
        messages: vec![
            ChatMessage {
                role: Role::System,
                content: system,
            },
            ChatMessage {
                role: Role::User,
                content: user,
            },
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    }
}

/// Split a model response into summary and topics.
///
/// Fails only when no summary text remains.
pub fn parse_response(content: &str) -> AnalysisResult<Analysis> {
    let (summary, research_topics) = match content.split_once(TOPICS_MARKER) {
        Some((summary, topics)) => (
            summary.trim(),
            topics
                .lines()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        None => (content.trim(), Vec::new()),
    };

    if summary.is_empty() {
        return Err(AnalysisError::EmptySummary);
    }

    Ok(Analysis {
        summary: summary.to_string(),
        research_topics,
    })
}

/// Analysis client: retries, parsing, and memoization over a backend.
pub struct AnalysisClient {
    backend: Box<dyn CompletionBackend>,
    cache: AnalysisCache,
    max_attempts: u32,
}

impl AnalysisClient {
    pub fn new(backend: impl CompletionBackend + 'static, config: AnalysisConfig) -> Self {
        Self {
            backend: Box::new(backend),
            cache: AnalysisCache::new(config.cache_capacity),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Analyze `text` for the given audience.
    ///
    /// Served from the memo when possible. Otherwise calls the backend up to
    /// `max_attempts` times; the last failure is reported as
    /// [`AnalysisError::Exhausted`]. Errors that cannot succeed on retry
    /// (missing API key) are returned immediately.
    pub fn analyze(&self, text: &str, level: EducationLevel) -> AnalysisResult<Analysis> {
        let key = CacheKey::new(text, level);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(%level, chars = text.len(), "analysis served from cache");
            return Ok(hit);
        }

        let request = build_request(text, level);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self
                .backend
                .complete(&request)
                .and_then(|content| parse_response(&content))
            {
                Ok(analysis) => {
                    tracing::info!(
                        %level,
                        attempt,
                        topics = analysis.research_topics.len(),
                        "finding aid analyzed"
                    );
                    self.cache.insert(key, analysis.clone());
                    return Ok(analysis);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "analysis attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(AnalysisError::Exhausted {
            attempts: self.max_attempts,
            message: last_error,
        })
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl std::fmt::Debug for AnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisClient")
            .field("max_attempts", &self.max_attempts)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Backend replaying scripted outcomes and counting calls.
    struct Scripted {
        outcomes: Mutex<VecDeque<AnalysisResult<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(outcomes: Vec<AnalysisResult<String>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    outcomes: Mutex::new(outcomes.into()),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl CompletionBackend for Scripted {
        fn complete(&self, _request: &CompletionRequest) -> AnalysisResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("Fallback summary.".into()))
        }
    }

    fn transient() -> AnalysisResult<String> {
        Err(AnalysisError::RequestFailed {
            message: "connection reset".into(),
        })
    }

    const RESPONSE: &str = "The papers of a whaling family, 1820-1870.\n\n\
        Research Topics:\n1. Maritime labor\n\n  2. Family correspondence  \n3. Trade routes\n";

    #[test]
    fn parse_splits_on_marker() {
        let analysis = parse_response(RESPONSE).unwrap();
        assert_eq!(analysis.summary, "The papers of a whaling family, 1820-1870.");
        assert_eq!(
            analysis.research_topics,
            vec![
                "1. Maritime labor",
                "2. Family correspondence",
                "3. Trade routes"
            ]
        );
        assert!(analysis
            .research_topics
            .iter()
            .all(|t| !t.is_empty() && t.trim() == t));
    }

    #[test]
    fn parse_without_marker_is_all_summary() {
        let analysis = parse_response("  Just a summary, no topics.\nSecond line.  ").unwrap();
        assert_eq!(analysis.summary, "Just a summary, no topics.\nSecond line.");
        assert!(analysis.research_topics.is_empty());
    }

    #[test]
    fn parse_splits_on_first_marker_only() {
        let analysis =
            parse_response("Summary.\nResearch Topics:\nA\nResearch Topics: again").unwrap();
        assert_eq!(analysis.summary, "Summary.");
        assert_eq!(analysis.research_topics, vec!["A", "Research Topics: again"]);
    }

    #[test]
    fn parse_empty_summary_is_error() {
        assert!(matches!(
            parse_response("Research Topics:\nA\nB"),
            Err(AnalysisError::EmptySummary)
        ));
        assert!(parse_response("   ").is_err());
    }

    #[test]
    fn prompt_mentions_level_and_marker() {
        let request = build_request("Box 1: letters", EducationLevel::Undergraduate);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("undergraduate student"));
        assert!(request.messages[0].content.contains(TOPICS_MARKER));
        assert!(request.messages[1].content.ends_with("Box 1: letters"));
        assert_eq!(request.max_tokens, MAX_TOKENS);
    }

    #[test]
    fn retries_once_then_succeeds() {
        let (backend, calls) = Scripted::new(vec![transient(), Ok(RESPONSE.into())]);
        let client = AnalysisClient::new(backend, AnalysisConfig::default());
        let analysis = client.analyze("text", EducationLevel::Graduate).unwrap();
        assert_eq!(analysis.research_topics.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn two_failures_exhaust_attempts() {
        let (backend, calls) = Scripted::new(vec![transient(), transient()]);
        let client = AnalysisClient::new(backend, AnalysisConfig::default());
        let err = client.analyze("text", EducationLevel::Graduate).unwrap_err();
        assert!(matches!(err, AnalysisError::Exhausted { attempts: 2, .. }));
        assert!(err.to_string().contains("2 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_summary_counts_as_failed_attempt() {
        let (backend, calls) =
            Scripted::new(vec![Ok("Research Topics:\nA".into()), Ok(RESPONSE.into())]);
        let client = AnalysisClient::new(backend, AnalysisConfig::default());
        let analysis = client.analyze("text", EducationLevel::Graduate).unwrap();
        assert!(!analysis.summary.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_api_key_is_not_retried() {
        let (backend, calls) = Scripted::new(vec![Err(AnalysisError::MissingApiKey)]);
        let client = AnalysisClient::new(backend, AnalysisConfig::default());
        let err = client.analyze("text", EducationLevel::Graduate).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingApiKey));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cached_inputs_skip_the_backend() {
        let (backend, calls) = Scripted::new(vec![Ok(RESPONSE.into())]);
        let client = AnalysisClient::new(backend, AnalysisConfig::default());

        let first = client.analyze("same text", EducationLevel::Doctoral).unwrap();
        let second = client.analyze("same text", EducationLevel::Doctoral).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.cache().stats().hits, 1);

        // A different level is a different input.
        client.analyze("same text", EducationLevel::Graduate).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let (backend, calls) =
            Scripted::new(vec![transient(), transient(), Ok(RESPONSE.into())]);
        let client = AnalysisClient::new(backend, AnalysisConfig::default());
        assert!(client.analyze("text", EducationLevel::Graduate).is_err());
        assert!(client.analyze("text", EducationLevel::Graduate).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn capacity_overflow_evicts_oldest_input() {
        let (backend, calls) = Scripted::new(vec![]);
        let client = AnalysisClient::new(
            backend,
            AnalysisConfig {
                cache_capacity: 2,
                ..Default::default()
            },
        );
        for text in ["a", "b", "c"] {
            client.analyze(text, EducationLevel::Graduate).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // "a" was evicted, "c" is still memoized.
        client.analyze("c", EducationLevel::Graduate).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        client.analyze("a", EducationLevel::Graduate).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let (backend, calls) = Scripted::new(vec![Ok(RESPONSE.into())]);
        let client = AnalysisClient::new(
            backend,
            AnalysisConfig {
                max_attempts: 0,
                ..Default::default()
            },
        );
        assert_eq!(client.max_attempts(), 1);
        client.analyze("text", EducationLevel::Graduate).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
