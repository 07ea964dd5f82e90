//! Errors from the analysis subsystem.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error("no API key configured for the analysis service")]
    #[diagnostic(
        code(libris::analysis::missing_api_key),
        help("Set FAA_OPENAI_API_KEY or `openai.api_key` in config.toml.")
    )]
    MissingApiKey,

    #[error("analysis request failed: {message}")]
    #[diagnostic(
        code(libris::analysis::request_failed),
        help("Check network connectivity and that the API key and model are valid.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse analysis response: {message}")]
    #[diagnostic(
        code(libris::analysis::parse_error),
        help("The service returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("analysis response contained no summary")]
    #[diagnostic(
        code(libris::analysis::empty_summary),
        help("The model returned only topics or whitespace. Retrying usually helps.")
    )]
    EmptySummary,

    #[error("failed to analyze finding aid after {attempts} attempts: {message}")]
    #[diagnostic(
        code(libris::analysis::exhausted),
        help("The analysis service kept failing. Try again later or check its status page.")
    )]
    Exhausted { attempts: u32, message: String },
}

impl AnalysisError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingApiKey | Self::Exhausted { .. })
    }
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
