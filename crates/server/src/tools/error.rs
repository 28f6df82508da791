use crate::rate_limit::RateLimitExceeded;

/// Why a tool handler failed.
///
/// These are application-level failures: the dispatcher reports them as
/// `isError` content, never as an envelope error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error("{0}")]
    Upstream(String),

    #[error("{0} API key is not configured")]
    MissingApiKey(&'static str),
}

impl ToolError {
    /// Text placed in the `isError` content block.
    pub fn to_content_text(&self) -> String {
        format!("Error: {}", self)
    }
}
