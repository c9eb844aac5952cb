use thiserror::Error;

/// Failure while fetching or parsing one feed. Callers record these in a
/// fetch log row; they never abort the surrounding batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed parse error: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Failure while extracting content from an article page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("no readable content found")]
    NoContent,
}
