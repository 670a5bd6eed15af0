use thiserror::Error;

/// Errors returned by a [`crate::GitlabApi`] implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("client configuration error: {0}")]
    Config(String),
}
