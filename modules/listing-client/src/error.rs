use thiserror::Error;

pub type Result<T> = std::result::Result<T, ListingError>;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Search request failed with status: {0}")]
    RequestFailed(String),
}

impl From<reqwest::Error> for ListingError {
    fn from(err: reqwest::Error) -> Self {
        ListingError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ListingError {
    fn from(err: serde_json::Error) -> Self {
        ListingError::Parse(err.to_string())
    }
}
