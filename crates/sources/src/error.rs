use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{source_id} answered with status {status}")]
    Status { source_id: String, status: u16 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}
