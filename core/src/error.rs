use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("render error: {0}")]
    Render(String),
    #[error("transcode error: {0}")]
    Transcode(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CoreError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
            || matches!(self, CoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }
}
