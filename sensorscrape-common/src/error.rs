use thiserror::Error;

/// Common error type for sensorscrape components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),
}

/// Result type alias using sensorscrape's Error.
pub type Result<T> = std::result::Result<T, Error>;
