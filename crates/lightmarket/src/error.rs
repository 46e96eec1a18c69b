use thiserror::Error;

/// Errors returned by lightmarket operations.
#[derive(Debug, Error)]
pub enum LightmarketError {
    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("processor error: {0}")]
    Processor(String),

    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
