use thiserror::Error;

use crate::capability::CapabilityClass;

pub type Result<T> = std::result::Result<T, StocklensError>;

#[derive(Debug, Error)]
pub enum StocklensError {
    #[error("all providers failed for {context} ({class})")]
    Exhausted {
        context: String,
        class: CapabilityClass,
    },

    #[error("malformed response for {context}: {reason}")]
    MalformedResponse { context: String, reason: String },

    #[error("config load failed: {0}")]
    ConfigLoad(String),

    #[error("config validation failed: {0}")]
    ConfigValidation(String),

    #[error("stock list error: {0}")]
    StockList(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
