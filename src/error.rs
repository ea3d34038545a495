use thiserror::Error;

/// Errors produced by the payment core.
///
/// `NotFound` deliberately covers both a missing order and an order that
/// belongs to somebody else, so callers cannot learn whether it exists.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<std::io::Error> for PaymentError {
    fn from(err: std::io::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
