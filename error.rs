use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store Initialization Failed: {0}")]
    StoreInit(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Persistence Error: {0}")]
    Persistence(String),

    #[error("Selection Error: {0}")]
    Selection(String),

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("AI Error: credential rejected: {0}")]
    Auth(String),

    #[error("AI Error: rate limited: {0}")]
    RateLimited(String),

    #[error("AI Error: transient failure: {0}")]
    Transient(String),

    #[error("AI Error: response contained no usable text")]
    MalformedResponse,

    #[error("AI Error: {0}")]
    RemoteCallFailed(String),
}

impl Error {
    /// Whether a captioning failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Transient(_) | Error::MalformedResponse
        )
    }
}
