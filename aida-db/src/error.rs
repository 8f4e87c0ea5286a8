/// Error taxonomy for `aida-db`.
///
/// `NotFound` on metadata reads never reaches a caller as an `Err` — see
/// `metadata::MetadataStore`, which swallows it and logs a warning instead.
/// Every other variant bubbles up with this type attached.
#[derive(Debug, thiserror::Error)]
pub enum AidaError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("decode error: expected {expected} bytes, got {got}")]
    DecodeSize { expected: usize, got: usize },

    #[error("chain id mismatch: target={target:?}, source={source:?}")]
    ChainMismatch { target: Option<u64>, source: Option<u64> },

    #[error("block ranges do not align: target=[{target_first},{target_last}], source=[{source_first},{source_last}]")]
    RangeMismatch { target_first: u64, target_last: u64, source_first: u64, source_last: u64 },

    #[error("{0}")]
    AlignmentMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upstream request timed out")]
    Timeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A resource-release error (closing a bulk-load handle, releasing an
    /// iterator) joined onto the primary error of the operation that was in
    /// flight when release was attempted.
    #[error("{primary}; additionally, failed to release {resource}: {release_error}")]
    Joined { primary: Box<AidaError>, resource: String, release_error: Box<AidaError> },
}

impl AidaError {
    pub fn join(primary: AidaError, resource: impl Into<String>, release_error: AidaError) -> Self {
        AidaError::Joined {
            primary: Box::new(primary),
            resource: resource.into(),
            release_error: Box::new(release_error),
        }
    }
}

pub type Result<T> = std::result::Result<T, AidaError>;
