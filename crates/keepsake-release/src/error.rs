use keepsake_crypto::CryptoError;
use keepsake_storage::BlobError;
use thiserror::Error;

pub type ReleaseResult<T> = Result<T, ReleaseError>;

#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Membership change on a released bundle.
    #[error("bundle {0} is released; its items and trustees are frozen")]
    BundleFrozen(String),

    #[error("bundle {0} was already released")]
    AlreadyReleased(String),

    #[error("bundle is not released")]
    NotReleased,

    #[error("release access window has closed")]
    AccessWindowClosed,

    /// No bundle for the given id or token. The token itself is never rendered.
    #[error("bundle not found")]
    BundleNotFound,

    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// Trustee-side failure. Says nothing about which step failed.
    #[error("unable to access item {item_id}")]
    ItemInaccessible { item_id: String },

    #[error("unable to access the bundle note")]
    NoteInaccessible,

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<BlobError> for ReleaseError {
    fn from(e: BlobError) -> Self {
        ReleaseError::Storage(e.to_string())
    }
}
