//! Error taxonomy for the favorites core and its collaborators.

use thiserror::Error;

/// Failures of the durable favorites slot.
///
/// Neither variant is fatal: the registry converts both into advisories and
/// keeps serving its in-memory list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The persisted slot exists but is not a valid favorites array.
    #[error("Corrupt favorites state: {0}")]
    CorruptState(String),
    /// The backing storage refused a read or write (quota, disabled, I/O).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<lmdb::Error> for StoreError {
    fn from(err: lmdb::Error) -> Self {
        match err {
            lmdb::Error::MapFull => {
                StoreError::StorageUnavailable("storage quota exceeded (LMDB map full)".to_string())
            }
            lmdb::Error::Corrupted | lmdb::Error::Invalid | lmdb::Error::VersionMismatch => {
                StoreError::CorruptState(format!("LMDB environment unreadable: {err}"))
            }
            other => StoreError::StorageUnavailable(format!("LMDB error: {other}")),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::StorageUnavailable(format!("IO error: {err}"))
    }
}

/// Failures of the image collaborators (random fetch, proxy, share).
///
/// These are user-visible and retryable; they never touch favorites state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("Failed to fetch cat image: {0}")]
    Fetch(String),
    #[error("Failed to share image: {0}")]
    Share(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An [`ImageRecord`](crate::image_record::ImageRecord) that does not satisfy
/// the provider contract (empty id, URL that is not absolute http/https).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid image record: {0}")]
pub struct InvalidRecord(pub String);
