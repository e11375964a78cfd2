use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::error::{InvalidRecord, StoreError};
use crate::favorites_registry::MutationOutcome;

/// JSON envelope returned by every C ABI call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    BadRequest(String),
    /// The call took effect in memory but storage reported a problem.
    StorageWarning(String),
    Ok(String),
}

impl From<StoreError> for AppResponse {
    fn from(err: StoreError) -> Self {
        AppResponse::StorageWarning(err.to_string())
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<InvalidRecord> for AppResponse {
    fn from(err: InvalidRecord) -> Self {
        AppResponse::BadRequest(err.to_string())
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    /// Response for a mutation: `Ok(body)` when the change was persisted or
    /// nothing changed, `StorageWarning` when it lives in memory only.
    pub fn from_outcome(outcome: &MutationOutcome, body: impl Into<String>) -> Self {
        match outcome.warning() {
            Some(warning) => AppResponse::from(warning.clone()),
            None => AppResponse::Ok(body.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }
}
