use shared::domain::{CaseId, ObjectPath};
use thiserror::Error;

/// Failure of a user-triggered mutation. Each variant is scoped to the one
/// interaction that produced it.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("failed to update status of case {case_id}: {source}")]
    RemoteUpdate {
        case_id: CaseId,
        source: anyhow::Error,
    },
    #[error("failed to store document at {path}: {source}")]
    BinaryWrite {
        path: ObjectPath,
        source: anyhow::Error,
    },
    /// The payload was stored but its metadata record was not; the payload
    /// is left in place, unreferenced.
    #[error("stored {orphaned_path} but failed to register its metadata: {source}")]
    PartialWrite {
        orphaned_path: ObjectPath,
        source: anyhow::Error,
    },
    #[error("failed to load case {case_id}: {source}")]
    CaseLookup {
        case_id: CaseId,
        source: anyhow::Error,
    },
    #[error("case {0} not found")]
    MissingCase(CaseId),
}

impl OperationError {
    /// Path of a payload left behind by a partially failed upload.
    pub fn orphaned_path(&self) -> Option<&ObjectPath> {
        match self {
            Self::PartialWrite { orphaned_path, .. } => Some(orphaned_path),
            _ => None,
        }
    }
}
