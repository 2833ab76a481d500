use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{CaseId, CaseStatus, ObjectPath},
    protocol::{
        CaseRecord, DocumentRecord, NewCase, NewDocument, StoredObject, UploadOptions,
    },
};

pub mod directory;
pub mod documents;
pub mod error;
mod local;
pub mod notify;
pub mod remote;
pub mod status_control;

pub use directory::CaseDirectory;
pub use documents::DocumentService;
pub use error::OperationError;
pub use notify::{
    BroadcastNotifier, Notification, NotificationLevel, Notifier, TracingNotifier,
};
pub use remote::{RemoteBackend, RemoteConfig};
pub use status_control::{CaseStatusControl, StatusSelection};

/// Row-level access to cases and their document metadata.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Sets `status` on the case whose id matches exactly. A missing case is
    /// an error.
    async fn update_case_status(&self, case_id: &CaseId, status: CaseStatus) -> Result<()>;
    async fn insert_document(&self, document: &NewDocument) -> Result<DocumentRecord>;
    async fn list_cases(&self) -> Result<Vec<CaseRecord>>;
    async fn get_case(&self, case_id: &CaseId) -> Result<Option<CaseRecord>>;
    async fn insert_case(&self, case: &NewCase) -> Result<CaseRecord>;
    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<DocumentRecord>>;
}

/// Path-addressed binary payloads.
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Writes `bytes` at `path`. With `options.upsert == false` an existing
    /// payload makes the write fail.
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredObject>;
    async fn download(&self, path: &ObjectPath) -> Result<Vec<u8>>;
    async fn exists(&self, path: &ObjectPath) -> Result<bool>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
