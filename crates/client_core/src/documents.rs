use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use shared::{
    domain::{CaseId, DocumentType, ObjectPath},
    protocol::{DocumentRecord, NewDocument, StoredObject, UploadOptions},
};
use tracing::{error, info, warn};

use crate::{error::OperationError, notify::Notifier, BinaryStore, EntityStore};

const UPLOAD_SUCCEEDED: &str = "Document uploaded successfully";
const UPLOAD_FAILED: &str = "Failed to upload document";

/// Case documents: a stored payload plus a metadata row pointing at it.
pub struct DocumentService {
    entities: Arc<dyn EntityStore>,
    objects: Arc<dyn BinaryStore>,
    notifier: Arc<dyn Notifier>,
    cache_control: String,
}

impl DocumentService {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        objects: Arc<dyn BinaryStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            entities,
            objects,
            notifier,
            cache_control: UploadOptions::default().cache_control,
        }
    }

    pub fn with_cache_control(mut self, seconds: u32) -> Self {
        self.cache_control = seconds.to_string();
        self
    }

    /// Stores `bytes` at `{case_id}/{name}` and then registers a finalized
    /// document record for it.
    ///
    /// Nothing is overwritten: an existing payload at the same path fails the
    /// upload before any metadata is written. If the metadata insert fails
    /// the payload stays stored and the error is [`OperationError::PartialWrite`].
    pub async fn upload_document(
        &self,
        case_id: &CaseId,
        bytes: Vec<u8>,
        name: &str,
        doc_type: DocumentType,
    ) -> Result<StoredObject, OperationError> {
        let path = ObjectPath::for_document(case_id, name);
        let options = UploadOptions {
            cache_control: self.cache_control.clone(),
            upsert: false,
            content_type: mime_guess::from_path(name).first_raw().map(str::to_string),
        };
        let size_bytes = bytes.len();

        let stored = match self.objects.upload(&path, bytes, &options).await {
            Ok(stored) => stored,
            Err(source) => {
                error!(%case_id, %path, error = ?source, "document payload upload failed");
                self.notifier.error(UPLOAD_FAILED);
                return Err(OperationError::BinaryWrite { path, source });
            }
        };

        let record = NewDocument::finalized(case_id.clone(), name, doc_type, &stored, Utc::now());
        if let Err(source) = self.entities.insert_document(&record).await {
            warn!(
                %case_id,
                orphaned_path = %stored.path,
                error = ?source,
                "document metadata insert failed after payload was stored"
            );
            self.notifier.error(UPLOAD_FAILED);
            return Err(OperationError::PartialWrite {
                orphaned_path: stored.path,
                source,
            });
        }

        info!(%case_id, path = %stored.path, size_bytes, %doc_type, "document uploaded");
        self.notifier.success(UPLOAD_SUCCEEDED);
        Ok(stored)
    }

    pub async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<DocumentRecord>> {
        self.entities.list_documents(case_id).await.map_err(|error| {
            warn!(%case_id, error = ?error, "document listing failed");
            error.context(format!("failed to list documents of case {case_id}"))
        })
    }

    /// Fetches the payload a document record points at.
    pub async fn download_document(&self, document: &DocumentRecord) -> Result<Vec<u8>> {
        self.objects.download(&document.url).await.map_err(|error| {
            warn!(
                case_id = %document.case_id,
                path = %document.url,
                error = ?error,
                "document download failed"
            );
            error.context(format!("failed to download document {}", document.url))
        })
    }
}
