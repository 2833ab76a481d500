use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CaseId, CaseStatus, DocumentId, DocumentStatus, DocumentType, ObjectPath};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub case_number: String,
    pub borrower_name: String,
    pub property_address: String,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCase {
    pub case_number: String,
    pub borrower_name: String,
    pub property_address: String,
    #[serde(default)]
    pub status: CaseStatus,
}

/// Body of the single-field case update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStatusPatch {
    pub status: CaseStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub case_id: CaseId,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub url: ObjectPath,
}

/// Metadata registered for a payload that has already been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub case_id: CaseId,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub url: ObjectPath,
}

impl NewDocument {
    /// Builds the record for a freshly stored upload. Taking the
    /// [`StoredObject`] by reference ties the record to a completed write.
    pub fn finalized(
        case_id: CaseId,
        title: impl Into<String>,
        doc_type: DocumentType,
        stored: &StoredObject,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id,
            title: title.into(),
            doc_type,
            status: DocumentStatus::Finalized,
            created_at,
            url: stored.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: ObjectPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Cache lifetime in seconds, sent as `max-age`.
    pub cache_control: String,
    pub upsert: bool,
    pub content_type: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            upsert: false,
            content_type: None,
        }
    }
}

/// Response of the object upload endpoint; `Key` is `{bucket}/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageUploadResponse {
    #[serde(rename = "Key")]
    pub key: String,
}
