use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{CaseId, CaseStatus, ObjectPath},
    protocol::{CaseRecord, DocumentRecord, NewCase, NewDocument, StoredObject, UploadOptions},
};
use storage::Storage;

use crate::{BinaryStore, EntityStore};

#[async_trait]
impl EntityStore for Storage {
    async fn update_case_status(&self, case_id: &CaseId, status: CaseStatus) -> Result<()> {
        Storage::update_case_status(self, case_id, status).await
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<DocumentRecord> {
        Storage::insert_document(self, document).await
    }

    async fn list_cases(&self) -> Result<Vec<CaseRecord>> {
        Storage::list_cases(self).await
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Option<CaseRecord>> {
        Storage::get_case(self, case_id).await
    }

    async fn insert_case(&self, case: &NewCase) -> Result<CaseRecord> {
        Storage::insert_case(self, case).await
    }

    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<DocumentRecord>> {
        Storage::list_documents(self, case_id).await
    }
}

#[async_trait]
impl BinaryStore for Storage {
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredObject> {
        self.put_object(path, &bytes, options).await
    }

    async fn download(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        self.get_object(path)
            .await?
            .map(|blob| blob.bytes)
            .ok_or_else(|| anyhow!("object {path} not found"))
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        self.object_exists(path).await
    }
}

#[cfg(test)]
#[path = "tests/local_tests.rs"]
mod tests;
