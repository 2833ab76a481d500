use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CaseId, CaseStatus, ObjectPath},
    error::{BackendError, BackendErrorBody},
    protocol::{
        CaseRecord, CaseStatusPatch, DocumentRecord, NewCase, NewDocument,
        StorageUploadResponse, StoredObject, UploadOptions,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{BinaryStore, EntityStore};

const REST_PREFIX: &str = "rest/v1/";
const OBJECT_PREFIX: &str = "storage/v1/object/";
const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub bucket: String,
}

/// Hosted backend adapter: a PostgREST entity API and an object storage API
/// behind one base URL and API key.
#[derive(Clone)]
pub struct RemoteBackend {
    http: Client,
    base_url: Url,
    api_key: String,
    bucket: String,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: RemoteConfig) -> Result<Self> {
        let mut raw = config.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url =
            Url::parse(&raw).with_context(|| format!("invalid backend url '{}'", config.base_url))?;
        if config.bucket.trim().is_empty() {
            return Err(anyhow!("storage bucket name must not be empty"));
        }

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{REST_PREFIX}{table}"))
            .with_context(|| format!("failed to build url for table {table}"))
    }

    fn object_url(&self, path: &ObjectPath) -> Result<Url> {
        let mut url = self
            .base_url
            .join(OBJECT_PREFIX)
            .context("failed to build storage url")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url cannot carry a path"))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.as_str().split('/'));
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = self.table_url(table)?;
        debug!(%url, "fetching rows");
        let response = self
            .authorized(self.http.get(url))
            .query(query)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn insert_row<B, T>(&self, table: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.table_url(table)?;
        debug!(%url, "inserting row");
        let response = self
            .authorized(self.http.post(url))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(body)
            .send()
            .await?;
        let mut rows: Vec<T> = check_status(response).await?.json().await?;
        if rows.is_empty() {
            return Err(anyhow!("backend returned no row for insert into {table}"));
        }
        Ok(rows.swap_remove(0))
    }
}

/// Turns a non-success response into a [`BackendError`] carrying the
/// backend's own message when it sent one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<BackendErrorBody>(&text)
        .ok()
        .and_then(BackendErrorBody::into_message)
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });
    warn!(status = status.as_u16(), %message, "backend request failed");
    Err(BackendError::new(status.as_u16(), message).into())
}

fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl EntityStore for RemoteBackend {
    async fn update_case_status(&self, case_id: &CaseId, status: CaseStatus) -> Result<()> {
        let url = self.table_url("cases")?;
        debug!(%url, %case_id, %status, "patching case status");
        let response = self
            .authorized(self.http.patch(url))
            .query(&[("id", eq_filter(case_id.as_str()))])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&CaseStatusPatch { status })
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = check_status(response).await?.json().await?;
        if rows.is_empty() {
            return Err(anyhow!("case {case_id} not found"));
        }
        Ok(())
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<DocumentRecord> {
        self.insert_row("documents", document).await
    }

    async fn list_cases(&self) -> Result<Vec<CaseRecord>> {
        self.fetch_rows(
            "cases",
            &[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Option<CaseRecord>> {
        let rows: Vec<CaseRecord> = self
            .fetch_rows(
                "cases",
                &[
                    ("select", "*".to_string()),
                    ("id", eq_filter(case_id.as_str())),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_case(&self, case: &NewCase) -> Result<CaseRecord> {
        self.insert_row("cases", case).await
    }

    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<DocumentRecord>> {
        self.fetch_rows(
            "documents",
            &[
                ("select", "*".to_string()),
                ("case_id", eq_filter(case_id.as_str())),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl BinaryStore for RemoteBackend {
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredObject> {
        let url = self.object_url(path)?;
        debug!(%url, size_bytes = bytes.len(), upsert = options.upsert, "uploading object");
        let content_type = options
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let response = self
            .authorized(self.http.post(url))
            .header("cache-control", format!("max-age={}", options.cache_control))
            .header("x-upsert", options.upsert.to_string())
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let body: StorageUploadResponse = check_status(response).await?.json().await?;

        let bucket_prefix = format!("{}/", self.bucket);
        let stored = body
            .key
            .strip_prefix(&bucket_prefix)
            .unwrap_or(&body.key)
            .to_string();
        Ok(StoredObject {
            path: ObjectPath::from_stored(stored),
        })
    }

    async fn download(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        let url = self.object_url(path)?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        let url = self.object_url(path)?;
        let response = self.authorized(self.http.head(url.clone())).send().await?;
        let response = match response.status() {
            StatusCode::NOT_FOUND => return Ok(false),
            // HEAD carries no body; the storage API explains a 400 only in one.
            StatusCode::BAD_REQUEST => self.authorized(self.http.get(url)).send().await?,
            _ => response,
        };
        match check_status(response).await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .downcast_ref::<BackendError>()
                    .is_some_and(BackendError::is_not_found) =>
            {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
