use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;
use uuid::Uuid;

use shared::{
    domain::{CaseId, CaseStatus, DocumentId, ObjectPath},
    protocol::{CaseRecord, DocumentRecord, NewCase, NewDocument, StoredObject, UploadOptions},
};

/// SQLite stand-in for the hosted backend: case and document rows plus a
/// path-keyed object table.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub path: ObjectPath,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub cache_control: String,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(%database_url, "local case store ready");
        Ok(Self { pool })
    }

    /// Number of stored cases. Doubles as a check that the schema is in place.
    pub async fn case_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM cases")
            .fetch_one(&self.pool)
            .await
            .context("failed to count cases")
    }

    pub async fn insert_case(&self, case: &NewCase) -> Result<CaseRecord> {
        let id = CaseId::new(Uuid::new_v4().to_string());
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO cases (id, case_number, borrower_name, property_address, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(&case.case_number)
        .bind(&case.borrower_name)
        .bind(&case.property_address)
        .bind(case.status.label())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert case {}", case.case_number))?;

        Ok(CaseRecord {
            id,
            case_number: case.case_number.clone(),
            borrower_name: case.borrower_name.clone(),
            property_address: case.property_address.clone(),
            status: case.status,
            created_at,
        })
    }

    pub async fn list_cases(&self) -> Result<Vec<CaseRecord>> {
        let rows = sqlx::query(
            "SELECT id, case_number, borrower_name, property_address, status, created_at
             FROM cases ORDER BY rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(case_from_row).collect()
    }

    pub async fn get_case(&self, case_id: &CaseId) -> Result<Option<CaseRecord>> {
        let row = sqlx::query(
            "SELECT id, case_number, borrower_name, property_address, status, created_at
             FROM cases WHERE id = ?",
        )
        .bind(case_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(case_from_row).transpose()
    }

    /// Sets only the status column of exactly one case.
    pub async fn update_case_status(&self, case_id: &CaseId, status: CaseStatus) -> Result<()> {
        let result = sqlx::query("UPDATE cases SET status = ? WHERE id = ?")
            .bind(status.label())
            .bind(case_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("case {case_id} not found");
        }
        Ok(())
    }

    pub async fn insert_document(&self, document: &NewDocument) -> Result<DocumentRecord> {
        let id = DocumentId::new(Uuid::new_v4().to_string());
        sqlx::query(
            "INSERT INTO documents (id, case_id, title, type, status, created_at, url)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(document.case_id.as_str())
        .bind(&document.title)
        .bind(document.doc_type.label())
        .bind(document.status.label())
        .bind(document.created_at)
        .bind(document.url.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert document record for {}", document.url))?;

        Ok(DocumentRecord {
            id,
            case_id: document.case_id.clone(),
            title: document.title.clone(),
            doc_type: document.doc_type,
            status: document.status,
            created_at: document.created_at,
            url: document.url.clone(),
        })
    }

    pub async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, case_id, title, type, status, created_at, url
             FROM documents WHERE case_id = ? ORDER BY rowid DESC",
        )
        .bind(case_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Stores a payload at `path`. Without `upsert` an existing payload is
    /// left untouched and the write fails.
    pub async fn put_object(
        &self,
        path: &ObjectPath,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<StoredObject> {
        let statement = if options.upsert {
            "INSERT INTO objects (path, bytes, content_type, cache_control, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET
                bytes = excluded.bytes,
                content_type = excluded.content_type,
                cache_control = excluded.cache_control,
                created_at = excluded.created_at"
        } else {
            "INSERT INTO objects (path, bytes, content_type, cache_control, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(path) DO NOTHING"
        };

        let result = sqlx::query(statement)
            .bind(path.as_str())
            .bind(bytes)
            .bind(options.content_type.as_deref())
            .bind(&options.cache_control)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to store object {path}"))?;

        if result.rows_affected() == 0 {
            bail!("object {path} already exists");
        }

        Ok(StoredObject { path: path.clone() })
    }

    pub async fn get_object(&self, path: &ObjectPath) -> Result<Option<StoredBlob>> {
        let row = sqlx::query(
            "SELECT path, bytes, content_type, cache_control, created_at FROM objects WHERE path = ?",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<StoredBlob> {
            Ok(StoredBlob {
                path: ObjectPath::from_stored(r.try_get::<String, _>("path")?),
                bytes: r.try_get("bytes")?,
                content_type: r.try_get("content_type")?,
                cache_control: r.try_get("cache_control")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn object_exists(&self, path: &ObjectPath) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM objects WHERE path = ?")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

fn case_from_row(row: &SqliteRow) -> Result<CaseRecord> {
    Ok(CaseRecord {
        id: CaseId::new(row.try_get::<String, _>("id")?),
        case_number: row.try_get("case_number")?,
        borrower_name: row.try_get("borrower_name")?,
        property_address: row.try_get("property_address")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: DocumentId::new(row.try_get::<String, _>("id")?),
        case_id: CaseId::new(row.try_get::<String, _>("case_id")?),
        title: row.try_get("title")?,
        doc_type: parse_column(row, "type")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        url: ObjectPath::from_stored(row.try_get::<String, _>("url")?),
    })
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid value in column {column}: {e}"))
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
