use std::sync::Arc;

use anyhow::Result;
use shared::{
    domain::CaseId,
    protocol::{CaseRecord, NewCase},
};
use tracing::{info, warn};

use crate::{
    error::OperationError, notify::Notifier, status_control::CaseStatusControl, EntityStore,
};

/// Case lookups and the entry point for per-case controls.
#[derive(Clone)]
pub struct CaseDirectory {
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
}

impl CaseDirectory {
    pub fn new(store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn list_cases(&self) -> Result<Vec<CaseRecord>> {
        self.store.list_cases().await.map_err(|error| {
            warn!(error = ?error, "case listing failed");
            error.context("failed to list cases")
        })
    }

    pub async fn get_case(&self, case_id: &CaseId) -> Result<Option<CaseRecord>> {
        self.store.get_case(case_id).await.map_err(|error| {
            warn!(%case_id, error = ?error, "case lookup failed");
            error.context(format!("failed to fetch case {case_id}"))
        })
    }

    pub async fn create_case(&self, case: &NewCase) -> Result<CaseRecord> {
        let created = self.store.insert_case(case).await.map_err(|error| {
            warn!(case_number = %case.case_number, error = ?error, "case insert failed");
            error.context(format!("failed to create case {}", case.case_number))
        })?;
        info!(case_id = %created.id, case_number = %created.case_number, "case created");
        Ok(created)
    }

    /// Loads the case and returns a status control seeded with its current
    /// status.
    pub async fn open_case(&self, case_id: &CaseId) -> Result<CaseStatusControl, OperationError> {
        let case = self
            .store
            .get_case(case_id)
            .await
            .map_err(|source| {
                warn!(%case_id, error = ?source, "case lookup failed while opening case");
                OperationError::CaseLookup {
                    case_id: case_id.clone(),
                    source,
                }
            })?
            .ok_or_else(|| {
                warn!(%case_id, "cannot open unknown case");
                OperationError::MissingCase(case_id.clone())
            })?;

        Ok(CaseStatusControl::new(
            case.id,
            case.status,
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
        ))
    }
}
