use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::domain::{CaseId, CaseStatus};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{error::OperationError, notify::Notifier, EntityStore};

const STATUS_UPDATE_FAILED: &str = "Failed to update case status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSelection {
    /// The selected status was already the confirmed one.
    Unchanged,
    /// Another update from this control was still in flight.
    Busy,
    Updated { from: CaseStatus, to: CaseStatus },
}

/// Status selector for a single case.
///
/// The displayed value only ever changes after the backend confirmed the
/// write, so a failed update needs no rollback. While a write is in flight
/// the control is not interactive and further selections are ignored.
pub struct CaseStatusControl {
    case_id: CaseId,
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    displayed: watch::Sender<CaseStatus>,
    busy: AtomicBool,
}

impl CaseStatusControl {
    pub fn new(
        case_id: CaseId,
        current: CaseStatus,
        store: Arc<dyn EntityStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (displayed, _) = watch::channel(current);
        Self {
            case_id,
            store,
            notifier,
            displayed,
            busy: AtomicBool::new(false),
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    /// Last status confirmed by the backend.
    pub fn current(&self) -> CaseStatus {
        *self.displayed.borrow()
    }

    pub fn options(&self) -> &'static [CaseStatus] {
        CaseStatus::ALL
    }

    pub fn is_interactive(&self) -> bool {
        !self.busy.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<CaseStatus> {
        self.displayed.subscribe()
    }

    /// Persists `status` and, once confirmed, reports it to `on_updated`.
    ///
    /// `on_updated` runs at most once, and only after a successful write.
    pub async fn select<F>(
        &self,
        status: CaseStatus,
        on_updated: F,
    ) -> Result<StatusSelection, OperationError>
    where
        F: FnOnce(CaseStatus) + Send,
    {
        let previous = self.current();
        if status == previous {
            return Ok(StatusSelection::Unchanged);
        }

        let Some(busy) = BusyGuard::acquire(&self.busy) else {
            debug!(case_id = %self.case_id, %status, "status update already in flight");
            return Ok(StatusSelection::Busy);
        };

        let result = self.store.update_case_status(&self.case_id, status).await;
        drop(busy);

        match result {
            Ok(()) => {
                self.displayed.send_replace(status);
                info!(case_id = %self.case_id, from = %previous, to = %status, "case status updated");
                self.notifier
                    .success(&format!("Case status updated to {status}"));
                on_updated(status);
                Ok(StatusSelection::Updated {
                    from: previous,
                    to: status,
                })
            }
            Err(source) => {
                error!(case_id = %self.case_id, %status, error = ?source, "case status update failed");
                self.notifier.error(STATUS_UPDATE_FAILED);
                Err(OperationError::RemoteUpdate {
                    case_id: self.case_id.clone(),
                    source,
                })
            }
        }
    }
}

/// Holds the busy flag for the lifetime of one in-flight update, including
/// when the update future is dropped before completion.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
