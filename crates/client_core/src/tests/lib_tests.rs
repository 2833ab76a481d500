use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::*;
use anyhow::anyhow;
use chrono::Utc;
use shared::{
    domain::{DocumentId, DocumentStatus, DocumentType},
    error::BackendError,
};
use tokio::sync::Notify;

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn all(&self) -> Vec<Notification> {
        self.seen.lock().expect("notifier lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().expect("notifier lock").push(notification);
    }
}

/// Collects formatted log lines written while it is the default subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("logs lock")).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("logs lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Holds an update open until the test releases it.
struct Gate {
    entered: Notify,
    release: Notify,
}

#[derive(Default)]
struct FakeEntityStore {
    cases: Mutex<HashMap<CaseId, CaseRecord>>,
    status_updates: Mutex<Vec<(CaseId, CaseStatus)>>,
    document_inserts: Mutex<Vec<NewDocument>>,
    fail_updates: Option<String>,
    fail_inserts: Option<String>,
    gate: Option<Arc<Gate>>,
}

impl FakeEntityStore {
    fn with_case(id: &str, status: CaseStatus) -> Self {
        let store = Self::default();
        store.cases.lock().expect("cases").insert(
            CaseId::from(id),
            CaseRecord {
                id: CaseId::from(id),
                case_number: format!("FC-{id}"),
                borrower_name: "Dana Whitfield".to_string(),
                property_address: "12 Elm St".to_string(),
                status,
                created_at: Utc::now(),
            },
        );
        store
    }

    fn failing_updates(mut self, err: impl Into<String>) -> Self {
        self.fail_updates = Some(err.into());
        self
    }

    fn failing_inserts(mut self, err: impl Into<String>) -> Self {
        self.fail_inserts = Some(err.into());
        self
    }

    fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn status_updates(&self) -> Vec<(CaseId, CaseStatus)> {
        self.status_updates.lock().expect("updates").clone()
    }

    fn document_inserts(&self) -> Vec<NewDocument> {
        self.document_inserts.lock().expect("inserts").clone()
    }
}

#[async_trait]
impl EntityStore for FakeEntityStore {
    async fn update_case_status(&self, case_id: &CaseId, status: CaseStatus) -> Result<()> {
        self.status_updates
            .lock()
            .expect("updates")
            .push((case_id.clone(), status));
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(err) = &self.fail_updates {
            return Err(anyhow!(err.clone()));
        }
        let mut cases = self.cases.lock().expect("cases");
        let case = cases
            .get_mut(case_id)
            .ok_or_else(|| anyhow!("case {case_id} not found"))?;
        case.status = status;
        Ok(())
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<DocumentRecord> {
        self.document_inserts
            .lock()
            .expect("inserts")
            .push(document.clone());
        if let Some(err) = &self.fail_inserts {
            return Err(anyhow!(err.clone()));
        }
        Ok(DocumentRecord {
            id: DocumentId::from("d1"),
            case_id: document.case_id.clone(),
            title: document.title.clone(),
            doc_type: document.doc_type,
            status: document.status,
            created_at: document.created_at,
            url: document.url.clone(),
        })
    }

    async fn list_cases(&self) -> Result<Vec<CaseRecord>> {
        Ok(self.cases.lock().expect("cases").values().cloned().collect())
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Option<CaseRecord>> {
        Ok(self.cases.lock().expect("cases").get(case_id).cloned())
    }

    async fn insert_case(&self, case: &NewCase) -> Result<CaseRecord> {
        let id = CaseId::new(format!("c{}", self.cases.lock().expect("cases").len() + 1));
        let record = CaseRecord {
            id: id.clone(),
            case_number: case.case_number.clone(),
            borrower_name: case.borrower_name.clone(),
            property_address: case.property_address.clone(),
            status: case.status,
            created_at: Utc::now(),
        };
        self.cases.lock().expect("cases").insert(id, record.clone());
        Ok(record)
    }

    async fn list_documents(&self, case_id: &CaseId) -> Result<Vec<DocumentRecord>> {
        Ok(self
            .document_inserts()
            .into_iter()
            .filter(|doc| &doc.case_id == case_id)
            .map(|doc| DocumentRecord {
                id: DocumentId::from("d1"),
                case_id: doc.case_id,
                title: doc.title,
                doc_type: doc.doc_type,
                status: doc.status,
                created_at: doc.created_at,
                url: doc.url,
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeBinaryStore {
    objects: Mutex<HashMap<ObjectPath, Vec<u8>>>,
    uploads: Mutex<Vec<(ObjectPath, UploadOptions)>>,
    fail_with: Option<String>,
}

impl FakeBinaryStore {
    fn failing(err: impl Into<String>) -> Self {
        Self {
            fail_with: Some(err.into()),
            ..Self::default()
        }
    }

    fn uploads(&self) -> Vec<(ObjectPath, UploadOptions)> {
        self.uploads.lock().expect("uploads").clone()
    }
}

#[async_trait]
impl BinaryStore for FakeBinaryStore {
    async fn upload(
        &self,
        path: &ObjectPath,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredObject> {
        self.uploads
            .lock()
            .expect("uploads")
            .push((path.clone(), options.clone()));
        if let Some(err) = &self.fail_with {
            return Err(anyhow!(err.clone()));
        }
        let mut objects = self.objects.lock().expect("objects");
        if objects.contains_key(path) && !options.upsert {
            return Err(BackendError::new(409, "The resource already exists").into());
        }
        objects.insert(path.clone(), bytes);
        Ok(StoredObject { path: path.clone() })
    }

    async fn download(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .expect("objects")
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("object {path} not found"))
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        Ok(self.objects.lock().expect("objects").contains_key(path))
    }
}

fn status_control(
    store: Arc<FakeEntityStore>,
    notifier: Arc<RecordingNotifier>,
    current: CaseStatus,
) -> CaseStatusControl {
    CaseStatusControl::new(CaseId::from("c1"), current, store, notifier)
}

#[tokio::test]
async fn selecting_current_status_is_a_no_op() {
    let store = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let notifier = Arc::new(RecordingNotifier::default());
    let control = status_control(store.clone(), notifier.clone(), CaseStatus::New);

    let mut callbacks = Vec::new();
    let outcome = control
        .select(CaseStatus::New, |status| callbacks.push(status))
        .await
        .expect("no-op");

    assert_eq!(outcome, StatusSelection::Unchanged);
    assert!(store.status_updates().is_empty());
    assert!(notifier.all().is_empty());
    assert!(callbacks.is_empty());
}

#[tokio::test]
async fn updating_case_to_petition_filed_notifies_and_reconciles() {
    let store = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let notifier = Arc::new(RecordingNotifier::default());
    let control = status_control(store.clone(), notifier.clone(), CaseStatus::New);

    let mut callbacks = Vec::new();
    let outcome = control
        .select(CaseStatus::PetitionFiled, |status| callbacks.push(status))
        .await
        .expect("update");

    assert_eq!(
        outcome,
        StatusSelection::Updated {
            from: CaseStatus::New,
            to: CaseStatus::PetitionFiled,
        }
    );
    assert_eq!(
        store.status_updates(),
        vec![(CaseId::from("c1"), CaseStatus::PetitionFiled)]
    );
    assert_eq!(callbacks, vec![CaseStatus::PetitionFiled]);
    assert_eq!(control.current(), CaseStatus::PetitionFiled);

    let notifications = notifier.all();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Success);
    assert!(notifications[0].message.contains("Petition Filed"));
}

#[tokio::test]
async fn failed_update_keeps_confirmed_status_and_skips_callback() {
    let store = Arc::new(
        FakeEntityStore::with_case("c1", CaseStatus::New).failing_updates("backend unreachable"),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let control = status_control(store.clone(), notifier.clone(), CaseStatus::New);

    let mut callbacks = Vec::new();
    let err = control
        .select(CaseStatus::Closed, |status| callbacks.push(status))
        .await
        .expect_err("must fail");

    assert!(matches!(err, OperationError::RemoteUpdate { ref case_id, .. } if case_id.as_str() == "c1"));
    assert!(err.to_string().contains("backend unreachable"));
    assert!(callbacks.is_empty());
    assert_eq!(control.current(), CaseStatus::New);
    assert!(control.is_interactive());

    let notifications = notifier.all();
    assert_eq!(
        notifications,
        vec![Notification::new(
            NotificationLevel::Error,
            "Failed to update case status"
        )]
    );
}

#[tokio::test]
async fn control_is_not_interactive_while_update_is_in_flight() {
    let gate = Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let store = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New).gated(gate.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let control = Arc::new(status_control(
        store.clone(),
        notifier.clone(),
        CaseStatus::New,
    ));
    assert!(control.is_interactive());

    let in_flight = {
        let control = Arc::clone(&control);
        tokio::spawn(async move { control.select(CaseStatus::DemandLetterSent, |_| {}).await })
    };
    gate.entered.notified().await;

    assert!(!control.is_interactive());
    let second = control
        .select(CaseStatus::SaleProcess, |_| panic!("must not run"))
        .await
        .expect("ignored");
    assert_eq!(second, StatusSelection::Busy);
    assert_eq!(store.status_updates().len(), 1);

    gate.release.notify_one();
    let first = in_flight.await.expect("join").expect("update");
    assert_eq!(
        first,
        StatusSelection::Updated {
            from: CaseStatus::New,
            to: CaseStatus::DemandLetterSent,
        }
    );
    assert!(control.is_interactive());
    assert_eq!(control.current(), CaseStatus::DemandLetterSent);
}

#[tokio::test]
async fn control_becomes_interactive_again_after_failure() {
    let gate = Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let store = Arc::new(
        FakeEntityStore::with_case("c1", CaseStatus::New)
            .failing_updates("timeout")
            .gated(gate.clone()),
    );
    let control = Arc::new(status_control(
        store,
        Arc::new(RecordingNotifier::default()),
        CaseStatus::New,
    ));

    let in_flight = {
        let control = Arc::clone(&control);
        tokio::spawn(async move { control.select(CaseStatus::Closed, |_| {}).await })
    };
    gate.entered.notified().await;
    assert!(!control.is_interactive());

    gate.release.notify_one();
    in_flight.await.expect("join").expect_err("must fail");
    assert!(control.is_interactive());
}

#[tokio::test]
async fn subscribers_observe_only_confirmed_status() {
    let store = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let control = status_control(
        store,
        Arc::new(RecordingNotifier::default()),
        CaseStatus::New,
    );
    let mut displayed = control.subscribe();

    control
        .select(CaseStatus::OrderNisiGranted, |_| {})
        .await
        .expect("update");

    assert!(displayed.has_changed().expect("sender alive"));
    assert_eq!(*displayed.borrow_and_update(), CaseStatus::OrderNisiGranted);
    assert_eq!(control.options(), CaseStatus::ALL);
}

fn document_service(
    entities: Arc<FakeEntityStore>,
    objects: Arc<FakeBinaryStore>,
    notifier: Arc<RecordingNotifier>,
) -> DocumentService {
    DocumentService::new(entities, objects, notifier)
}

#[tokio::test]
async fn uploading_notice_stores_payload_then_registers_metadata() {
    let entities = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let objects = Arc::new(FakeBinaryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = document_service(entities.clone(), objects.clone(), notifier.clone());

    let stored = service
        .upload_document(
            &CaseId::from("c1"),
            b"%PDF-1.7".to_vec(),
            "notice.pdf",
            DocumentType::DemandLetter,
        )
        .await
        .expect("upload");

    assert_eq!(stored.path.as_str(), "c1/notice.pdf");
    let uploads = objects.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(!uploads[0].1.upsert);
    assert_eq!(uploads[0].1.cache_control, "3600");
    assert_eq!(uploads[0].1.content_type.as_deref(), Some("application/pdf"));

    let inserts = entities.document_inserts();
    assert_eq!(inserts.len(), 1);
    let record = &inserts[0];
    assert_eq!(record.case_id.as_str(), "c1");
    assert_eq!(record.title, "notice.pdf");
    assert_eq!(record.doc_type, DocumentType::DemandLetter);
    assert_eq!(record.status, DocumentStatus::Finalized);
    assert_eq!(record.url, stored.path);

    assert_eq!(
        notifier.all(),
        vec![Notification::new(
            NotificationLevel::Success,
            "Document uploaded successfully"
        )]
    );
}

#[tokio::test]
async fn failed_payload_write_never_attempts_metadata_insert() {
    let entities = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let objects = Arc::new(FakeBinaryStore::failing("storage unreachable"));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = document_service(entities.clone(), objects, notifier.clone());

    let err = service
        .upload_document(
            &CaseId::from("c1"),
            b"payload".to_vec(),
            "notice.pdf",
            DocumentType::DemandLetter,
        )
        .await
        .expect_err("must fail");

    assert!(matches!(err, OperationError::BinaryWrite { .. }));
    assert_eq!(entities.document_inserts().len(), 0);
    assert_eq!(
        notifier.all(),
        vec![Notification::new(
            NotificationLevel::Error,
            "Failed to upload document"
        )]
    );
}

#[tokio::test]
async fn existing_payload_is_not_overwritten() {
    let entities = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let objects = Arc::new(FakeBinaryStore::default());
    let service = document_service(
        entities.clone(),
        objects.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    let case_id = CaseId::from("c1");

    service
        .upload_document(&case_id, b"v1".to_vec(), "notice.pdf", DocumentType::DemandLetter)
        .await
        .expect("first upload");
    let err = service
        .upload_document(&case_id, b"v2".to_vec(), "notice.pdf", DocumentType::DemandLetter)
        .await
        .expect_err("collision");

    assert!(matches!(err, OperationError::BinaryWrite { .. }));
    assert_eq!(entities.document_inserts().len(), 1);
    let path = ObjectPath::for_document(&case_id, "notice.pdf");
    assert_eq!(objects.download(&path).await.expect("download"), b"v1");
}

#[tokio::test]
async fn failed_metadata_insert_reports_orphaned_payload() {
    let entities = Arc::new(
        FakeEntityStore::with_case("c1", CaseStatus::New).failing_inserts("insert rejected"),
    );
    let objects = Arc::new(FakeBinaryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = document_service(entities.clone(), objects.clone(), notifier.clone());

    let err = service
        .upload_document(
            &CaseId::from("c1"),
            b"payload".to_vec(),
            "notice.pdf",
            DocumentType::DemandLetter,
        )
        .await
        .expect_err("must fail");

    let orphaned = err.orphaned_path().expect("partial write").clone();
    assert_eq!(orphaned.as_str(), "c1/notice.pdf");
    assert!(err.to_string().contains("insert rejected"));
    assert!(objects.exists(&orphaned).await.expect("exists"));
    assert_eq!(entities.document_inserts().len(), 1);
    assert_eq!(
        notifier.all(),
        vec![Notification::new(
            NotificationLevel::Error,
            "Failed to upload document"
        )]
    );
}

#[tokio::test]
async fn downloads_payload_referenced_by_listed_document() {
    let entities = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New));
    let objects = Arc::new(FakeBinaryStore::default());
    let service = document_service(
        entities,
        objects,
        Arc::new(RecordingNotifier::default()),
    )
    .with_cache_control(60);
    let case_id = CaseId::from("c1");

    service
        .upload_document(&case_id, b"affidavit".to_vec(), "affidavit.txt", DocumentType::Affidavit)
        .await
        .expect("upload");

    let documents = service.list_documents(&case_id).await.expect("list");
    assert_eq!(documents.len(), 1);
    let bytes = service
        .download_document(&documents[0])
        .await
        .expect("download");
    assert_eq!(bytes, b"affidavit");
}

#[tokio::test]
async fn opening_case_seeds_control_with_backend_status() {
    let store = Arc::new(FakeEntityStore::with_case("c1", CaseStatus::RedemptionPeriod));
    let directory = CaseDirectory::new(store, Arc::new(RecordingNotifier::default()));

    let control = directory.open_case(&CaseId::from("c1")).await.expect("open");
    assert_eq!(control.current(), CaseStatus::RedemptionPeriod);
    assert_eq!(control.case_id().as_str(), "c1");

    let missing = directory
        .open_case(&CaseId::from("c404"))
        .await
        .err()
        .expect("missing case");
    assert!(matches!(missing, OperationError::MissingCase(_)));
}

#[tokio::test]
async fn created_case_starts_as_new_and_is_listed() {
    let store = Arc::new(FakeEntityStore::default());
    let directory = CaseDirectory::new(store, Arc::new(RecordingNotifier::default()));

    let created = directory
        .create_case(&NewCase {
            case_number: "2024-FC-0042".to_string(),
            borrower_name: "Sam Ortega".to_string(),
            property_address: "4 Harbor Rd".to_string(),
            status: CaseStatus::default(),
        })
        .await
        .expect("create");

    assert_eq!(created.status, CaseStatus::New);
    let cases = directory.list_cases().await.expect("list");
    assert_eq!(cases.len(), 1);
    assert_eq!(
        directory
            .get_case(&created.id)
            .await
            .expect("get")
            .map(|c| c.case_number),
        Some("2024-FC-0042".to_string())
    );
}

#[tokio::test]
async fn broadcast_notifier_delivers_to_subscribers() {
    let notifier = BroadcastNotifier::new(8);
    let mut toasts = notifier.subscribe();

    notifier.success("Case status updated to Closed");
    notifier.info("Refreshing cases");

    let first = toasts.recv().await.expect("first");
    assert_eq!(first.level, NotificationLevel::Success);
    let second = toasts.recv().await.expect("second");
    assert_eq!(second.level, NotificationLevel::Info);
    assert_eq!(second.message, "Refreshing cases");
}

#[tokio::test]
async fn opening_unknown_case_is_logged() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();
    let directory = CaseDirectory::new(
        Arc::new(FakeEntityStore::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let err = directory
        .open_case(&CaseId::from("c404"))
        .await
        .err()
        .expect("missing case");

    assert!(matches!(err, OperationError::MissingCase(_)));
    let text = logs.text();
    assert!(text.contains("cannot open unknown case"), "logs: {text}");
    assert!(text.contains("c404"), "logs: {text}");
}

#[tokio::test]
async fn failed_download_is_logged_with_its_path() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = document_service(
        Arc::new(FakeEntityStore::with_case("c1", CaseStatus::New)),
        Arc::new(FakeBinaryStore::default()),
        notifier.clone(),
    );
    let missing = DocumentRecord {
        id: DocumentId::from("d9"),
        case_id: CaseId::from("c1"),
        title: "gone.pdf".to_string(),
        doc_type: DocumentType::Other,
        status: DocumentStatus::Finalized,
        created_at: Utc::now(),
        url: ObjectPath::from_stored("c1/gone.pdf"),
    };

    service.download_document(&missing).await.expect_err("missing object");

    let text = logs.text();
    assert!(text.contains("document download failed"), "logs: {text}");
    assert!(text.contains("c1/gone.pdf"), "logs: {text}");
    assert!(notifier.all().is_empty());
}

#[tokio::test]
async fn zero_capacity_broadcast_notifier_still_delivers() {
    let notifier = BroadcastNotifier::new(0);
    let mut toasts = notifier.subscribe();

    notifier.error("Failed to upload document");

    let toast = toasts.recv().await.expect("toast");
    assert_eq!(toast.level, NotificationLevel::Error);
}
