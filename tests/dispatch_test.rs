//! End-to-end dispatch: a real store feeding the notifier, with a custom
//! backend plugged in through the public trait.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use alertmon::{
    alert_summary, Alert, AlertSeverity, AlertState, AlertStore, BackendError, MemStore,
    Notifier, NotifyBackend, SendOutcome, Target,
};

/// Backend that renders the canonical summary like the real ones and
/// records everything it is asked to deliver.
#[derive(Default)]
struct RecordingBackend {
    name: String,
    ready: AtomicBool,
    messages: Mutex<Vec<String>>,
    deliveries: AtomicUsize,
}

impl RecordingBackend {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: AtomicBool::new(false),
            ..Self::default()
        })
    }
}

#[async_trait]
impl NotifyBackend for RecordingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), BackendError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn deliver(
        &self,
        _timeout: Duration,
        target: &Target,
        alert: &Alert,
    ) -> Result<SendOutcome, BackendError> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        if target.sms.is_none() {
            return Ok(SendOutcome::Skipped);
        }
        self.messages.lock().unwrap().push(alert_summary(alert));
        Ok(SendOutcome::Sent)
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_open_critical_alert_reaches_an_sms_target() {
    let store = Arc::new(MemStore::new());
    let alert = store
        .create_alert("disk-full", AlertSeverity::Critical)
        .await
        .unwrap();
    store
        .set_alert_state(&alert.id, AlertState::Open)
        .await
        .unwrap();

    let backend = RecordingBackend::new("pager");
    backend.init().await.unwrap();

    let notifier = Notifier::with_backends(
        store,
        vec![Target {
            name: "ops".to_string(),
            email: None,
            sms: Some("+15550001".to_string()),
        }],
        Duration::from_secs(60),
        Duration::from_secs(5),
        vec![backend.clone() as std::sync::Arc<dyn NotifyBackend>],
    );

    notifier.trigger().await;

    assert_eq!(backend.deliveries.load(Ordering::SeqCst), 1);
    let messages = backend.messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 1);

    // State label, severity label, alert name, in that order.
    let text = &messages[0];
    let open = text.find("open").expect("state label missing");
    let critical = text.find("critical").expect("severity label missing");
    let name = text.find("disk-full").expect("alert name missing");
    assert!(open < critical && critical < name, "got: {text}");
}

#[tokio::test]
async fn test_acknowledged_alert_goes_quiet() {
    let store = Arc::new(MemStore::new());
    let alert = store
        .create_alert("disk-full", AlertSeverity::Warning)
        .await
        .unwrap();
    store
        .set_alert_state(&alert.id, AlertState::Open)
        .await
        .unwrap();

    let backend = RecordingBackend::new("pager");
    backend.init().await.unwrap();

    let notifier = Notifier::with_backends(
        store.clone(),
        vec![Target {
            name: "ops".to_string(),
            email: None,
            sms: Some("+15550001".to_string()),
        }],
        Duration::from_secs(60),
        Duration::from_secs(5),
        vec![backend.clone() as std::sync::Arc<dyn NotifyBackend>],
    );

    notifier.trigger().await;
    assert_eq!(backend.deliveries.load(Ordering::SeqCst), 1);

    store
        .set_alert_state(&alert.id, AlertState::Acknowledged)
        .await
        .unwrap();
    notifier.trigger().await;
    assert_eq!(backend.deliveries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lifecycle_start_and_close() {
    let store = Arc::new(MemStore::new());
    let backend = RecordingBackend::new("pager");
    backend.init().await.unwrap();

    let notifier = Notifier::with_backends(
        store,
        vec![],
        Duration::from_secs(60),
        Duration::from_secs(5),
        vec![backend.clone() as std::sync::Arc<dyn NotifyBackend>],
    );

    notifier.start().await;
    notifier.close().await;

    // Close shut the backend down.
    assert!(!backend.ready());
}
