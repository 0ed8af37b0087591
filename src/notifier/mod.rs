//! Notification orchestration: owns the backend registry and pushes
//! notifiable alerts to every configured target on a fixed interval.

pub mod backend;
pub mod backends;
pub mod format;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, NotifierConfig, Target};
use crate::store::AlertStore;
use backend::{NotifyBackend, SendOutcome};
use backends::{EmailBackend, SmsModemBackend};

/// Long-running dispatcher. Construction builds and initializes the
/// backend registry; `start` spawns the evaluation and re-init loops;
/// `close` stops both and shuts the backends down.
///
/// Cloning is cheap and shares all state, so the loops run on clones.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn AlertStore>,
    targets: Arc<Vec<Target>>,
    interval: Duration,
    reinit_interval: Duration,
    delivery_timeout: Duration,
    backends: Arc<HashMap<String, Arc<dyn NotifyBackend>>>,
    shutdown: watch::Sender<bool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Notifier {
    /// Build the backend registry from configuration and initialize every
    /// backend once. Config problems abort; init failures do not, the
    /// backend stays registered as failed and the re-init loop retries it.
    pub async fn new(
        conf: &NotifierConfig,
        store: Arc<dyn AlertStore>,
    ) -> Result<Self, ConfigError> {
        conf.validate()?;

        let mut backends: HashMap<String, Arc<dyn NotifyBackend>> = HashMap::new();
        for entry in &conf.backends {
            let backend: Arc<dyn NotifyBackend> = match (&entry.email, &entry.sms_modem) {
                (Some(email), None) => Arc::new(EmailBackend::new(&entry.name, email.clone())),
                (None, Some(modem)) => Arc::new(SmsModemBackend::new(&entry.name, modem.clone())),
                (None, None) => {
                    return Err(ConfigError::MissingBackendVariant {
                        name: entry.name.clone(),
                    })
                }
                (Some(_), Some(_)) => {
                    return Err(ConfigError::AmbiguousBackendVariant {
                        name: entry.name.clone(),
                    })
                }
            };
            backends.insert(entry.name.clone(), backend);
        }

        for (name, backend) in &backends {
            match backend.init().await {
                Ok(()) => info!(backend = %name, "backend initialized"),
                Err(err) => {
                    warn!(backend = %name, error = %err, "failed to initialize backend")
                }
            }
        }

        let notifier = Self::assemble(
            store,
            conf.targets.clone(),
            conf.interval(),
            conf.reinit_interval(),
            conf.delivery_timeout(),
            backends,
        );
        info!(
            backends = notifier.backends.len(),
            targets = notifier.targets.len(),
            interval = ?notifier.interval,
            "notifier ready"
        );
        Ok(notifier)
    }

    /// Assemble a notifier around pre-built backends. This is the seam for
    /// embedding custom backend implementations (and for tests).
    pub fn with_backends(
        store: Arc<dyn AlertStore>,
        targets: Vec<Target>,
        interval: Duration,
        delivery_timeout: Duration,
        backends: Vec<Arc<dyn NotifyBackend>>,
    ) -> Self {
        let backends = backends
            .into_iter()
            .map(|b| (b.name().to_string(), b))
            .collect();
        Self::assemble(
            store,
            targets,
            interval,
            interval * 5,
            delivery_timeout,
            backends,
        )
    }

    fn assemble(
        store: Arc<dyn AlertStore>,
        targets: Vec<Target>,
        interval: Duration,
        reinit_interval: Duration,
        delivery_timeout: Duration,
        backends: HashMap<String, Arc<dyn NotifyBackend>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            targets: Arc::new(targets),
            interval,
            reinit_interval,
            delivery_timeout,
            backends: Arc::new(backends),
            shutdown,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawn the dispatch and re-init loops.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;

        let this = self.clone();
        let rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { this.run_dispatch(rx).await }));

        let this = self.clone();
        let rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { this.run_reinit(rx).await }));
    }

    /// Stop scheduling, wait for in-flight work to finish or hit its
    /// deadline, then shut every backend down. Shutdown failures are
    /// logged, never escalated.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }

        for (name, backend) in self.backends.iter() {
            if let Err(err) = backend.shutdown().await {
                warn!(backend = %name, error = %err, "backend shutdown failed");
            }
        }
        info!("notifier stopped");
    }

    /// Run a single evaluation round immediately, outside the schedule.
    pub async fn trigger(&self) {
        self.evaluate_round().await;
    }

    async fn run_dispatch(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            self.evaluate_round().await;
        }
        debug!("dispatch loop stopped");
    }

    async fn run_reinit(&self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.reinit_interval;
        let mut ticker = tokio::time::interval_at(start, self.reinit_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            self.reinit_round().await;
        }
        debug!("re-init loop stopped");
    }

    /// One tick: fan out one delivery task per (target, ready backend)
    /// pair and join them all before returning, so ticks never overlap.
    async fn evaluate_round(&self) {
        let alerts = match self.store.notifiable_alerts().await {
            Ok(alerts) => alerts,
            Err(err) => {
                warn!(error = %err, "cannot query notifiable alerts");
                return;
            }
        };
        if alerts.is_empty() {
            debug!("no notifiable alerts");
            return;
        }
        debug!(alerts = alerts.len(), "starting notification round");

        let alerts = Arc::new(alerts);
        let mut attempts = JoinSet::new();
        for target in self.targets.iter() {
            for backend in self.backends.values() {
                if !backend.ready() {
                    debug!(backend = %backend.name(), "backend not ready, skipping");
                    continue;
                }
                let backend = backend.clone();
                let target = target.clone();
                let alerts = alerts.clone();
                let timeout = self.delivery_timeout;
                attempts.spawn(async move {
                    for alert in alerts.iter() {
                        match backend.deliver(timeout, &target, alert).await {
                            Ok(SendOutcome::Sent) => {
                                info!(backend = %backend.name(), target = %target.name,
                                    alert = %alert.id, "notification delivered");
                            }
                            Ok(SendOutcome::Skipped) => {
                                debug!(backend = %backend.name(), target = %target.name,
                                    "target has no channel for this backend");
                            }
                            Err(err) => {
                                if err.is_timeout() {
                                    warn!(backend = %backend.name(), target = %target.name,
                                        alert = %alert.id, error = %err,
                                        "delivery timed out, backend marked failed");
                                } else {
                                    warn!(backend = %backend.name(), target = %target.name,
                                        alert = %alert.id, error = %err,
                                        "delivery failed, backend marked failed");
                                }
                                // The backend is failed now; the remaining
                                // alerts for this pair would fail the same way.
                                break;
                            }
                        }
                    }
                });
            }
        }
        while attempts.join_next().await.is_some() {}
    }

    /// Give every backend that is not ready one re-init attempt.
    async fn reinit_round(&self) {
        for (name, backend) in self.backends.iter() {
            if backend.ready() {
                continue;
            }
            match backend.init().await {
                Ok(()) => info!(backend = %name, "backend reinitialized"),
                Err(err) => debug!(backend = %name, error = %err, "reinitialization failed"),
            }
        }
    }
}
