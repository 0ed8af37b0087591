//! Delivery backend contract and the in-memory health lifecycle every
//! backend variant goes through.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::alert::Alert;
use crate::config::Target;

/// Errors crossing the backend boundary. All of them are recoverable: the
/// backend ends up `Failed` and the re-init schedule takes it from there.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("command '{command}' rejected: {response}")]
    Command { command: String, response: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },
}

impl BackendError {
    /// Cancellation and timeouts are tracked like transport failures but
    /// logged apart from genuine protocol errors.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

/// Result of a delivery attempt that did not fail.
///
/// `Skipped` is a routing miss: the backend serves no channel the target
/// has. It is deliberately distinguishable from `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Skipped,
}

/// Runtime health of one backend instance. Never persisted.
///
/// `Failed -> Ready` is only reachable through a successful `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BackendHealth {
    Uninitialized = 0,
    Ready = 1,
    Failed = 2,
}

/// Lock-free holder for a backend's health, safe to read concurrently with
/// init, delivery and shutdown.
#[derive(Debug, Default)]
pub struct HealthCell(AtomicU8);

impl HealthCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(BackendHealth::Uninitialized as u8))
    }

    pub fn get(&self) -> BackendHealth {
        match self.0.load(Ordering::Acquire) {
            1 => BackendHealth::Ready,
            2 => BackendHealth::Failed,
            _ => BackendHealth::Uninitialized,
        }
    }

    pub fn set(&self, health: BackendHealth) {
        self.0.store(health as u8, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.get() == BackendHealth::Ready
    }
}

/// One pluggable delivery mechanism. New channels are added as new
/// implementations of this trait, registered by name in the notifier.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Backend name used in configuration and logs.
    fn name(&self) -> &str;

    /// Establish the external resource. Safe to retry after a failure; on
    /// error the backend is `Failed` and holds no half-open resource.
    async fn init(&self) -> Result<(), BackendError>;

    /// Current health, without blocking.
    fn ready(&self) -> bool;

    /// Attempt delivery of one alert to one target, bounded by `timeout`.
    ///
    /// Returns `Ok(Skipped)` when the target has no channel this backend
    /// serves (or the backend lost readiness in the meantime), `Ok(Sent)`
    /// on confirmed submission. On `Err` the backend has already marked
    /// itself `Failed` and released its transport.
    async fn deliver(
        &self,
        timeout: Duration,
        target: &Target,
        alert: &Alert,
    ) -> Result<SendOutcome, BackendError>;

    /// Release resources. A no-op for a backend that never initialized.
    async fn shutdown(&self) -> Result<(), BackendError>;
}
