//! Alert persistence boundary consumed by the notifier and the embedding
//! application layer.

use async_trait::async_trait;
use thiserror::Error;

use crate::alert::{Alert, AlertSeverity, AlertState, StateTransitionError};

mod memory;

pub use memory::MemStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    InvalidTransition(#[from] StateTransitionError),
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Durable alert data. The notifier only reads (`notifiable_alerts`);
/// identity and state mutation belong to the embedding layer.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// List alerts in creation order. `limit` of zero means unbounded.
    async fn list_alerts(&self, offset: usize, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Create a new alert in `New` state with a fresh id.
    async fn create_alert(
        &self,
        name: &str,
        severity: AlertSeverity,
    ) -> Result<Alert, StoreError>;

    async fn get_alert(&self, id: &str) -> Result<Alert, StoreError>;

    /// Apply a validated state transition and bump the update timestamp.
    async fn set_alert_state(&self, id: &str, state: AlertState) -> Result<Alert, StoreError>;

    async fn delete_alert(&self, id: &str) -> Result<(), StoreError>;

    /// The alerts that should currently be pushed to targets, most recent
    /// first.
    async fn notifiable_alerts(&self) -> Result<Vec<Alert>, StoreError>;
}
