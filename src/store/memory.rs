//! In-memory alert store with an optional JSON snapshot on disk.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{AlertStore, StoreError};
use crate::alert::{Alert, AlertSeverity, AlertState};

/// Alerts keyed by ULID, so map order is creation order. When a snapshot
/// path is set, every mutation rewrites the file.
pub struct MemStore {
    alerts: RwLock<BTreeMap<String, Alert>>,
    snapshot: Option<PathBuf>,
}

impl MemStore {
    /// Memory-only store; contents are lost when the process exits.
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// Store backed by a JSON snapshot file. An existing file is loaded,
    /// a missing one is created on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut alerts = BTreeMap::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let loaded: Vec<Alert> = serde_json::from_str(&raw)?;
            for alert in loaded {
                alerts.insert(alert.id.clone(), alert);
            }
            debug!(alerts = alerts.len(), path = %path.display(), "loaded alert snapshot");
        }
        Ok(Self {
            alerts: RwLock::new(alerts),
            snapshot: Some(path),
        })
    }

    fn persist(&self, alerts: &BTreeMap<String, Alert>) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let data: Vec<&Alert> = alerts.values().collect();
        std::fs::write(path, serde_json::to_vec_pretty(&data)?)?;
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for MemStore {
    async fn list_alerts(&self, offset: usize, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().unwrap_or_else(|e| e.into_inner());
        let iter = alerts.values().skip(offset).cloned();
        Ok(if limit > 0 {
            iter.take(limit).collect()
        } else {
            iter.collect()
        })
    }

    async fn create_alert(
        &self,
        name: &str,
        severity: AlertSeverity,
    ) -> Result<Alert, StoreError> {
        let alert = Alert::new(name, severity);
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());
        alerts.insert(alert.id.clone(), alert.clone());
        self.persist(&alerts)?;
        Ok(alert)
    }

    async fn get_alert(&self, id: &str) -> Result<Alert, StoreError> {
        let alerts = self.alerts.read().unwrap_or_else(|e| e.into_inner());
        alerts.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn set_alert_state(&self, id: &str, state: AlertState) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());
        let alert = alerts.get_mut(id).ok_or(StoreError::NotFound)?;
        alert.state = alert.state.transition(state)?;
        alert.updated_at = Utc::now();
        let updated = alert.clone();
        self.persist(&alerts)?;
        Ok(updated)
    }

    async fn delete_alert(&self, id: &str) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());
        if alerts.remove(id).is_none() {
            return Err(StoreError::NotFound);
        }
        self.persist(&alerts)?;
        Ok(())
    }

    async fn notifiable_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().unwrap_or_else(|e| e.into_inner());
        Ok(alerts
            .values()
            .rev()
            .filter(|alert| alert.state.notifiable())
            .cloned()
            .collect())
    }
}
