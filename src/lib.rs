//! alertmon: track operational alerts and notify configured targets.
//!
//! Alerts move through a validated lifecycle state machine; a background
//! notifier pushes the currently notifiable ones to every configured
//! target through pluggable delivery backends (SMTP relay, GSM modem).

pub mod alert;
pub mod config;
pub mod notifier;
pub mod store;

pub use alert::{Alert, AlertSeverity, AlertState, LabelError, StateTransitionError};
pub use config::{
    BackendConfig, Config, ConfigError, EmailConfig, NotifierConfig, SmsModemConfig, StoreConfig,
    Target,
};
pub use notifier::backend::{BackendError, BackendHealth, NotifyBackend, SendOutcome};
pub use notifier::backends::{EmailBackend, SmsModemBackend};
pub use notifier::format::{alert_subject, alert_summary};
pub use notifier::Notifier;
pub use store::{AlertStore, MemStore, StoreError};
