//! SMTP delivery backend. One message per alert, sent through a plain
//! relay; the sender address and smarthost come from configuration.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::alert::Alert;
use crate::config::{EmailConfig, Target};
use crate::notifier::backend::{
    BackendError, BackendHealth, HealthCell, NotifyBackend, SendOutcome,
};
use crate::notifier::format::{alert_subject, alert_summary};

pub struct EmailBackend {
    name: String,
    conf: EmailConfig,
    health: HealthCell,
    transport: RwLock<Option<AsyncSmtpTransport<Tokio1Executor>>>,
}

impl EmailBackend {
    pub fn new(name: impl Into<String>, conf: EmailConfig) -> Self {
        Self {
            name: name.into(),
            conf,
            health: HealthCell::new(),
            transport: RwLock::new(None),
        }
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, BackendError> {
        let (host, port) = parse_smarthost(&self.conf.smarthost)?;
        Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build())
    }

    fn build_message(&self, address: &str, alert: &Alert) -> Result<Message, BackendError> {
        let from: Mailbox = self.conf.from.parse().map_err(|e| BackendError::Address {
            address: self.conf.from.clone(),
            reason: format!("{e}"),
        })?;
        let to: Mailbox = address.parse().map_err(|e| BackendError::Address {
            address: address.to_string(),
            reason: format!("{e}"),
        })?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(alert_subject(alert))
            .header(ContentType::TEXT_PLAIN)
            .body(alert_summary(alert))
            .map_err(|e| BackendError::Transport(format!("build message: {e}")))
    }

    async fn fail(&self) {
        *self.transport.write().await = None;
        self.health.set(BackendHealth::Failed);
    }
}

/// Split `host:port`, defaulting to the plain SMTP port.
fn parse_smarthost(smarthost: &str) -> Result<(&str, u16), BackendError> {
    match smarthost.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| BackendError::Address {
                address: smarthost.to_string(),
                reason: "invalid port".to_string(),
            })?;
            Ok((host, port))
        }
        None => Ok((smarthost, 25)),
    }
}

#[async_trait]
impl NotifyBackend for EmailBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), BackendError> {
        let mut slot = self.transport.write().await;
        *slot = None;
        self.health.set(BackendHealth::Failed);

        // The sender address has to parse before anything goes out.
        let _: Mailbox = self.conf.from.parse().map_err(|e| BackendError::Address {
            address: self.conf.from.clone(),
            reason: format!("{e}"),
        })?;

        let transport = self.build_transport()?;
        match transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(BackendError::Transport(format!(
                    "relay {} not reachable",
                    self.conf.smarthost
                )))
            }
            Err(e) => {
                return Err(BackendError::Transport(format!(
                    "relay {}: {e}",
                    self.conf.smarthost
                )))
            }
        }

        *slot = Some(transport);
        self.health.set(BackendHealth::Ready);
        Ok(())
    }

    fn ready(&self) -> bool {
        self.health.is_ready()
    }

    async fn deliver(
        &self,
        timeout: Duration,
        target: &Target,
        alert: &Alert,
    ) -> Result<SendOutcome, BackendError> {
        let Some(address) = target.email.as_deref() else {
            return Ok(SendOutcome::Skipped);
        };

        let message = match self.build_message(address, alert) {
            Ok(message) => message,
            Err(err) => {
                // A malformed recipient address is the target's problem,
                // not a transport failure.
                warn!(backend = %self.name, target = %target.name, error = %err,
                    "skipping target with unusable address");
                return Ok(SendOutcome::Skipped);
            }
        };

        let guard = self.transport.read().await;
        let Some(transport) = guard.as_ref() else {
            return Ok(SendOutcome::Skipped);
        };

        let result = tokio::time::timeout(timeout, transport.send(message)).await;
        drop(guard);

        match result {
            Ok(Ok(_)) => {
                debug!(backend = %self.name, target = %target.name, alert = %alert.id,
                    "mail accepted by relay");
                Ok(SendOutcome::Sent)
            }
            Ok(Err(e)) => {
                self.fail().await;
                Err(BackendError::Transport(format!("smtp send: {e}")))
            }
            Err(_) => {
                self.fail().await;
                Err(BackendError::Timeout(timeout))
            }
        }
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        *self.transport.write().await = None;
        self.health.set(BackendHealth::Uninitialized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSeverity;

    fn backend() -> EmailBackend {
        EmailBackend::new(
            "mail",
            EmailConfig {
                from: "alerts@example.org".to_string(),
                smarthost: "relay.example.org:25".to_string(),
            },
        )
    }

    #[test]
    fn test_parse_smarthost() {
        assert_eq!(
            parse_smarthost("relay.example.org:2525").unwrap(),
            ("relay.example.org", 2525)
        );
        assert_eq!(
            parse_smarthost("relay.example.org").unwrap(),
            ("relay.example.org", 25)
        );
        assert!(parse_smarthost("relay.example.org:smtp").is_err());
    }

    #[tokio::test]
    async fn test_deliver_without_email_channel_is_a_routing_miss() {
        let backend = backend();
        let target = Target {
            name: "ops".to_string(),
            email: None,
            sms: Some("+15550001".to_string()),
        };
        let alert = Alert::new("disk-full", AlertSeverity::Critical);

        let outcome = backend
            .deliver(Duration::from_secs(1), &target, &alert)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_deliver_on_uninitialized_backend_is_skipped() {
        let backend = backend();
        assert!(!backend.ready());

        let target = Target {
            name: "ops".to_string(),
            email: Some("ops@example.org".to_string()),
            sms: None,
        };
        let alert = Alert::new("disk-full", AlertSeverity::Critical);

        let outcome = backend
            .deliver(Duration::from_secs(1), &target, &alert)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_unusable_target_address_is_skipped_not_fatal() {
        let backend = backend();
        let target = Target {
            name: "ops".to_string(),
            email: Some("not an address".to_string()),
            sms: None,
        };
        let alert = Alert::new("disk-full", AlertSeverity::Critical);

        let outcome = backend
            .deliver(Duration::from_secs(1), &target, &alert)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_shutdown_without_init_is_a_noop() {
        let backend = backend();
        backend.shutdown().await.unwrap();
        assert!(!backend.ready());
    }

    #[test]
    fn test_message_building() {
        let backend = backend();
        let mut alert = Alert::new("disk-full", AlertSeverity::Critical);
        alert.state = crate::alert::AlertState::Open;

        assert!(backend.build_message("ops@example.org", &alert).is_ok());
        assert!(backend.build_message("not an address", &alert).is_err());
    }
}
