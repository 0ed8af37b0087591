//! GSM modem delivery backend over a serial-attached device.
//!
//! The modem is a single physical line, so init, delivery and shutdown of
//! one backend instance are serialized behind one mutex. The serial port
//! itself sits behind a small opener seam; production opens the configured
//! device, tests substitute an in-memory pipe.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_serial::SerialStream;
use tracing::debug;

use super::at::AtSession;
use crate::alert::Alert;
use crate::config::{SmsModemConfig, Target};
use crate::notifier::backend::{
    BackendError, BackendHealth, HealthCell, NotifyBackend, SendOutcome,
};
use crate::notifier::format::alert_summary;

pub(crate) trait ModemStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ModemStream for T {}

pub(crate) trait PortOpener: Send + Sync {
    fn open(&self, conf: &SmsModemConfig) -> Result<Box<dyn ModemStream>, BackendError>;
}

struct SerialOpener;

impl PortOpener for SerialOpener {
    fn open(&self, conf: &SmsModemConfig) -> Result<Box<dyn ModemStream>, BackendError> {
        let builder = tokio_serial::new(conf.device.as_str(), conf.baudrate);
        let stream = SerialStream::open(&builder)
            .map_err(|e| BackendError::Transport(format!("open {}: {e}", conf.device)))?;
        Ok(Box::new(stream))
    }
}

pub struct SmsModemBackend {
    name: String,
    conf: SmsModemConfig,
    health: HealthCell,
    session: Mutex<Option<AtSession<Box<dyn ModemStream>>>>,
    opener: Box<dyn PortOpener>,
}

impl SmsModemBackend {
    pub fn new(name: impl Into<String>, conf: SmsModemConfig) -> Self {
        Self::with_opener(name, conf, Box::new(SerialOpener))
    }

    fn with_opener(
        name: impl Into<String>,
        conf: SmsModemConfig,
        opener: Box<dyn PortOpener>,
    ) -> Self {
        Self {
            name: name.into(),
            conf,
            health: HealthCell::new(),
            session: Mutex::new(None),
            opener,
        }
    }

    async fn bring_up(&self) -> Result<AtSession<Box<dyn ModemStream>>, BackendError> {
        let stream = self.opener.open(&self.conf)?;
        let mut session = AtSession::new(stream, self.conf.command_timeout(), self.name.clone());

        session.handshake().await?;
        if let Some(pin) = self.conf.pin {
            debug!(backend = %self.name, "submitting SIM PIN");
            session.enter_pin(pin).await?;
        }
        session.select_text_mode().await?;
        session.subscribe_incoming().await?;
        Ok(session)
    }
}

#[async_trait]
impl NotifyBackend for SmsModemBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), BackendError> {
        let mut slot = self.session.lock().await;
        // Dropping a previous session closes its port before we reopen.
        *slot = None;

        match self.bring_up().await {
            Ok(session) => {
                *slot = Some(session);
                self.health.set(BackendHealth::Ready);
                Ok(())
            }
            Err(err) => {
                self.health.set(BackendHealth::Failed);
                Err(err)
            }
        }
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
        let Some(number) = target.sms.as_deref() else {
            return Ok(SendOutcome::Skipped);
        };

        let mut slot = self.session.lock().await;
        let Some(session) = slot.as_mut() else {
            return Ok(SendOutcome::Skipped);
        };

        let message = alert_summary(alert);
        let result = tokio::time::timeout(timeout, session.send_sms(number, &message)).await;
        match result {
            Ok(Ok(())) => {
                debug!(backend = %self.name, target = %target.name, alert = %alert.id,
                    "sms submitted");
                Ok(SendOutcome::Sent)
            }
            Ok(Err(err)) => {
                *slot = None;
                self.health.set(BackendHealth::Failed);
                Err(err)
            }
            Err(_) => {
                *slot = None;
                self.health.set(BackendHealth::Failed);
                Err(BackendError::Timeout(timeout))
            }
        }
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        let mut slot = self.session.lock().await;
        *slot = None;
        self.health.set(BackendHealth::Uninitialized);
        Ok(())
    }
}
