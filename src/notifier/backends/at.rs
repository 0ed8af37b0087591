//! Minimal AT command/response session over an async byte stream.
//!
//! The stream is generic so the modem backend can hand in a serial port
//! while tests drive the session through an in-memory duplex pipe.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::notifier::backend::BackendError;

const CTRL_Z: u8 = 0x1a;

/// Single-SMS limit for the GSM 7-bit default alphabet.
const SMS_SINGLE_LEN: usize = 160;
/// Payload per part once a message has to be split.
const SMS_PART_LEN: usize = 153;

pub(crate) struct AtSession<S> {
    stream: S,
    buf: Vec<u8>,
    timeout: Duration,
    label: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> AtSession<S> {
    pub(crate) fn new(stream: S, timeout: Duration, label: impl Into<String>) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            timeout,
            label: label.into(),
        }
    }

    /// Probe the modem and disable command echo.
    pub(crate) async fn handshake(&mut self) -> Result<(), BackendError> {
        self.command("AT").await?;
        self.command("ATE0").await?;
        Ok(())
    }

    /// Must run before `select_text_mode` on a locked SIM.
    pub(crate) async fn enter_pin(&mut self, pin: u32) -> Result<(), BackendError> {
        self.command(&format!("AT+CPIN={pin}")).await?;
        Ok(())
    }

    pub(crate) async fn select_text_mode(&mut self) -> Result<(), BackendError> {
        self.command("AT+CMGF=1").await?;
        Ok(())
    }

    /// Route new-message indications to us. Incoming messages are only
    /// logged when they show up between responses; there is no inbound
    /// protocol.
    pub(crate) async fn subscribe_incoming(&mut self) -> Result<(), BackendError> {
        self.command("AT+CNMI=2,2,0,0,0").await?;
        Ok(())
    }

    /// Send one command and collect its informational lines up to the
    /// final result code, bounded by the per-command timeout.
    pub(crate) async fn command(&mut self, cmd: &str) -> Result<Vec<String>, BackendError> {
        debug!(modem = %self.label, command = %cmd, "sending AT command");
        let timeout = self.timeout;
        let exchange = async {
            self.write_bytes(format!("{cmd}\r").as_bytes()).await?;
            self.collect_result(cmd).await
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }

    /// Send `text` to `number` in text mode, splitting over-length
    /// messages into sequential parts. Each part is one bounded exchange.
    pub(crate) async fn send_sms(&mut self, number: &str, text: &str) -> Result<(), BackendError> {
        for part in split_sms(text) {
            let timeout = self.timeout;
            let cmd = format!("AT+CMGS=\"{number}\"");
            let exchange = async {
                self.write_bytes(format!("{cmd}\r").as_bytes()).await?;
                self.await_prompt(&cmd).await?;
                let mut body = part.into_bytes();
                body.push(CTRL_Z);
                self.write_bytes(&body).await?;
                self.collect_result(&cmd).await
            };
            let response = match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result?,
                Err(_) => return Err(BackendError::Timeout(timeout)),
            };
            debug!(modem = %self.label, ?response, "message part accepted");
        }
        Ok(())
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), BackendError> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| BackendError::Transport(format!("modem write: {e}")))?;
        self.stream
            .flush()
            .await
            .map_err(|e| BackendError::Transport(format!("modem flush: {e}")))
    }

    async fn collect_result(&mut self, cmd: &str) -> Result<Vec<String>, BackendError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "OK" {
                return Ok(lines);
            }
            if is_final_error(&line) {
                return Err(BackendError::Command {
                    command: cmd.to_string(),
                    response: line,
                });
            }
            if line.starts_with("+CMT:") {
                let body = self.read_line().await?;
                info!(modem = %self.label, header = %line, body = %body, "received SMS");
                continue;
            }
            if line.starts_with("+CMTI:") || line == "RING" {
                info!(modem = %self.label, event = %line, "unsolicited modem event");
                continue;
            }
            if line == cmd {
                // command echo, seen until ATE0 takes effect
                continue;
            }
            lines.push(line);
        }
    }

    /// Wait for the `> ` body prompt after `AT+CMGS`.
    async fn await_prompt(&mut self, cmd: &str) -> Result<(), BackendError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'>') {
                self.buf.drain(..=pos);
                return Ok(());
            }
            while let Some(line) = self.take_line() {
                if is_final_error(&line) {
                    return Err(BackendError::Command {
                        command: cmd.to_string(),
                        response: line,
                    });
                }
            }
            self.fill().await?;
        }
    }

    async fn read_line(&mut self) -> Result<String, BackendError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                return Ok(line);
            }
            self.fill().await?;
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self
            .buf
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    async fn fill(&mut self) -> Result<(), BackendError> {
        let mut chunk = [0u8; 256];
        let n = self
            .stream
            .read(&mut chunk)
            .await
            .map_err(|e| BackendError::Transport(format!("modem read: {e}")))?;
        if n == 0 {
            return Err(BackendError::Transport("modem stream closed".to_string()));
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

fn is_final_error(line: &str) -> bool {
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

fn split_sms(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= SMS_SINGLE_LEN {
        return vec![text.to_string()];
    }
    chars
        .chunks(SMS_PART_LEN)
        .map(|part| part.iter().collect())
        .collect()
}
