//! Canonical alert text shared by every backend, so operators see the
//! same summary regardless of channel.

use crate::alert::Alert;

/// One-line human-readable alert summary: state, severity, name.
pub fn alert_summary(alert: &Alert) -> String {
    format!(
        "{} {} | {} {} | {}",
        alert.state.glyph(),
        alert.state,
        alert.severity.glyph(),
        alert.severity,
        alert.name
    )
}

/// Subject line for channels that have one.
pub fn alert_subject(alert: &Alert) -> String {
    format!("[{}] {}", alert.severity, alert.name)
}
