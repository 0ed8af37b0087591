//! Alert entity with its lifecycle state machine and severity levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// A state change that the lifecycle state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid alert state transition: {from} -> {to}")]
pub struct StateTransitionError {
    pub from: AlertState,
    pub to: AlertState,
}

/// An unknown state or severity label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("invalid alert state: '{0}'")]
    State(String),
    #[error("invalid alert severity: '{0}'")]
    Severity(String),
}

/// Lifecycle state of an alert.
///
/// `Closed` is terminal: the only valid request out of it is the
/// idempotent self-transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    New,
    Open,
    Acknowledged,
    Stale,
    Closed,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::New => "new",
            AlertState::Open => "open",
            AlertState::Acknowledged => "acknowledged",
            AlertState::Stale => "stale",
            AlertState::Closed => "closed",
        }
    }

    /// Glyph used in front of the state label in notification text.
    pub fn glyph(&self) -> &'static str {
        match self {
            AlertState::New => "🌟",
            AlertState::Open => "🔔",
            AlertState::Acknowledged => "🔕",
            AlertState::Stale => "❓",
            AlertState::Closed => "✅",
        }
    }

    /// Whether an alert in this state should still be pushed to targets.
    pub fn notifiable(&self) -> bool {
        matches!(self, AlertState::New | AlertState::Open | AlertState::Stale)
    }

    /// Validate a requested state change and return the new state.
    ///
    /// Pure function: callers persist the result and bump the alert's
    /// `updated_at` themselves. Requesting the current state is a no-op
    /// success, even for `Closed`.
    pub fn transition(self, to: AlertState) -> Result<AlertState, StateTransitionError> {
        use AlertState::*;

        if self == to {
            return Ok(to);
        }
        let valid = match (self, to) {
            (New, Open) => true,
            (Open, Acknowledged) | (Open, Stale) => true,
            (Acknowledged, Open) | (Acknowledged, Stale) => true,
            (Stale, Open) => true,
            (from, Closed) => from != Closed,
            _ => false,
        };
        if valid {
            Ok(to)
        } else {
            Err(StateTransitionError { from: self, to })
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertState {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertState::New),
            "open" => Ok(AlertState::Open),
            "acknowledged" => Ok(AlertState::Acknowledged),
            "stale" => Ok(AlertState::Stale),
            "closed" => Ok(AlertState::Closed),
            _ => Err(LabelError::State(s.to_string())),
        }
    }
}

/// Severity of an alert, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Informational,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Informational => "informational",
        }
    }

    /// Glyph used in front of the severity label in notification text.
    pub fn glyph(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "‼️",
            AlertSeverity::Warning => "⚠️",
            AlertSeverity::Informational => "ℹ️",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(AlertSeverity::Critical),
            "warning" => Ok(AlertSeverity::Warning),
            "informational" => Ok(AlertSeverity::Informational),
            _ => Err(LabelError::Severity(s.to_string())),
        }
    }
}

/// A tracked problem report.
///
/// The id is a ULID, so sorting alerts by id sorts them by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated")]
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub state: AlertState,
    pub severity: AlertSeverity,
}

impl Alert {
    /// Create a fresh alert in `New` state with a newly minted id.
    pub fn new(name: impl Into<String>, severity: AlertSeverity) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            created_at: now,
            updated_at: now,
            name: name.into(),
            state: AlertState::New,
            severity,
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AlertSeverity::*;
    use AlertState::*;

    const ALL_STATES: [AlertState; 5] = [New, Open, Acknowledged, Stale, Closed];

    #[test]
    fn test_valid_transitions() {
        let valid = [
            (New, Open),
            (Open, Acknowledged),
            (Open, Stale),
            (Acknowledged, Stale),
            (Acknowledged, Open),
            (Stale, Open),
            (New, Closed),
            (Open, Closed),
            (Acknowledged, Closed),
            (Stale, Closed),
        ];
        for (from, to) in valid {
            assert_eq!(from.transition(to), Ok(to), "{from} -> {to} should be valid");
        }
    }

    #[test]
    fn test_self_transition_is_idempotent() {
        for state in ALL_STATES {
            assert_eq!(state.transition(state), Ok(state));
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        for to in [New, Open, Acknowledged, Stale] {
            assert_eq!(
                Closed.transition(to),
                Err(StateTransitionError { from: Closed, to })
            );
        }
    }

    #[test]
    fn test_invalid_transitions_carry_both_states() {
        let invalid = [
            (New, Acknowledged),
            (New, Stale),
            (Open, New),
            (Acknowledged, New),
            (Stale, New),
            (Stale, Acknowledged),
        ];
        for (from, to) in invalid {
            let err = from.transition(to).unwrap_err();
            assert_eq!(err.from, from);
            assert_eq!(err.to, to);
        }
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        // Every (from, to) pair either succeeds with `to` or fails with both
        // states attached; nothing panics and nothing is coerced.
        for from in ALL_STATES {
            for to in ALL_STATES {
                match from.transition(to) {
                    Ok(state) => assert_eq!(state, to),
                    Err(err) => assert_eq!((err.from, err.to), (from, to)),
                }
            }
        }
    }

    #[test]
    fn test_state_labels_round_trip() {
        for state in ALL_STATES {
            assert_eq!(state.as_str().parse::<AlertState>(), Ok(state));
        }
        assert_eq!(
            "bogus".parse::<AlertState>(),
            Err(LabelError::State("bogus".to_string()))
        );
        // Labels are lowercase only.
        assert!("Open".parse::<AlertState>().is_err());
    }

    #[test]
    fn test_severity_labels_round_trip() {
        for severity in [Critical, Warning, Informational] {
            assert_eq!(severity.as_str().parse::<AlertSeverity>(), Ok(severity));
        }
        assert_eq!(
            "fatal".parse::<AlertSeverity>(),
            Err(LabelError::Severity("fatal".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_lowercase_labels() {
        let alert = Alert::new("disk-full", Critical);
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"state\":\"new\""));
        assert!(json.contains("\"severity\":\"critical\""));

        let back: Alert = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alert);
    }

    #[test]
    fn test_unknown_label_is_a_deserialization_error() {
        let json = r#"{"id":"x","created":"2024-01-01T00:00:00Z","updated":"2024-01-01T00:00:00Z","name":"n","state":"wedged","severity":"critical"}"#;
        assert!(serde_json::from_str::<Alert>(json).is_err());
    }

    #[test]
    fn test_notifiable_states() {
        assert!(New.notifiable());
        assert!(Open.notifiable());
        assert!(Stale.notifiable());
        assert!(!Acknowledged.notifiable());
        assert!(!Closed.notifiable());
    }

    #[test]
    fn test_new_alert_invariants() {
        let alert = Alert::new("disk-full", Warning);
        assert_eq!(alert.state, New);
        assert_eq!(alert.severity, Warning);
        assert!(alert.updated_at >= alert.created_at);
        assert!(!alert.id.is_empty());
    }
}
