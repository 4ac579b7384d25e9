use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Power state of a compute instance as reported by the compute backend.
///
/// Owned entirely by the backend: callers re-read it before every decision and never cache it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Repairing,
    /// Compute Engine reports a stopped instance as `TERMINATED`.
    Terminated,
    /// Status string this build does not know about.
    #[serde(untagged)]
    Other(String),
}

impl InstanceState {
    /// Returns `true` only for the fully running state.
    ///
    /// Transitional states are deliberately not running: a start on `STOPPING` or
    /// a stop on `STAGING` is left to the backend to accept or reject.
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Provisioning => "PROVISIONING",
            InstanceState::Staging => "STAGING",
            InstanceState::Running => "RUNNING",
            InstanceState::Stopping => "STOPPING",
            InstanceState::Stopped => "STOPPED",
            InstanceState::Suspending => "SUSPENDING",
            InstanceState::Suspended => "SUSPENDED",
            InstanceState::Repairing => "REPAIRING",
            InstanceState::Terminated => "TERMINATED",
            InstanceState::Other(s) => s,
        }
    }
}

impl FromStr for InstanceState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.trim().to_ascii_uppercase().as_str() {
            "PROVISIONING" => InstanceState::Provisioning,
            "STAGING" => InstanceState::Staging,
            "RUNNING" => InstanceState::Running,
            "STOPPING" => InstanceState::Stopping,
            "STOPPED" => InstanceState::Stopped,
            "SUSPENDING" => InstanceState::Suspending,
            "SUSPENDED" => InstanceState::Suspended,
            "REPAIRING" => InstanceState::Repairing,
            "TERMINATED" => InstanceState::Terminated,
            _ => InstanceState::Other(s.to_string()),
        };
        Ok(state)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_running() {
        assert!(InstanceState::Running.is_running());

        assert!(!InstanceState::Staging.is_running());
        assert!(!InstanceState::Stopping.is_running());
        assert!(!InstanceState::Terminated.is_running());
        assert!(!InstanceState::Other("WARMING".into()).is_running());
    }

    #[test]
    fn parses_backend_status_strings() {
        assert_eq!("RUNNING".parse::<InstanceState>().unwrap(), InstanceState::Running);
        assert_eq!("terminated".parse::<InstanceState>().unwrap(), InstanceState::Terminated);
        assert_eq!(
            "WARMING".parse::<InstanceState>().unwrap(),
            InstanceState::Other("WARMING".into())
        );
    }

    #[test]
    fn serde_uses_backend_spelling() {
        let json = serde_json::to_string(&InstanceState::Running).unwrap();
        assert_eq!(json, r#""RUNNING""#);

        let back: InstanceState = serde_json::from_str(r#""TERMINATED""#).unwrap();
        assert_eq!(back, InstanceState::Terminated);
    }
}
