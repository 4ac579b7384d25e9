use serde::{Deserialize, Serialize};

use super::OperationId;

/// Result of an idempotent start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A start was issued; `operation` names the backend operation.
    Starting { operation: OperationId },
    /// The instance was already running; nothing was issued.
    AlreadyRunning,
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    /// A stop was issued; `operation` names the backend operation.
    Stopping { operation: OperationId },
    /// The instance was not running; nothing was issued.
    AlreadyStopped,
    /// The stop was not executed and a follow-up check was scheduled instead.
    Skipped {
        reason: SkipReason,
        retry_in_secs: u64,
    },
}

/// Why a stop was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The runner reported an in-flight job.
    RunnerBusy,
    /// The job-status query failed; the runner is assumed busy.
    BusyStateUnknown,
}

impl SkipReason {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            SkipReason::RunnerBusy => "runner_busy",
            SkipReason::BusyStateUnknown => "busy_state_unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_outcome_wire_shape() {
        let json = serde_json::to_value(StartOutcome::Starting {
            operation: "op-1".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "starting");
        assert_eq!(json["operation"], "op-1");

        let json = serde_json::to_value(StartOutcome::AlreadyRunning).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "already_running" }));
    }

    #[test]
    fn stop_outcome_wire_shape() {
        let json = serde_json::to_value(StopOutcome::AlreadyStopped).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "already_stopped" }));

        let json = serde_json::to_value(StopOutcome::Skipped {
            reason: SkipReason::RunnerBusy,
            retry_in_secs: 60,
        })
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "runner_busy");
        assert_eq!(json["retry_in_secs"], 60);
    }
}
