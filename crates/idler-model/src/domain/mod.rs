mod instance_id;
pub use instance_id::InstanceId;

mod instance_state;
pub use instance_state::InstanceState;

mod outcome;
pub use outcome::{SkipReason, StartOutcome, StopOutcome};

mod request;
pub use request::RunnerRequest;

use serde::{Deserialize, Serialize};

/// Compute zone an instance lives in (e.g. `"us-central1-a"`).
pub type Zone = String;

/// Identifier of a long-running backend operation (start/stop).
pub type OperationId = String;

/// Fully resolved instance address: identifier plus zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceTarget {
    pub instance_id: InstanceId,
    pub zone: Zone,
}

impl InstanceTarget {
    pub fn new(instance_id: InstanceId, zone: impl Into<Zone>) -> Self {
        Self {
            instance_id,
            zone: zone.into(),
        }
    }
}

impl std::fmt::Display for InstanceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.zone, self.instance_id)
    }
}
