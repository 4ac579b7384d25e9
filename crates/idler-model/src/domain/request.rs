use serde::{Deserialize, Serialize};

use super::{InstanceId, Zone};

/// Body of the runner control endpoints and of scheduled stop callbacks.
///
/// Field aliases keep manual triggers written against the `vm_instance_*` names working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerRequest {
    #[serde(alias = "vm_instance_name")]
    pub instance_id: InstanceId,
    /// Falls back to the routing table, then to the configured default zone.
    #[serde(default, alias = "vm_instance_zone", skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    /// How many times this stop has already been deferred.
    #[serde(default)]
    pub attempt: u32,
}

impl RunnerRequest {
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            zone: None,
            attempt: 0,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<Zone>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_legacy_field_names() {
        let req: RunnerRequest = serde_json::from_str(
            r#"{"vm_instance_name":"vm1","vm_instance_zone":"us-central1-a"}"#,
        )
        .unwrap();
        assert_eq!(req.instance_id.as_str(), "vm1");
        assert_eq!(req.zone.as_deref(), Some("us-central1-a"));
        assert_eq!(req.attempt, 0);
    }

    #[test]
    fn zone_and_attempt_are_optional() {
        let req: RunnerRequest = serde_json::from_str(r#"{"instance_id":"vm1"}"#).unwrap();
        assert!(req.zone.is_none());

        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("zone"));
    }
}
