use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{InstanceId, InstanceTarget, Zone, error::RoutingError};

/// One `repository + labels -> instance` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingEntry {
    /// Repository full name (`owner/name`) that must equal the event's repository.
    pub repo: String,
    /// Labels that must all be present on the job.
    pub labels: BTreeSet<String>,
    pub instance_id: InstanceId,
    pub zone: Zone,
}

impl RoutingEntry {
    /// Returns `true` when `repo` equals this entry's repo and every required label is on the job.
    pub fn matches(&self, repo: &str, job_labels: &[String]) -> bool {
        self.repo == repo
            && self
                .labels
                .iter()
                .all(|required| job_labels.iter().any(|l| l == required))
    }

    pub fn target(&self) -> InstanceTarget {
        InstanceTarget::new(self.instance_id.clone(), self.zone.clone())
    }
}

/// Entry shape accepted from configuration.
#[derive(Debug, Deserialize)]
struct RawEntry {
    repo: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(alias = "vm_instance_name")]
    instance_id: String,
    #[serde(default, alias = "vm_instance_zone")]
    zone: Option<String>,
}

/// Static, validated routing table.
///
/// Built once at startup and never mutated. Lookups walk entries in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
}

impl RoutingTable {
    /// Parse and validate a JSON array of `{repo, labels[], instance_id, zone}` objects.
    ///
    /// `default_zone` fills in entries that omit `zone`.
    pub fn from_json(json: &str, default_zone: Option<&str>) -> Result<Self, RoutingError> {
        let raw: Vec<RawEntry> =
            serde_json::from_str(json).map_err(|e| RoutingError::Malformed(e.to_string()))?;

        let mut entries = Vec::with_capacity(raw.len());
        for (index, r) in raw.into_iter().enumerate() {
            if r.repo.trim().is_empty() {
                return Err(RoutingError::EmptyRepo { index });
            }
            let instance_id =
                InstanceId::new(r.instance_id).map_err(|e| RoutingError::InvalidInstance {
                    index,
                    reason: e.to_string(),
                })?;
            let zone = match r.zone.filter(|z| !z.trim().is_empty()) {
                Some(zone) => zone,
                None => default_zone
                    .map(str::to_string)
                    .ok_or(RoutingError::MissingZone { index })?,
            };
            entries.push(RoutingEntry {
                repo: r.repo,
                labels: r.labels.into_iter().collect(),
                instance_id,
                zone,
            });
        }
        Self::new(entries)
    }

    /// Validate already typed entries.
    ///
    /// Rejects an instance mapped to more than one zone, and two entries for the same repo whose
    /// label sets are nested (equal, or one a subset of the other) while targeting different
    /// instances: a job carrying the larger set would match both.
    pub fn new(entries: Vec<RoutingEntry>) -> Result<Self, RoutingError> {
        let mut zones: HashMap<&InstanceId, &Zone> = HashMap::new();
        for (index, e) in entries.iter().enumerate() {
            if e.repo.trim().is_empty() {
                return Err(RoutingError::EmptyRepo { index });
            }
            if let Some(first) = zones.insert(&e.instance_id, &e.zone)
                && first != &e.zone
            {
                return Err(RoutingError::ConflictingZone {
                    instance: e.instance_id.to_string(),
                    first: first.clone(),
                    second: e.zone.clone(),
                });
            }
        }

        for (i, a) in entries.iter().enumerate() {
            for (j, b) in entries.iter().enumerate().skip(i + 1) {
                if a.repo != b.repo || a.instance_id == b.instance_id {
                    continue;
                }
                if a.labels.is_subset(&b.labels) || b.labels.is_subset(&a.labels) {
                    return Err(RoutingError::Ambiguous {
                        repo: a.repo.clone(),
                        first: i,
                        second: j,
                    });
                }
            }
        }

        Ok(Self { entries })
    }

    /// First entry whose repo equals `repo` and whose labels are all carried by the job.
    ///
    /// Label sets that are disjoint pass load-time validation, yet a job carrying both sets matches
    /// entries for different instances. That job is refused with [`RoutingError::Ambiguous`].
    pub fn find(
        &self,
        repo: &str,
        job_labels: &[String],
    ) -> Result<Option<&RoutingEntry>, RoutingError> {
        let mut matches = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matches(repo, job_labels));

        let Some((first, hit)) = matches.next() else {
            return Ok(None);
        };
        if let Some((second, _)) = matches.find(|(_, e)| e.instance_id != hit.instance_id) {
            return Err(RoutingError::Ambiguous {
                repo: repo.to_string(),
                first,
                second,
            });
        }
        Ok(Some(hit))
    }

    /// All entries routing to `instance`, in declaration order.
    pub fn entries_for<'a>(
        &'a self,
        instance: &InstanceId,
    ) -> impl Iterator<Item = &'a RoutingEntry> + use<'a> {
        let instance = instance.clone();
        self.entries.iter().filter(move |e| e.instance_id == instance)
    }

    /// Distinct repositories routed to `instance`.
    pub fn repos_for(&self, instance: &InstanceId) -> Vec<&str> {
        let mut repos: Vec<&str> = Vec::new();
        for e in self.entries_for(instance) {
            if !repos.contains(&e.repo.as_str()) {
                repos.push(&e.repo);
            }
        }
        repos
    }

    /// Zone configured for `instance`, if it is routed at all.
    pub fn zone_for(&self, instance: &InstanceId) -> Option<&str> {
        self.entries_for(instance).next().map(|e| e.zone.as_str())
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(repo: &str, labels: &[&str], instance: &str) -> RoutingEntry {
        RoutingEntry {
            repo: repo.to_string(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            instance_id: InstanceId::new(instance).unwrap(),
            zone: "us-central1-a".to_string(),
        }
    }

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn find_requires_repo_and_label_subset() {
        let table = RoutingTable::new(vec![entry("o/r", &["self-hosted"], "vm1")]).unwrap();

        let hit = table
            .find("o/r", &labels(&["self-hosted", "linux"]))
            .unwrap()
            .unwrap();
        assert_eq!(hit.instance_id.as_str(), "vm1");

        assert_eq!(table.find("o/other", &labels(&["self-hosted"])), Ok(None));
        assert_eq!(table.find("o/r", &labels(&["ubuntu-latest"])), Ok(None));
        assert_eq!(table.find("o/r", &[]), Ok(None));
    }

    #[test]
    fn empty_required_labels_match_any_job_of_the_repo() {
        let table = RoutingTable::new(vec![entry("o/r", &[], "vm1")]).unwrap();
        assert!(table.find("o/r", &[]).unwrap().is_some());
        assert!(table.find("o/r", &labels(&["anything"])).unwrap().is_some());
    }

    #[test]
    fn job_matching_entries_for_different_instances_is_refused() {
        let table = RoutingTable::new(vec![
            entry("o/r", &["linux"], "vm1"),
            entry("o/r", &["gpu"], "vm2"),
        ])
        .unwrap();

        assert_eq!(
            table.find("o/r", &labels(&["linux", "gpu"])),
            Err(RoutingError::Ambiguous {
                repo: "o/r".into(),
                first: 0,
                second: 1
            })
        );

        let hit = table.find("o/r", &labels(&["gpu"])).unwrap().unwrap();
        assert_eq!(hit.instance_id.as_str(), "vm2");
        let hit = table.find("o/r", &labels(&["linux"])).unwrap().unwrap();
        assert_eq!(hit.instance_id.as_str(), "vm1");
    }

    #[test]
    fn overlapping_entries_for_one_instance_resolve_to_first() {
        let table = RoutingTable::new(vec![
            entry("o/r", &["linux"], "vm1"),
            entry("o/r", &["gpu"], "vm1"),
        ])
        .unwrap();

        let hit = table
            .find("o/r", &labels(&["linux", "gpu"]))
            .unwrap()
            .unwrap();
        assert!(hit.labels.contains("linux"));
    }

    #[test]
    fn nested_labels_for_different_instances_are_ambiguous() {
        let err = RoutingTable::new(vec![
            entry("o/r", &["self-hosted"], "vm1"),
            entry("o/r", &["self-hosted", "linux"], "vm2"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            RoutingError::Ambiguous {
                repo: "o/r".into(),
                first: 0,
                second: 1
            }
        );

        let err = RoutingTable::new(vec![
            entry("o/r", &["self-hosted"], "vm1"),
            entry("o/r", &["self-hosted"], "vm2"),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn shared_instance_across_repos_is_allowed() {
        let table = RoutingTable::new(vec![
            entry("o/a", &["self-hosted"], "vm1"),
            entry("o/b", &["self-hosted"], "vm1"),
            entry("o/a", &["self-hosted", "linux"], "vm1"),
        ])
        .unwrap();

        let vm1 = InstanceId::new("vm1").unwrap();
        assert_eq!(table.repos_for(&vm1), vec!["o/a", "o/b"]);
        assert_eq!(table.entries_for(&vm1).count(), 3);
        assert_eq!(table.zone_for(&vm1), Some("us-central1-a"));
    }

    #[test]
    fn conflicting_zone_is_rejected() {
        let mut second = entry("o/b", &[], "vm1");
        second.zone = "europe-west1-b".into();

        let err = RoutingTable::new(vec![entry("o/a", &[], "vm1"), second]).unwrap_err();
        assert!(matches!(err, RoutingError::ConflictingZone { .. }));
    }

    #[test]
    fn from_json_accepts_legacy_names_and_default_zone() {
        let json = r#"[
            {"repo": "o/r", "labels": ["self-hosted"], "vm_instance_name": "vm1", "vm_instance_zone": "asia-northeast1-b"},
            {"repo": "o/s", "instance_id": "vm2"}
        ]"#;

        let table = RoutingTable::from_json(json, Some("us-central1-a")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.entries()[0].zone, "asia-northeast1-b");
        assert_eq!(table.entries()[1].zone, "us-central1-a");
        assert!(table.entries()[1].labels.is_empty());
    }

    #[test]
    fn from_json_reports_bad_entries() {
        assert!(matches!(
            RoutingTable::from_json("{", None),
            Err(RoutingError::Malformed(_))
        ));
        assert_eq!(
            RoutingTable::from_json(r#"[{"repo":"o/r","instance_id":"vm1"}]"#, None).unwrap_err(),
            RoutingError::MissingZone { index: 0 }
        );
        assert_eq!(
            RoutingTable::from_json(r#"[{"repo":" ","instance_id":"vm1","zone":"z"}]"#, None)
                .unwrap_err(),
            RoutingError::EmptyRepo { index: 0 }
        );
        assert!(matches!(
            RoutingTable::from_json(r#"[{"repo":"o/r","instance_id":"vm 1","zone":"z"}]"#, None),
            Err(RoutingError::InvalidInstance { index: 0, .. })
        ));
    }

    #[test]
    fn empty_table_matches_nothing() {
        let table = RoutingTable::from_json("[]", None).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.find("o/r", &labels(&["self-hosted"])), Ok(None));
    }
}
