use serde::{Deserialize, Serialize};

/// Lifecycle transition carried by a `workflow_job` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Queued,
    Waiting,
    InProgress,
    Completed,
    #[serde(untagged)]
    Other(String),
}

impl JobAction {
    pub fn as_str(&self) -> &str {
        match self {
            JobAction::Queued => "queued",
            JobAction::Waiting => "waiting",
            JobAction::InProgress => "in_progress",
            JobAction::Completed => "completed",
            JobAction::Other(s) => s,
        }
    }
}

/// Subset of a job-lifecycle webhook payload the orchestrator reads.
///
/// Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub action: JobAction,
    pub repository: Repository,
    #[serde(alias = "job")]
    pub workflow_job: WorkflowJob,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowJob {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Runner that picked the job up, once assigned.
    #[serde(default)]
    pub runner_name: Option<String>,
}

impl JobEvent {
    pub fn repo(&self) -> &str {
        &self.repository.full_name
    }

    pub fn labels(&self) -> &[String] {
        &self.workflow_job.labels
    }
}
