//! Cloud Tasks backed stop scheduling.
//!
//! Cloud Tasks refuses to reuse a task name for some time after the task was deleted or has
//! run, so the logical key (`stop-<instance>`) cannot be the task id itself. Each created task
//! is named `<key>-<unix_millis>`, and deleting a key removes every queued task whose id is the
//! key followed by `-<digits>`.
use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use base64::Engine;
use gcp_auth::TokenProvider;
use idler_core::{BackendError, DeferredTask, TaskBackend};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};

use crate::{
    GcpError,
    api::{access_token, error_from_response, parse_json, transport},
};

const BACKEND: &str = "tasks";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-tasks"];
const DEFAULT_ENDPOINT: &str = "https://cloudtasks.googleapis.com/v2";
const RUNNER_SECRET_HEADER: &str = "X-Runner-Secret";
const PAGE_SIZE: &str = "1000";

#[derive(Clone)]
pub struct CloudTasksConfig {
    pub project_id: String,
    pub location: String,
    pub queue_name: String,
    /// Base URL of this service; callbacks hit `<service_url>/runner/stop`.
    pub service_url: String,
    /// Sent as `X-Runner-Secret` on every callback.
    pub runner_secret: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl fmt::Debug for CloudTasksConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudTasksConfig")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("queue_name", &self.queue_name)
            .field("service_url", &self.service_url)
            .field("runner_secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CloudTasksConfig {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        queue_name: impl Into<String>,
        service_url: impl Into<String>,
        runner_secret: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
            queue_name: queue_name.into(),
            service_url: service_url.into(),
            runner_secret: runner_secret.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// `projects/<p>/locations/<l>/queues/<q>`
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }

    pub fn stop_url(&self) -> String {
        format!("{}/runner/stop", self.service_url.trim_end_matches('/'))
    }

    fn api(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint.trim_end_matches('/'))
    }

    fn validate(&self) -> Result<(), GcpError> {
        for (name, value) in [
            ("project_id", &self.project_id),
            ("location", &self.location),
            ("queue_name", &self.queue_name),
            ("service_url", &self.service_url),
        ] {
            if value.trim().is_empty() {
                return Err(GcpError::Config(format!("{name} cannot be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    task: CloudTask,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudTask {
    name: String,
    http_request: HttpRequest,
    schedule_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest {
    url: String,
    http_method: &'static str,
    headers: HashMap<&'static str, String>,
    /// Base64 encoded.
    body: String,
}

#[derive(Debug, Deserialize)]
struct TaskName {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksResponse {
    #[serde(default)]
    tasks: Vec<TaskName>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// `true` when `task_id` was created for `key`, i.e. it is `<key>-<digits>`.
fn belongs_to_key(task_id: &str, key: &str) -> bool {
    task_id
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

fn task_id_for(key: &str, now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{key}-{millis}")
}

fn format_schedule_time(at: SystemTime) -> String {
    OffsetDateTime::from(at)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn build_create_request(
    config: &CloudTasksConfig,
    task: &DeferredTask,
    now: SystemTime,
) -> Result<CreateTaskRequest, BackendError> {
    let payload = serde_json::to_vec(&task.request).map_err(|e| BackendError::InvalidResponse {
        backend: BACKEND,
        message: format!("encode callback payload: {e}"),
    })?;

    let headers = HashMap::from([
        ("Content-Type", "application/json".to_string()),
        (RUNNER_SECRET_HEADER, config.runner_secret.clone()),
    ]);

    Ok(CreateTaskRequest {
        task: CloudTask {
            name: format!(
                "{}/tasks/{}",
                config.queue_path(),
                task_id_for(&task.key, now)
            ),
            http_request: HttpRequest {
                url: config.stop_url(),
                http_method: "POST",
                headers,
                body: base64::engine::general_purpose::STANDARD.encode(payload),
            },
            schedule_time: format_schedule_time(task.schedule_at),
        },
    })
}

/// Cloud Tasks implementation of [`TaskBackend`].
pub struct CloudTasksScheduler {
    config: CloudTasksConfig,
    provider: Arc<dyn TokenProvider>,
    client: reqwest::Client,
}

impl fmt::Debug for CloudTasksScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudTasksScheduler")
            .field("config", &self.config)
            .field("provider", &"<TokenProvider>")
            .finish()
    }
}

impl CloudTasksScheduler {
    pub fn new(
        config: CloudTasksConfig,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self, GcpError> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            provider,
            client,
        })
    }

    /// Full resource names of every queued task created for `key`.
    async fn list_for_key(&self, token: &str, key: &str) -> Result<Vec<String>, BackendError> {
        let queue = self.config.queue_path();
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = Url::parse(&self.config.api(&format!("{queue}/tasks"))).map_err(|e| {
                BackendError::Transport {
                    backend: BACKEND,
                    message: format!("invalid tasks url: {e}"),
                }
            })?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", PAGE_SIZE);
                if let Some(t) = &page_token {
                    query.append_pair("pageToken", t);
                }
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| transport(BACKEND, e))?;
            if !response.status().is_success() {
                return Err(error_from_response(BACKEND, &queue, response).await);
            }

            let page: ListTasksResponse = parse_json(BACKEND, response).await?;
            names.extend(page.tasks.into_iter().map(|t| t.name).filter(|name| {
                name.rsplit('/')
                    .next()
                    .is_some_and(|id| belongs_to_key(id, key))
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl TaskBackend for CloudTasksScheduler {
    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let token = access_token(&self.provider, BACKEND, SCOPES).await?;
        let names = self.list_for_key(&token, key).await?;

        let mut deleted = false;
        for name in names {
            let response = self
                .client
                .delete(self.config.api(&name))
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| transport(BACKEND, e))?;

            let status = response.status();
            if status.is_success() {
                debug!(task = %name, "task deleted");
                deleted = true;
            } else if status == StatusCode::NOT_FOUND {
                // Fired or deleted between list and delete.
                debug!(task = %name, "task already gone");
            } else {
                return Err(error_from_response(BACKEND, &name, response).await);
            }
        }
        Ok(deleted)
    }

    async fn create(&self, task: DeferredTask) -> Result<String, BackendError> {
        let request = build_create_request(&self.config, &task, SystemTime::now())?;
        let token = access_token(&self.provider, BACKEND, SCOPES).await?;
        let url = self
            .config
            .api(&format!("{}/tasks", self.config.queue_path()));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(BACKEND, &request.task.name, response).await);
        }

        let created: TaskName = parse_json(BACKEND, response).await?;
        info!(task = %created.name, schedule_time = %request.task.schedule_time, "task created");
        Ok(created.name)
    }
}

#[cfg(test)]
mod tests {
    use idler_model::{InstanceId, RunnerRequest};

    use super::*;

    fn config() -> CloudTasksConfig {
        CloudTasksConfig::new(
            "proj",
            "us-central1",
            "runner-stops",
            "https://idler.example.run.app/",
            "s3cret",
        )
    }

    #[test]
    fn queue_path_and_callback_url() {
        let cfg = config();
        assert_eq!(
            cfg.queue_path(),
            "projects/proj/locations/us-central1/queues/runner-stops"
        );
        assert_eq!(cfg.stop_url(), "https://idler.example.run.app/runner/stop");
        assert_eq!(
            cfg.api("projects/p/locations/l/queues/q/tasks"),
            "https://cloudtasks.googleapis.com/v2/projects/p/locations/l/queues/q/tasks"
        );
    }

    #[test]
    fn task_ids_are_matched_by_key_and_numeric_suffix() {
        assert!(belongs_to_key("stop-vm1-1700000000000", "stop-vm1"));
        assert!(!belongs_to_key("stop-vm1", "stop-vm1"));
        assert!(!belongs_to_key("stop-vm1-", "stop-vm1"));
        assert!(!belongs_to_key("stop-vm1-2-1700000000000", "stop-vm1"));
        assert!(belongs_to_key("stop-vm1-2-1700000000000", "stop-vm1-2"));
        assert!(!belongs_to_key("stop-vm10-1700000000000", "stop-vm1"));
    }

    #[test]
    fn task_id_carries_millis() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(task_id_for("stop-vm1", at), "stop-vm1-1700000000123");
    }

    #[test]
    fn schedule_time_is_rfc3339() {
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let formatted = format_schedule_time(at);
        assert_eq!(formatted, "2023-11-14T22:13:20Z");
        assert!(OffsetDateTime::parse(&formatted, &Rfc3339).is_ok());
    }

    #[test]
    fn create_request_targets_stop_endpoint_with_secret() {
        let now = UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);
        let task = DeferredTask {
            key: "stop-vm1".into(),
            delay: Duration::from_secs(180),
            schedule_at: now + Duration::from_secs(180),
            request: RunnerRequest::new(InstanceId::new("vm1").unwrap())
                .with_zone("us-central1-a")
                .with_attempt(2),
        };

        let req = build_create_request(&config(), &task, now).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        let t = &json["task"];

        assert_eq!(
            t["name"],
            "projects/proj/locations/us-central1/queues/runner-stops/tasks/stop-vm1-1700000000000"
        );
        assert_eq!(t["scheduleTime"], "2023-11-14T22:16:20Z");
        assert_eq!(t["httpRequest"]["httpMethod"], "POST");
        assert_eq!(
            t["httpRequest"]["url"],
            "https://idler.example.run.app/runner/stop"
        );
        assert_eq!(t["httpRequest"]["headers"]["X-Runner-Secret"], "s3cret");

        let body = base64::engine::general_purpose::STANDARD
            .decode(t["httpRequest"]["body"].as_str().unwrap())
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"instance_id": "vm1", "zone": "us-central1-a", "attempt": 2})
        );
    }

    #[test]
    fn list_response_tolerates_empty_queue() {
        let page: ListTasksResponse = serde_json::from_str("{}").unwrap();
        assert!(page.tasks.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn config_debug_redacts_secret() {
        let dbg = format!("{:?}", config());
        assert!(!dbg.contains("s3cret"));
    }
}
