use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use idler_core::{BackendError, ComputeBackend};
use idler_model::{InstanceState, InstanceTarget, OperationId};
use serde::Deserialize;
use tracing::debug;

use crate::{
    GcpError,
    api::{access_token, error_from_response, parse_json, transport},
};

const BACKEND: &str = "compute";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/compute"];
const DEFAULT_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub project_id: String,
    /// API root, without trailing slash.
    pub endpoint: String,
    pub timeout: Duration,
}

impl ComputeConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
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

    fn instance_url(&self, target: &InstanceTarget) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances/{}",
            self.endpoint.trim_end_matches('/'),
            self.project_id,
            target.zone,
            target.instance_id
        )
    }
}

/// Subset of the `instances` resource.
#[derive(Debug, Deserialize)]
struct Instance {
    status: String,
}

/// Subset of the zonal `operations` resource returned by start/stop.
#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
}

/// Compute Engine power control over the `instances.get/start/stop` REST methods.
pub struct ComputeEngine {
    config: ComputeConfig,
    provider: Arc<dyn TokenProvider>,
    client: reqwest::Client,
}

impl fmt::Debug for ComputeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeEngine")
            .field("config", &self.config)
            .field("provider", &"<TokenProvider>")
            .finish()
    }
}

impl ComputeEngine {
    pub fn new(config: ComputeConfig, provider: Arc<dyn TokenProvider>) -> Result<Self, GcpError> {
        if config.project_id.trim().is_empty() {
            return Err(GcpError::Config("project_id cannot be empty".into()));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            provider,
            client,
        })
    }

    async fn power(&self, target: &InstanceTarget, verb: &str) -> Result<OperationId, BackendError> {
        let token = access_token(&self.provider, BACKEND, SCOPES).await?;
        let url = format!("{}/{verb}", self.config.instance_url(target));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(BACKEND, &target.to_string(), response).await);
        }

        let op: Operation = parse_json(BACKEND, response).await?;
        debug!(instance = %target, verb, operation = %op.name, "operation accepted");
        Ok(op.name)
    }
}

#[async_trait]
impl ComputeBackend for ComputeEngine {
    async fn status(&self, target: &InstanceTarget) -> Result<InstanceState, BackendError> {
        let token = access_token(&self.provider, BACKEND, SCOPES).await?;

        let response = self
            .client
            .get(self.config.instance_url(target))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(BACKEND, &target.to_string(), response).await);
        }

        let instance: Instance = parse_json(BACKEND, response).await?;
        Ok(instance
            .status
            .parse::<InstanceState>()
            .unwrap_or_else(|never| match never {}))
    }

    async fn start(&self, target: &InstanceTarget) -> Result<OperationId, BackendError> {
        self.power(target, "start").await
    }

    async fn stop(&self, target: &InstanceTarget) -> Result<OperationId, BackendError> {
        self.power(target, "stop").await
    }
}
