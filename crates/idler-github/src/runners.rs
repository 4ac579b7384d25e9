use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use idler_core::{BackendError, JobStatusBackend};
use reqwest::{
    StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    GithubError,
    app::{AppCredentials, InstallationAuth},
};

const BACKEND: &str = "github";
const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// REST API root; differs from the default on GitHub Enterprise Server.
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GithubConfig {
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn runners_url(&self, repo: &str, page: usize) -> String {
        format!(
            "{}/repos/{repo}/actions/runners?per_page={PER_PAGE}&page={page}",
            self.api_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct RunnersPage {
    #[serde(default)]
    runners: Vec<Runner>,
}

#[derive(Debug, Deserialize)]
struct Runner {
    name: String,
    #[serde(default)]
    status: String,
    busy: bool,
}

/// [`JobStatusBackend`] over the repository self-hosted runners API.
#[derive(Debug, Clone)]
pub struct GithubRunners {
    config: GithubConfig,
    auth: Arc<InstallationAuth>,
    client: reqwest::Client,
}

impl GithubRunners {
    pub fn new(config: GithubConfig, credentials: AppCredentials) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("idler/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let api_url = config.api_url.trim_end_matches('/').to_string();
        let auth = Arc::new(InstallationAuth::new(credentials, api_url, client.clone()));
        Ok(Self {
            config,
            auth,
            client,
        })
    }

    async fn page(&self, token: &str, repo: &str, page: usize) -> Result<RunnersPage, BackendError> {
        let response = self
            .client
            .get(self.config.runners_url(repo, page))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                backend: BACKEND,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
            return Err(BackendError::Auth {
                backend: BACKEND,
                message: "installation token rejected".into(),
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound {
                backend: BACKEND,
                resource: format!("runners of {repo}"),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                backend: BACKEND,
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                backend: BACKEND,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl JobStatusBackend for GithubRunners {
    async fn runner_busy(&self, repo: &str, runner: &str) -> Result<Option<bool>, BackendError> {
        let token = self.auth.token().await?;

        let mut page = 1;
        loop {
            let batch = self.page(&token, repo, page).await?;
            if let Some(found) = find_runner(&batch.runners, runner) {
                debug!(repo, runner, status = %found.status, busy = found.busy, "runner found");
                return Ok(Some(found.busy));
            }
            if batch.runners.len() < PER_PAGE {
                break;
            }
            page += 1;
        }

        warn!(repo, runner, "runner not registered");
        Ok(None)
    }
}

fn find_runner<'a>(runners: &'a [Runner], name: &str) -> Option<&'a Runner> {
    runners.iter().find(|r| r.name == name)
}
