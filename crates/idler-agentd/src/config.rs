use std::{fmt, time::Duration};

use idler_core::OrchestratorPolicy;
use idler_model::{RoutingError, RoutingTable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("invalid RUNNER_CONFIG: {0}")]
    Routing(#[from] RoutingError),
}

/// Process configuration, read once at startup.
pub struct Config {
    pub project_id: String,
    pub default_zone: Option<String>,
    pub task_location: String,
    pub task_queue: String,
    /// Base URL scheduled callbacks are sent to.
    pub service_url: String,
    pub secret: String,
    pub routes: RoutingTable,
    pub policy: OrchestratorPolicy,
    pub github_app_id: String,
    pub github_private_key: String,
    pub github_installation_id: u64,
    pub github_api_url: Option<String>,
    pub backend_timeout: Duration,
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("default_zone", &self.default_zone)
            .field("task_location", &self.task_location)
            .field("task_queue", &self.task_queue)
            .field("service_url", &self.service_url)
            .field("secret", &"<redacted>")
            .field("routes", &self.routes.len())
            .field("policy", &self.policy)
            .field("github_app_id", &self.github_app_id)
            .field("github_private_key", &"<redacted>")
            .field("github_installation_id", &self.github_installation_id)
            .field("github_api_url", &self.github_api_url)
            .field("backend_timeout", &self.backend_timeout)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let default_zone = env.optional("DEFAULT_ZONE");
        let routes =
            RoutingTable::from_json(&env.required("RUNNER_CONFIG")?, default_zone.as_deref())?;

        let inactive_secs = env
            .parsed::<u64>("VM_INACTIVE_MINUTES")?
            .unwrap_or(3)
            .checked_mul(60)
            .ok_or_else(|| ConfigError::Invalid {
                var: "VM_INACTIVE_MINUTES",
                reason: "too large".into(),
            })?;
        let policy = OrchestratorPolicy {
            inactivity_delay: Duration::from_secs(inactive_secs),
            retry_delay: Duration::from_secs(
                env.parsed::<u64>("BUSY_RETRY_SECONDS")?.unwrap_or(60),
            ),
            cancel_stop_on_queued: env.flag("CANCEL_STOP_ON_QUEUED")?.unwrap_or(true),
        };
        if policy.retry_delay.is_zero() {
            return Err(ConfigError::Invalid {
                var: "BUSY_RETRY_SECONDS",
                reason: "must be greater than zero".into(),
            });
        }

        let service_url = match env.optional("SERVICE_URL") {
            Some(url) => url,
            None => env
                .optional("CLOUD_RUN_SERVICE_URL")
                .ok_or(ConfigError::Missing("SERVICE_URL"))?,
        };
        if !(service_url.starts_with("https://") || service_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                var: "SERVICE_URL",
                reason: "must be an http(s) URL".into(),
            });
        }

        Ok(Self {
            project_id: env.required("GCP_PROJECT_ID")?,
            default_zone,
            task_location: env.required("CLOUD_TASK_LOCATION")?,
            task_queue: env.required("CLOUD_TASK_QUEUE_NAME")?,
            service_url,
            secret: env.required("RUNNER_MANAGER_SECRET")?,
            routes,
            policy,
            github_app_id: env.required("GITHUB_APP_ID")?,
            github_private_key: env.required("GITHUB_APP_PRIVATE_KEY")?,
            github_installation_id: env
                .parsed("GITHUB_APP_INSTALLATION_ID")?
                .ok_or(ConfigError::Missing("GITHUB_APP_INSTALLATION_ID"))?,
            github_api_url: env.optional("GITHUB_API_URL"),
            backend_timeout: Duration::from_secs(
                env.parsed::<u64>("BACKEND_TIMEOUT_SECS")?.unwrap_or(30).max(1),
            ),
            port: env.parsed("PORT")?.unwrap_or(8080),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn parsed<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        self.optional(var)
            .map(|v| {
                v.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    var,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn flag(&self, var: &'static str) -> Result<Option<bool>, ConfigError> {
        self.optional(var)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ConfigError::Invalid {
                    var,
                    reason: format!("expected a boolean, got '{other}'"),
                }),
            })
            .transpose()
    }
}
