//! GitHub App authentication: app JWT, then a cached installation token.
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use idler_core::BackendError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::Mutex;
use tracing::debug;

use crate::GithubError;

const BACKEND: &str = "github";

/// Back-dating of `iat`, covering clock drift against GitHub.
const IAT_SKEW: Duration = Duration::from_secs(60);
/// App JWT lifetime; GitHub caps it at ten minutes.
const JWT_TTL: Duration = Duration::from_secs(9 * 60);
/// A cached installation token is replaced once it is this close to expiry.
const REFRESH_MARGIN: time::Duration = time::Duration::minutes(5);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: u64,
    exp: u64,
    iss: String,
}

/// GitHub App identity and the installation it acts for.
#[derive(Clone)]
pub struct AppCredentials {
    app_id: String,
    installation_id: u64,
    key: EncodingKey,
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl AppCredentials {
    /// Build credentials from a PEM encoded RSA key.
    ///
    /// Literal `\n` sequences are turned into newlines, as keys are often passed through a
    /// single-line environment variable.
    pub fn from_pem(
        app_id: impl Into<String>,
        installation_id: u64,
        private_key_pem: &str,
    ) -> Result<Self, GithubError> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(GithubError::Config("app id cannot be empty".into()));
        }
        let pem = private_key_pem.replace("\\n", "\n");
        let key = EncodingKey::from_rsa_pem(pem.trim().as_bytes())?;
        Ok(Self {
            app_id,
            installation_id,
            key,
        })
    }

    /// App JWT valid from `now - 60s` to `now + 9m`.
    pub(crate) fn jwt(&self, now: SystemTime) -> Result<String, BackendError> {
        let now = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let claims = Claims {
            iat: now.saturating_sub(IAT_SKEW.as_secs()),
            exp: now + JWT_TTL.as_secs(),
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(|e| {
            BackendError::Auth {
                backend: BACKEND,
                message: format!("sign app jwt: {e}"),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: OffsetDateTime,
}

impl CachedToken {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// Installation token source with an in-memory cache.
pub struct InstallationAuth {
    credentials: AppCredentials,
    api_url: String,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for InstallationAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationAuth")
            .field("credentials", &self.credentials)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl InstallationAuth {
    pub fn new(credentials: AppCredentials, api_url: String, client: reqwest::Client) -> Self {
        Self {
            credentials,
            api_url,
            client,
            cached: Mutex::new(None),
        }
    }

    /// A valid installation token, minted when the cached one is missing or about to expire.
    pub async fn token(&self) -> Result<String, BackendError> {
        let mut cached = self.cached.lock().await;
        if let Some(t) = cached.as_ref()
            && t.is_fresh(OffsetDateTime::now_utc())
        {
            return Ok(t.token.clone());
        }

        let fresh = self.mint().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token, e.g. after GitHub rejected it.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn mint(&self) -> Result<CachedToken, BackendError> {
        let jwt = self.credentials.jwt(SystemTime::now())?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, self.credentials.installation_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&jwt)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                backend: BACKEND,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Auth {
                backend: BACKEND,
                message: format!("installation token request returned {status}: {body}"),
            });
        }

        let body: AccessTokenResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    backend: BACKEND,
                    message: e.to_string(),
                })?;
        let cached = parse_token(body)?;
        debug!(expires_at = %cached.expires_at, "installation token minted");
        Ok(cached)
    }
}

fn parse_token(body: AccessTokenResponse) -> Result<CachedToken, BackendError> {
    let expires_at =
        OffsetDateTime::parse(&body.expires_at, &Rfc3339).map_err(|e| {
            BackendError::InvalidResponse {
                backend: BACKEND,
                message: format!("expires_at '{}': {e}", body.expires_at),
            }
        })?;
    Ok(CachedToken {
        token: body.token,
        expires_at,
    })
}
