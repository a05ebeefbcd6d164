//! Identity: device-code credential against the Microsoft identity platform.
//!
//! `TokenCredential` is the seam the Graph client and the session consume.
//! `DeviceCodeCredential` runs the OAuth 2.0 device authorization grant,
//! hands the user-facing message to a prompt callback, polls the token
//! endpoint and keeps the resulting grant in memory (refreshing it with the
//! refresh token when it is close to expiry).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::GraphError;
use crate::settings::Settings;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const OFFLINE_ACCESS: &str = "offline_access";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP_SECS: u64 = 5;

const EXPIRY_SKEW_MINUTES: i64 = 5;

/// Tokens this close to expiry are renewed instead of served from cache.
fn expiry_skew() -> TimeDelta {
    TimeDelta::minutes(EXPIRY_SKEW_MINUTES)
}

/// Callback invoked when the identity provider issues a device code.
pub type DeviceCodePrompt = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub verification_uri: String,
    /// Provider-supplied instructions (code + URL) meant for display as-is.
    pub message: String,
    pub expires_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn expires_within(&self, skew: TimeDelta) -> bool {
        Utc::now() + skew >= self.expires_on
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, GraphError>;
}

/* ---- Wire shapes ---- */

#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: i64,
    interval: Option<u64>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn unknown() -> Self {
        TokenErrorResponse {
            error: "unknown_error".into(),
            error_description: None,
        }
    }

    fn describe(&self) -> String {
        match self.error_description.as_deref() {
            // AAD descriptions carry trace ids on following lines.
            Some(desc) if !desc.is_empty() => {
                let first = desc.lines().next().unwrap_or(desc);
                format!("{}: {}", self.error, first)
            }
            _ => self.error.clone(),
        }
    }
}

/* ---- Credential ---- */

struct CachedGrant {
    scope: String,
    access: AccessToken,
    refresh_token: Option<String>,
}

pub struct DeviceCodeCredential {
    http: reqwest::Client,
    client_id: String,
    device_code_url: Url,
    token_url: Url,
    prompt: DeviceCodePrompt,
    slow_down_step: Duration,
    cache: Mutex<Option<CachedGrant>>,
}

impl DeviceCodeCredential {
    pub fn new(settings: &Settings, prompt: DeviceCodePrompt) -> Result<Self, GraphError> {
        let authority = settings
            .authority_url()
            .map_err(|e| GraphError::InvalidConfiguration(format!("authority host: {e}")))?;
        let endpoint = |leaf: &str| {
            authority
                .join(&format!("{}/oauth2/v2.0/{leaf}", settings.tenant_id))
                .map_err(|e| GraphError::InvalidConfiguration(format!("tenant endpoint: {e}")))
        };
        let http = reqwest::Client::builder()
            .user_agent(concat!("graph-console/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GraphError::InvalidConfiguration(format!("http client: {e}")))?;

        Ok(DeviceCodeCredential {
            http,
            client_id: settings.client_id.clone(),
            device_code_url: endpoint("devicecode")?,
            token_url: endpoint("token")?,
            prompt,
            slow_down_step: Duration::from_secs(SLOW_DOWN_STEP_SECS),
            cache: Mutex::new(None),
        })
    }

    /// Extra wait added to the poll interval on each `slow_down`.
    #[cfg(test)]
    pub fn with_slow_down_step(mut self, step: Duration) -> Self {
        self.slow_down_step = step;
        self
    }

    async fn device_code_flow(&self, scope: &str) -> Result<CachedGrant, GraphError> {
        let response = self
            .http
            .post(self.device_code_url.clone())
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope)])
            .send()
            .await
            .map_err(|e| auth_failed("device code request failed", e))?;

        if !response.status().is_success() {
            let err = response
                .json::<TokenErrorResponse>()
                .await
                .unwrap_or_else(|_| TokenErrorResponse::unknown());
            return Err(GraphError::AuthenticationFailed(err.describe()));
        }

        let dev: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| auth_failed("failed to parse device code response", e))?;

        let expires_on = Utc::now() + TimeDelta::seconds(dev.expires_in);
        let message = dev.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                dev.verification_uri, dev.user_code
            )
        });
        info!(expires_in = dev.expires_in, "device code issued");
        (self.prompt)(&DeviceCodeInfo {
            user_code: dev.user_code.clone(),
            verification_uri: dev.verification_uri.clone(),
            message,
            expires_on,
        });

        let mut interval =
            Duration::from_secs(dev.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS));
        loop {
            if Utc::now() >= expires_on {
                return Err(GraphError::AuthenticationFailed(
                    "device code expired before sign-in completed".into(),
                ));
            }
            tokio::time::sleep(interval).await;

            let response = self
                .http
                .post(self.token_url.clone())
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.client_id.as_str()),
                    ("device_code", dev.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(|e| auth_failed("token poll failed", e))?;

            if response.status().is_success() {
                let ok: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| auth_failed("failed to parse token response", e))?;
                info!("device code sign-in completed");
                return Ok(grant_from(scope, ok));
            }

            let err = response
                .json::<TokenErrorResponse>()
                .await
                .unwrap_or_else(|_| TokenErrorResponse::unknown());
            match err.error.as_str() {
                "authorization_pending" => {
                    debug!("authorization pending");
                }
                "slow_down" => {
                    interval += self.slow_down_step;
                    debug!(interval_ms = interval.as_millis() as u64, "slowing down token polling");
                }
                _ => return Err(GraphError::AuthenticationFailed(err.describe())),
            }
        }
    }

    async fn refresh(&self, scope: &str, refresh_token: &str) -> Result<CachedGrant, GraphError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| auth_failed("refresh token request failed", e))?;

        if !response.status().is_success() {
            let err = response
                .json::<TokenErrorResponse>()
                .await
                .unwrap_or_else(|_| TokenErrorResponse::unknown());
            return Err(GraphError::AuthenticationFailed(err.describe()));
        }

        let ok: TokenResponse = response
            .json()
            .await
            .map_err(|e| auth_failed("failed to parse refresh response", e))?;
        let mut grant = grant_from(scope, ok);
        // The platform may omit a rotated refresh token; keep using the old one.
        if grant.refresh_token.is_none() {
            grant.refresh_token = Some(refresh_token.to_string());
        }
        Ok(grant)
    }
}

#[async_trait]
impl TokenCredential for DeviceCodeCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, GraphError> {
        let scope = scope_string(scopes);
        let mut cache = self.cache.lock().await;

        if let Some(grant) = cache.as_ref()
            && grant.scope == scope
            && !grant.access.expires_within(expiry_skew())
        {
            debug!("token cache hit");
            return Ok(grant.access.clone());
        }

        if let Some(refresh_token) = cache.as_ref().and_then(|g| g.refresh_token.clone()) {
            match self.refresh(&scope, &refresh_token).await {
                Ok(grant) => {
                    debug!("access token refreshed");
                    let access = grant.access.clone();
                    *cache = Some(grant);
                    return Ok(access);
                }
                Err(e) => warn!(error = %e, "token refresh failed; starting device code flow"),
            }
        }

        let grant = self.device_code_flow(&scope).await?;
        let access = grant.access.clone();
        *cache = Some(grant);
        Ok(access)
    }
}

/* ---- Helpers ---- */

/// Space-separated scope list; `offline_access` is appended so a refresh token is issued.
fn scope_string(scopes: &[String]) -> String {
    let mut parts: Vec<&str> = scopes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !parts.iter().any(|s| s.eq_ignore_ascii_case(OFFLINE_ACCESS)) {
        parts.push(OFFLINE_ACCESS);
    }
    parts.join(" ")
}

fn grant_from(scope: &str, ok: TokenResponse) -> CachedGrant {
    CachedGrant {
        scope: scope.to_string(),
        access: AccessToken {
            token: ok.access_token,
            expires_on: Utc::now() + TimeDelta::seconds(ok.expires_in),
        },
        refresh_token: ok.refresh_token,
    }
}

fn auth_failed(context: &str, err: reqwest::Error) -> GraphError {
    GraphError::AuthenticationFailed(format!("{context}: {err}"))
}
