//! urlencoded exchanges with the OAuth authorization server.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::DeviceConfig;

use super::device_code::DeviceCodeSession;
use super::error::AuthError;
use super::token::Credentials;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const REFRESH_GRANT: &str = "refresh_token";

/// Client identity and endpoints for the authorization server.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub scope: String,
    pub device_code_url: String,
    pub token_url: String,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .field("device_code_url", &self.device_code_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl From<&DeviceConfig> for OAuthSettings {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            audience: config.audience.clone(),
            scope: config.scope.clone(),
            device_code_url: config.auth_code_url.clone(),
            token_url: config.auth_token_url.clone(),
        }
    }
}

/// Result of a token-grant POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    Granted(Credentials),
    /// Non-200 answer. `error` carries the OAuth error code when the body had one.
    Denied { status: u16, error: Option<String> },
}

/// HTTP client for the device-code and refresh grants.
///
/// Each call builds its own form body and owns its response buffer.
pub struct OAuthClient {
    http: reqwest::Client,
    settings: OAuthSettings,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Ask for a device code and the verification URI to surface to the user.
    pub async fn request_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        tracing::debug!(url = %self.settings.device_code_url, "requesting device code");
        let resp = self
            .http
            .post(&self.settings.device_code_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("audience", self.settings.audience.as_str()),
                ("scope", self.settings.scope.as_str()),
            ])
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(AuthError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        let payload: DeviceCodeResponse = resp.json().await?;
        Ok(DeviceCodeSession {
            device_code: payload.device_code,
            verification_uri_complete: payload.verification_uri_complete,
            interval_secs: payload.interval,
        })
    }

    /// One device-code token-grant attempt.
    pub async fn poll_device_token(&self, device_code: &str) -> Result<TokenGrant, AuthError> {
        let resp = self
            .http
            .post(&self.settings.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_CODE_GRANT),
            ])
            .send()
            .await?;
        read_grant(resp, None).await
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let resp = self
            .http
            .post(&self.settings.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("grant_type", REFRESH_GRANT),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        read_grant(resp, Some(refresh_token)).await
    }
}

async fn read_grant(
    resp: reqwest::Response,
    current_refresh: Option<&str>,
) -> Result<TokenGrant, AuthError> {
    let status = resp.status();
    if status != StatusCode::OK {
        let error = resp
            .json::<GrantErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.error);
        return Ok(TokenGrant::Denied {
            status: status.as_u16(),
            error,
        });
    }
    let payload: TokenResponse = resp.json().await?;
    let access_token = payload
        .id_token
        .or(payload.access_token)
        .ok_or_else(|| AuthError::InvalidResponse("token response missing id_token".into()))?;
    // Refresh responses may omit the refresh token when rotation is off.
    let refresh_token = payload
        .refresh_token
        .or_else(|| current_refresh.map(str::to_string))
        .ok_or_else(|| {
            AuthError::InvalidResponse("token response missing refresh_token".into())
        })?;
    Ok(TokenGrant::Granted(Credentials::new(
        access_token,
        refresh_token,
    )?))
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    verification_uri_complete: String,
    #[serde(default)]
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GrantErrorResponse {
    error: Option<String>,
}
