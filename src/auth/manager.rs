use std::sync::Arc;

use super::client::{OAuthClient, TokenGrant};
use super::store::CredentialStore;
use super::token::Credentials;

/// What the caller must do after a session check or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new pair is installed and persisted.
    Refreshed,
    /// No usable refresh token, or the server refused it: run a fresh login.
    NeedsLogin,
}

/// Owner of the live token pair.
///
/// Only the orchestrator holds a `TokenManager`, so refreshes and installs
/// are serialized by construction.
pub struct TokenManager {
    credentials: Credentials,
    store: Arc<dyn CredentialStore>,
    client: Arc<OAuthClient>,
}

impl TokenManager {
    /// Load the stored pair once. An unreadable store starts unauthenticated.
    pub fn load(store: Arc<dyn CredentialStore>, client: Arc<OAuthClient>) -> Self {
        let credentials = match store.load() {
            Ok(credentials) => credentials,
            Err(err) => {
                tracing::warn!(error = %err, "credential store unavailable, starting without a session");
                Credentials::empty()
            }
        };
        Self {
            credentials,
            store,
            client,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn client(&self) -> &Arc<OAuthClient> {
        &self.client
    }

    /// Device start: login without a stored session, refresh otherwise.
    pub async fn ensure_session(&mut self) -> RefreshOutcome {
        if !self.credentials.is_authenticated() {
            tracing::info!("no stored session, login required");
            return RefreshOutcome::NeedsLogin;
        }
        self.refresh().await
    }

    /// Refresh-grant exchange. Never retries: any failure degrades to login.
    pub async fn refresh(&mut self) -> RefreshOutcome {
        let refresh_token = self.credentials.refresh_token().to_string();
        if refresh_token.is_empty() {
            tracing::info!("no refresh token, login required");
            return RefreshOutcome::NeedsLogin;
        }
        match self.client.refresh_grant(&refresh_token).await {
            Ok(TokenGrant::Granted(credentials)) => {
                self.install(credentials);
                tracing::info!("token refreshed");
                RefreshOutcome::Refreshed
            }
            Ok(TokenGrant::Denied { status, error }) => {
                tracing::warn!(status, error = ?error, "refresh rejected, falling back to login");
                RefreshOutcome::NeedsLogin
            }
            Err(err) => {
                tracing::warn!(error = %err, "refresh failed, falling back to login");
                RefreshOutcome::NeedsLogin
            }
        }
    }

    /// Replace the in-memory pair and persist it. Persistence failures are
    /// logged; the new pair stays live either way.
    pub fn install(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        if let Err(err) = self.store.save(&self.credentials) {
            tracing::warn!(error = %err, "could not persist credentials");
        }
    }
}
