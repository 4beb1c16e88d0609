//! OAuth device-code login sequence.

use std::sync::Arc;

use tokio::sync::watch;

use crate::beacon::{BeaconPayload, Broadcaster};

use super::client::{OAuthClient, TokenGrant};
use super::device_code::{DeviceCodePoll, DeviceCodeSession, LoginState, PollPolicy};
use super::error::AuthError;

/// Drives `Idle -> Requesting -> Announcing -> Polling -> {Authorized, Expired}`.
///
/// The flow never touches the device's live credentials; it hands the
/// granted pair back to its caller. Run it on its own task: polling sleeps
/// between attempts and cannot be preempted before the budget runs out.
pub struct AuthorizationFlow {
    client: Arc<OAuthClient>,
    broadcaster: Arc<dyn Broadcaster>,
    policy: PollPolicy,
    state_tx: watch::Sender<LoginState>,
}

impl AuthorizationFlow {
    pub fn new(client: Arc<OAuthClient>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        let (state_tx, _) = watch::channel(LoginState::Idle);
        Self {
            client,
            broadcaster,
            policy: PollPolicy::default(),
            state_tx,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn state(&self) -> LoginState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LoginState> {
        self.state_tx.subscribe()
    }

    /// Request a device code. Any non-200 answer fails the flow; no retry.
    pub async fn begin_login(&self) -> Result<DeviceCodeSession, AuthError> {
        self.set_state(LoginState::Requesting);
        match self.client.request_device_code().await {
            Ok(session) => {
                tracing::info!(
                    verification_uri = %session.verification_uri_complete,
                    "login using this link"
                );
                Ok(session)
            }
            Err(err) => {
                self.set_state(LoginState::Idle);
                Err(err)
            }
        }
    }

    /// Start broadcasting the tail of the verification URI.
    pub async fn announce(&self, session: &DeviceCodeSession) -> Result<BeaconPayload, AuthError> {
        self.set_state(LoginState::Announcing);
        let payload = BeaconPayload::from_verification_uri(&session.verification_uri_complete)?;
        self.broadcaster.start(&payload).await?;
        Ok(payload)
    }

    /// Poll until the grant succeeds or the attempt budget is exhausted.
    ///
    /// Every non-200 answer keeps polling, whether the server reported
    /// `authorization_pending` or something else. Broadcasting is stopped
    /// once on either terminal outcome.
    pub async fn poll(&self, session: &DeviceCodeSession) -> DeviceCodePoll {
        let delay = self.policy.delay_for(session);
        for attempt in 1..=self.policy.max_attempts {
            self.set_state(LoginState::Polling { attempt });
            if let DeviceCodePoll::Authorized { credentials } = self.poll_once(session, attempt).await
            {
                self.set_state(LoginState::Authorized);
                self.stop_broadcast().await;
                return DeviceCodePoll::Authorized { credentials };
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(delay).await;
            }
        }
        tracing::warn!(
            attempts = self.policy.max_attempts,
            "device code not confirmed within attempt budget"
        );
        self.set_state(LoginState::Expired);
        self.stop_broadcast().await;
        DeviceCodePoll::Expired
    }

    /// One grant attempt, collapsed to `Authorized` or `Pending`.
    pub async fn poll_once(&self, session: &DeviceCodeSession, attempt: u32) -> DeviceCodePoll {
        match self.client.poll_device_token(&session.device_code).await {
            Ok(TokenGrant::Granted(credentials)) => {
                tracing::info!(attempt, "device authorized");
                DeviceCodePoll::Authorized { credentials }
            }
            Ok(TokenGrant::Denied { status, error }) => {
                tracing::debug!(attempt, status, error = ?error, "device code not granted yet");
                DeviceCodePoll::Pending
            }
            Err(err) => {
                tracing::debug!(attempt, error = %err, "device code poll failed");
                DeviceCodePoll::Pending
            }
        }
    }

    /// Full login sequence: request, announce, poll.
    ///
    /// A failing broadcast does not abort the login; the link is still
    /// available in the log.
    pub async fn run(&self) -> Result<DeviceCodePoll, AuthError> {
        let session = self.begin_login().await?;
        if let Err(err) = self.announce(&session).await {
            tracing::warn!(error = %err, "could not start verification broadcast");
        }
        Ok(self.poll(&session).await)
    }

    async fn stop_broadcast(&self) {
        if let Err(err) = self.broadcaster.stop().await {
            tracing::warn!(error = %err, "could not stop verification broadcast");
        }
    }

    fn set_state(&self, state: LoginState) {
        self.state_tx.send_replace(state);
    }
}
