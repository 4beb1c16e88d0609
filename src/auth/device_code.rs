use std::time::Duration;

use super::token::Credentials;

/// Device-code session returned by the authorization server.
///
/// # Example
/// ```
/// use tether::auth::DeviceCodeSession;
///
/// let session = DeviceCodeSession {
///     device_code: "Ag_EE...ko1p".to_string(),
///     verification_uri_complete: "https://example.auth0.com/activate?user_code=QTZL-MCBW".to_string(),
///     interval_secs: 5,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeSession {
    pub device_code: String,
    pub verification_uri_complete: String,
    pub interval_secs: u64,
}

/// Terminal outcome of a device-code polling sequence, or of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCodePoll {
    /// User completed consent; the pair is ready to install.
    Authorized { credentials: Credentials },
    /// Server has not granted the token (yet).
    Pending,
    /// Attempt budget exhausted without a grant.
    Expired,
}

/// Progress of the device-code login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Requesting,
    Announcing,
    Polling { attempt: u32 },
    Authorized,
    Expired,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Authorized | Self::Expired)
    }
}

/// Attempt budget and pacing for device-code polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of token-grant attempts before giving up.
    pub max_attempts: u32,
    /// Minimum delay between attempts.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            interval: Duration::from_secs(10),
        }
    }
}

impl PollPolicy {
    /// Delay before the next attempt. The server's requested interval wins
    /// when it is longer than the configured one.
    pub fn delay_for(&self, session: &DeviceCodeSession) -> Duration {
        self.interval
            .max(Duration::from_secs(session.interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(interval_secs: u64) -> DeviceCodeSession {
        DeviceCodeSession {
            device_code: "abc".into(),
            verification_uri_complete: "https://x.example/ABCDEFGHIJK".into(),
            interval_secs,
        }
    }

    #[test]
    fn delay_never_undercuts_server_interval() {
        let policy = PollPolicy {
            max_attempts: 3,
            interval: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for(&session(5)), Duration::from_secs(5));
        assert_eq!(policy.delay_for(&session(1)), Duration::from_secs(2));
    }

    #[test]
    fn only_authorized_and_expired_are_terminal() {
        assert!(LoginState::Authorized.is_terminal());
        assert!(LoginState::Expired.is_terminal());
        assert!(!LoginState::Polling { attempt: 4 }.is_terminal());
        assert!(!LoginState::Idle.is_terminal());
    }
}
