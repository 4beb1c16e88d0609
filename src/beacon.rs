//! Short-range broadcast of the verification code while a login is pending.

use std::fmt;

use async_trait::async_trait;

use crate::auth::AuthError;

/// Number of raw bytes carried as manufacturer data.
pub const BEACON_PAYLOAD_LEN: usize = 11;

/// Tail of the verification URI, broadcast so a companion app can finish
/// the login on the user's behalf.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BeaconPayload([u8; BEACON_PAYLOAD_LEN]);

impl BeaconPayload {
    /// Take the last [`BEACON_PAYLOAD_LEN`] bytes of `uri`.
    ///
    /// ```
    /// use tether::beacon::BeaconPayload;
    ///
    /// let payload = BeaconPayload::from_verification_uri("https://x.example/ABCDEFGHIJK")?;
    /// assert_eq!(payload.as_bytes(), b"ABCDEFGHIJK");
    /// # Ok::<(), tether::auth::AuthError>(())
    /// ```
    pub fn from_verification_uri(uri: &str) -> Result<Self, AuthError> {
        let bytes = uri.as_bytes();
        let start = bytes.len().checked_sub(BEACON_PAYLOAD_LEN).ok_or_else(|| {
            AuthError::InvalidResponse(format!(
                "verification uri shorter than {BEACON_PAYLOAD_LEN} bytes"
            ))
        })?;
        let mut payload = [0u8; BEACON_PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[start..]);
        Ok(Self(payload))
    }

    pub fn as_bytes(&self) -> &[u8; BEACON_PAYLOAD_LEN] {
        &self.0
    }
}

impl fmt::Debug for BeaconPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeaconPayload({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Radio stack seam: starts and stops advertising a payload.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn start(&self, payload: &BeaconPayload) -> Result<(), AuthError>;
    async fn stop(&self) -> Result<(), AuthError>;
}

/// Broadcaster for hosts without a radio: surfaces the payload in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBroadcaster;

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn start(&self, payload: &BeaconPayload) -> Result<(), AuthError> {
        tracing::info!(payload = ?payload, "broadcasting verification code");
        Ok(())
    }

    async fn stop(&self) -> Result<(), AuthError> {
        tracing::info!("verification broadcast stopped");
        Ok(())
    }
}
