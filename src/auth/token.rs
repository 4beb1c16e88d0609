use std::fmt;

use super::error::AuthError;

/// Access/refresh token pair held by the device.
///
/// Both fields are empty (unauthenticated) or both are populated. The only
/// way to build a populated pair is [`Credentials::new`], which enforces that.
///
/// # Example
/// ```
/// use tether::auth::Credentials;
///
/// let creds = Credentials::new("access", "refresh")?;
/// assert!(creds.is_authenticated());
/// assert!(!Credentials::empty().is_authenticated());
/// # Ok::<(), tether::auth::AuthError>(())
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
    refresh_token: String,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "token pair must carry both an access and a refresh token".to_string(),
            ));
        }
        Ok(Self {
            access_token,
            refresh_token,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild a pair from persisted fields. A half-populated record is
    /// treated as no session at all.
    pub fn from_stored(access_token: String, refresh_token: String) -> Self {
        if access_token.is_empty() || refresh_token.is_empty() {
            Self::empty()
        } else {
            Self {
                access_token,
                refresh_token,
            }
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "***"
    }
}
