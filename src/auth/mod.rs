//! Device authorization: device-code login, token refresh, credential storage.

pub mod client;
pub mod device_code;
pub mod error;
pub mod flow;
pub mod manager;
pub mod store;
pub mod token;

pub use client::{OAuthClient, OAuthSettings, TokenGrant};
pub use device_code::{DeviceCodePoll, DeviceCodeSession, LoginState, PollPolicy};
pub use error::AuthError;
pub use flow::AuthorizationFlow;
pub use manager::{RefreshOutcome, TokenManager};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::Credentials;
