use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::Credentials;

/// Namespace the credential record is kept under.
pub const DEFAULT_NAMESPACE: &str = "storage";

/// Durable persistence for the device's token pair.
pub trait CredentialStore: Send + Sync {
    /// Load the stored pair. Missing records and missing keys read as empty.
    fn load(&self) -> Result<Credentials, AuthError>;
    fn save(&self, credentials: &Credentials) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// File-backed credential store using one TOML file per namespace.
///
/// # Example
/// ```no_run
/// use tether::auth::{Credentials, CredentialStore, FileCredentialStore};
///
/// let store = FileCredentialStore::new(std::path::PathBuf::from("/var/lib/tether"));
/// store.save(&Credentials::new("access", "refresh")?)?;
/// assert!(store.load()?.is_authenticated());
/// # Ok::<(), tether::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    base_dir: PathBuf,
    namespace: String,
}

impl FileCredentialStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn default_dir() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".tether"))
            .unwrap_or_else(|| PathBuf::from(".tether"))
    }

    pub fn path(&self) -> PathBuf {
        self.base_dir
            .join(format!("{}.toml", normalize_label(&self.namespace)))
    }

    fn ensure_parent(path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credentials, AuthError> {
        let raw = match fs::read_to_string(self.path()) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Credentials::empty())
            }
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let record: CredentialRecord = toml::from_str(&raw)?;
        Ok(Credentials::from_stored(
            record.access_token,
            record.refresh_token,
        ))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let path = self.path();
        Self::ensure_parent(&path)?;
        let record = CredentialRecord {
            access_token: credentials.access_token().to_string(),
            refresh_token: credentials.refresh_token().to_string(),
            saved_at: Some(Utc::now()),
        };
        fs::write(&path, toml::to_string(&record)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

/// Volatile store for devices without durable storage, and for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            record: Mutex::new(credentials),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credentials, AuthError> {
        self.record
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| AuthError::Io("credential store lock poisoned".to_string()))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| AuthError::Io("credential store lock poisoned".to_string()))?;
        *guard = credentials.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.save(&Credentials::empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return DEFAULT_NAMESPACE.to_string();
    }
    trimmed
        .chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' {
                lower
            } else {
                '-'
            }
        })
        .collect()
}
