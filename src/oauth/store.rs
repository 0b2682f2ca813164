use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AuthError;
use crate::oauth::registry::ClientCredentials;
use crate::oauth::token::TokenSet;

/// Persistence for per-site client identity and tokens.
///
/// Each call is expected to be atomic within a single process. Loading
/// something that was never saved yields `Ok(None)`; deleting it succeeds.
pub trait CredentialStore: Send + Sync {
    fn load_client_credentials(&self, site: &str) -> Result<Option<ClientCredentials>, AuthError>;
    fn save_client_credentials(&self, site: &str, creds: &ClientCredentials) -> Result<(), AuthError>;
    fn delete_client_credentials(&self, site: &str) -> Result<(), AuthError>;

    fn load_tokens(&self, site: &str) -> Result<Option<TokenSet>, AuthError>;
    fn save_tokens(&self, site: &str, tokens: &TokenSet) -> Result<(), AuthError>;
    fn delete_tokens(&self, site: &str) -> Result<(), AuthError>;

    /// Human-readable description of where credentials live.
    fn location(&self) -> String;
}

/// JSON files under a config directory, one per site and kind, owner-only.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn client_path(&self, site: &str) -> PathBuf {
        self.base_dir.join(format!("client_{}.json", file_key(site)))
    }

    pub fn tokens_path(&self, site: &str) -> PathBuf {
        self.base_dir.join(format!("tokens_{}.json", file_key(site)))
    }

    fn ensure_dir(&self) -> Result<(), AuthError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| {
            storage_error(&format!("cannot create {}", self.base_dir.display()), e)
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.base_dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| {
                    storage_error(&format!("cannot restrict {}", self.base_dir.display()), e)
                })?;
        }
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, AuthError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(&format!("cannot read {}", path.display()), e)),
        };
        serde_json::from_str(&data).map(Some).map_err(|e| {
            AuthError::Storage(format!("corrupt credential file {}: {e}", path.display()))
        })
    }

    /// Write through a sibling temp file, created 0600, then rename into place.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), AuthError> {
        self.ensure_dir()?;
        let data = serde_json::to_string_pretty(value)
            .map_err(|e| AuthError::Storage(format!("cannot serialize credentials: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let write = || -> std::io::Result<()> {
            let mut file = options.open(&tmp)?;
            file.write_all(data.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            storage_error(&format!("cannot write {}", path.display()), e)
        })
    }

    fn remove(&self, path: &Path) -> Result<(), AuthError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&format!("cannot delete {}", path.display()), e)),
        }
    }
}

impl CredentialStore for FileStore {
    fn load_client_credentials(&self, site: &str) -> Result<Option<ClientCredentials>, AuthError> {
        self.read_json(&self.client_path(site))
    }

    fn save_client_credentials(&self, site: &str, creds: &ClientCredentials) -> Result<(), AuthError> {
        self.write_json(&self.client_path(site), creds)
    }

    fn delete_client_credentials(&self, site: &str) -> Result<(), AuthError> {
        self.remove(&self.client_path(site))
    }

    fn load_tokens(&self, site: &str) -> Result<Option<TokenSet>, AuthError> {
        self.read_json(&self.tokens_path(site))
    }

    fn save_tokens(&self, site: &str, tokens: &TokenSet) -> Result<(), AuthError> {
        self.write_json(&self.tokens_path(site), tokens)
    }

    fn delete_tokens(&self, site: &str) -> Result<(), AuthError> {
        self.remove(&self.tokens_path(site))
    }

    fn location(&self) -> String {
        self.base_dir.display().to_string()
    }
}

/// In-process store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: Mutex<HashMap<String, ClientCredentials>>,
    tokens: Mutex<HashMap<String, TokenSet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> AuthError {
    AuthError::Storage("in-memory store lock poisoned".to_string())
}

impl CredentialStore for MemoryStore {
    fn load_client_credentials(&self, site: &str) -> Result<Option<ClientCredentials>, AuthError> {
        Ok(self.clients.lock().map_err(poisoned)?.get(site).cloned())
    }

    fn save_client_credentials(&self, site: &str, creds: &ClientCredentials) -> Result<(), AuthError> {
        self.clients
            .lock()
            .map_err(poisoned)?
            .insert(site.to_string(), creds.clone());
        Ok(())
    }

    fn delete_client_credentials(&self, site: &str) -> Result<(), AuthError> {
        self.clients.lock().map_err(poisoned)?.remove(site);
        Ok(())
    }

    fn load_tokens(&self, site: &str) -> Result<Option<TokenSet>, AuthError> {
        Ok(self.tokens.lock().map_err(poisoned)?.get(site).cloned())
    }

    fn save_tokens(&self, site: &str, tokens: &TokenSet) -> Result<(), AuthError> {
        self.tokens
            .lock()
            .map_err(poisoned)?
            .insert(site.to_string(), tokens.clone());
        Ok(())
    }

    fn delete_tokens(&self, site: &str) -> Result<(), AuthError> {
        self.tokens.lock().map_err(poisoned)?.remove(site);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

fn storage_error(context: &str, err: std::io::Error) -> AuthError {
    AuthError::Storage(format!("{context}: {err}"))
}

/// File-name key for a site. Host characters pass through; any other byte,
/// `_` included, becomes `_xx`, so distinct sites never share a file.
fn file_key(site: &str) -> String {
    let mut key = String::with_capacity(site.len());
    for b in site.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' => key.push(b as char),
            _ => key.push_str(&format!("_{b:02x}")),
        }
    }
    key
}
