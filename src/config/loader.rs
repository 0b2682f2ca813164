use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AuthError;
use crate::oauth::callback::DEFAULT_CALLBACK_TIMEOUT;
use crate::oauth::endpoints::validate_site;

use super::types::{
    default_scopes, AuthSettings, FileConfig, DEFAULT_CLIENT_NAME, DEFAULT_HTTP_TIMEOUT,
};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Values given on the command line; these win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub site: Option<String>,
    pub callback_timeout_secs: Option<u64>,
}

/// Directory holding `config.json` and stored credentials.
///
/// `SITEAUTH_CONFIG_DIR` if set, else `<config dir>/siteauth`.
pub fn storage_dir() -> PathBuf {
    if let Some(dir) = env_var("SITEAUTH_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("siteauth")
}

/// Read `config.json`; a missing file is an empty config.
pub fn load_file_config(path: &Path) -> Result<FileConfig, AuthError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(e) => {
            return Err(AuthError::Config {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };
    serde_json::from_str(&data).map_err(|e| AuthError::Config {
        path: path.to_path_buf(),
        detail: format!("Invalid JSON: {e}"),
    })
}

/// Resolve settings with precedence flag > environment > config file > default.
pub fn load_settings(overrides: &Overrides) -> Result<AuthSettings, AuthError> {
    let dir = storage_dir();
    let file = load_file_config(&dir.join(CONFIG_FILE_NAME))?;
    resolve(overrides, &env_var, file, dir)
}

/// Pure merge step behind [`load_settings`], with the environment injected.
pub fn resolve(
    overrides: &Overrides,
    env: &dyn Fn(&str) -> Option<String>,
    file: FileConfig,
    storage_dir: PathBuf,
) -> Result<AuthSettings, AuthError> {
    let config_path = storage_dir.join(CONFIG_FILE_NAME);

    let site = overrides
        .site
        .clone()
        .or_else(|| env("SITEAUTH_SITE"))
        .or(file.site)
        .ok_or_else(|| AuthError::Config {
            path: config_path.clone(),
            detail: "no site configured; pass --site or set SITEAUTH_SITE".to_string(),
        })?;
    let site = site.trim().to_ascii_lowercase();
    validate_site(&site).map_err(|detail| AuthError::Config {
        path: config_path.clone(),
        detail,
    })?;

    let env_timeout = match env("SITEAUTH_CALLBACK_TIMEOUT_SECS") {
        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| AuthError::Config {
            path: PathBuf::from("<env>"),
            detail: format!("SITEAUTH_CALLBACK_TIMEOUT_SECS must be a number of seconds, got '{raw}'"),
        })?),
        None => None,
    };
    let callback_timeout = overrides
        .callback_timeout_secs
        .or(env_timeout)
        .or(file.callback_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_CALLBACK_TIMEOUT);
    if callback_timeout.is_zero() {
        return Err(AuthError::Config {
            path: config_path,
            detail: "callback timeout must be at least one second".to_string(),
        });
    }

    let scopes = file
        .scopes
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default_scopes);
    let client_name = file
        .client_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());

    Ok(AuthSettings {
        site,
        scopes,
        client_name,
        callback_timeout,
        http_timeout: DEFAULT_HTTP_TIMEOUT,
        storage_dir,
    })
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}
