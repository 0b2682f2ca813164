use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CLIENT_NAME: &str = "siteauth";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Contents of `config.json`; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub callback_timeout_secs: Option<u64>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub site: String,
    pub scopes: Vec<String>,
    pub client_name: String,
    pub callback_timeout: Duration,
    pub http_timeout: Duration,
    pub storage_dir: PathBuf,
}

/// Scopes requested when the config file doesn't name any.
pub fn default_scopes() -> Vec<String> {
    [
        "dashboards_read",
        "dashboards_write",
        "monitors_read",
        "monitors_write",
        "monitors_downtime",
        "apm_read",
        "slos_read",
        "slos_write",
        "incident_read",
        "incident_write",
        "synthetics_read",
        "synthetics_write",
        "hosts_read",
        "user_access_read",
        "user_self_profile_read",
        "cases_read",
        "cases_write",
        "events_read",
        "logs_read_data",
        "metrics_read",
        "timeseries_query",
        "usage_read",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
