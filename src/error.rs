use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Client registration failed{}: {reason}", format_status(*.status))]
    RegistrationFailed { status: Option<u16>, reason: String },

    #[error("Token exchange failed{}: {reason}", format_status(*.status))]
    TokenExchangeFailed { status: Option<u16>, reason: String },

    #[error("Token refresh failed{}: {reason}. Run: siteauth login", format_status(*.status))]
    RefreshFailed { status: Option<u16>, reason: String },

    #[error("Timed out waiting for the authorization callback after {}s", .0.as_secs())]
    CallbackTimeout(Duration),

    #[error("OAuth state mismatch on callback (possible CSRF attack). Run: siteauth login to start over")]
    CsrfMismatch,

    #[error("{}", format_provider_error(.error, .description.as_deref()))]
    ProviderError {
        error: String,
        description: Option<String>,
    },

    #[error("Cannot bind the local callback listener: {0}")]
    ListenerBindFailed(#[source] std::io::Error),

    #[error("Callback listener closed before a redirect arrived")]
    ListenerClosed,

    #[error("Site '{site}' requires authentication: {reason}. Run: siteauth login")]
    AuthRequired { site: String, reason: String },

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Error in config {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_status(status: Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

fn format_provider_error(error: &str, description: Option<&str>) -> String {
    match description {
        Some(desc) if !desc.is_empty() => format!("Provider returned error '{error}': {desc}"),
        _ => format!("Provider returned error '{error}'"),
    }
}

impl AuthError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::RegistrationFailed { .. } => "registration_failed",
            AuthError::TokenExchangeFailed { .. } => "token_exchange_failed",
            AuthError::RefreshFailed { .. } => "refresh_failed",
            AuthError::CallbackTimeout(_) => "callback_timeout",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::ProviderError { .. } => "provider_error",
            AuthError::ListenerBindFailed(_) => "listener_bind_failed",
            AuthError::ListenerClosed => "listener_closed",
            AuthError::AuthRequired { .. } => "auth_required",
            AuthError::Storage(_) => "storage_error",
            AuthError::Config { .. } => "config_error",
            AuthError::Io(_) => "io_error",
        }
    }

    pub fn site(&self) -> Option<&str> {
        match self {
            AuthError::AuthRequired { site, .. } => Some(site),
            _ => None,
        }
    }

    /// HTTP status reported by the provider, if the failure came from one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AuthError::RegistrationFailed { status, .. }
            | AuthError::TokenExchangeFailed { status, .. }
            | AuthError::RefreshFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Produce a structured JSON error object naming the action that failed.
    pub fn to_json(&self, action: &str) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("action".into(), serde_json::Value::String(action.to_string()));
        if let Some(site) = self.site() {
            obj.insert("site".into(), serde_json::Value::String(site.to_string()));
        }
        if let Some(status) = self.http_status() {
            obj.insert("status".into(), serde_json::Value::from(status));
        }
        obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        obj.insert("code".into(), serde_json::Value::String(self.code().to_string()));
        serde_json::json!({ "error": obj })
    }
}
