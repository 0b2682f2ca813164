use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::oauth::token::TokenLifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenStatus {
    #[serde(rename = "no token")]
    NoToken,
    #[serde(rename = "valid")]
    Valid,
    /// Still accepted, but inside the early-refresh window.
    #[serde(rename = "expiring")]
    Expiring,
    #[serde(rename = "expired")]
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::NoToken => "no token",
            TokenStatus::Valid => "valid",
            TokenStatus::Expiring => "expiring",
            TokenStatus::Expired => "expired",
        }
    }
}

/// What `status` reports. Never carries token values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub site: String,
    pub authenticated: bool,
    pub status: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub has_refresh: bool,
    pub refresh_failed: bool,
    pub storage: String,
}

impl StatusReport {
    pub fn from_lifecycle(
        site: &str,
        lifecycle: &TokenLifecycle,
        now: DateTime<Utc>,
        storage: String,
    ) -> Self {
        let Some(token) = lifecycle.token.as_ref() else {
            return Self {
                site: site.to_string(),
                authenticated: false,
                status: TokenStatus::NoToken,
                expires_at: None,
                expires_in_secs: None,
                token_type: None,
                has_refresh: false,
                refresh_failed: false,
                storage,
            };
        };

        let status = if token.is_expired(now) {
            TokenStatus::Expired
        } else if token.is_expiring_soon(now) {
            TokenStatus::Expiring
        } else {
            TokenStatus::Valid
        };
        Self {
            site: site.to_string(),
            authenticated: status != TokenStatus::Expired,
            status,
            expires_at: token.expires_at().map(|t| t.to_rfc3339()),
            expires_in_secs: Some(token.seconds_remaining(now).max(0)),
            token_type: Some(token.token_type.clone()),
            has_refresh: token.has_refresh_token(),
            refresh_failed: lifecycle.refresh_failed,
            storage,
        }
    }
}
