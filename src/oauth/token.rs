use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expiring this many seconds before their real expiry.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    /// Unix timestamp (seconds) at which the token was received.
    pub issued_at: i64,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub client_id: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    /// Unix timestamp (seconds) at which the access token stops being accepted.
    pub fn expires_at_ts(&self) -> i64 {
        self.issued_at.saturating_add(self.expires_in)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at_ts(), 0)
    }

    /// True once `now` is inside the five-minute window before expiry.
    pub fn is_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() + EXPIRY_BUFFER_SECS >= self.expires_at_ts()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at_ts()
    }

    /// Seconds until real expiry; negative once expired.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at_ts() - now.timestamp()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .field("scope", &self.scope)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Raw token response from the provider's token endpoint.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token_set(self, client_id: &str, issued_at: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            token_type: self.token_type.unwrap_or_else(default_token_type),
            expires_in: self.expires_in.unwrap_or(0),
            issued_at: issued_at.timestamp(),
            scope: self.scope.unwrap_or_default(),
            client_id: client_id.to_string(),
        }
    }
}

/// A site's current token together with what the orchestrator knows about it.
#[derive(Debug, Clone, Default)]
pub struct TokenLifecycle {
    pub token: Option<TokenSet>,
    pub refresh_failed: bool,
}

impl TokenLifecycle {
    pub fn new(token: Option<TokenSet>) -> Self {
        Self {
            token,
            refresh_failed: false,
        }
    }

    pub fn is_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        self.token.as_ref().is_none_or(|t| t.is_expiring_soon(now))
    }

    /// Advisory: no token at all, or the refresh for this token already failed.
    pub fn should_reauthenticate(&self) -> bool {
        self.token.is_none() || self.refresh_failed
    }

    pub fn mark_refresh_failed(&mut self) {
        self.refresh_failed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_700_000_000;

    fn token(issued_at: i64, expires_in: i64) -> TokenSet {
        TokenSet {
            access_token: "access123".into(),
            refresh_token: Some("refresh456".into()),
            token_type: "Bearer".into(),
            expires_in,
            issued_at,
            scope: "read write".into(),
            client_id: "abc".into(),
        }
    }

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[test]
    fn expiring_soon_boundary() {
        let tok = token(T, 3600);
        let boundary = T + 3600 - EXPIRY_BUFFER_SECS;
        assert!(!tok.is_expiring_soon(at(boundary - 1)));
        assert!(tok.is_expiring_soon(at(boundary)));
        assert!(tok.is_expiring_soon(at(boundary + 1)));
    }

    #[test]
    fn fresh_token_not_expiring_until_t_plus_3300() {
        let tok = token(T, 3600);
        assert!(!tok.is_expiring_soon(at(T)));
        assert!(tok.is_expiring_soon(at(T + 3300)));
    }

    #[test]
    fn expired_is_distinct_from_expiring() {
        let tok = token(T, 3600);
        assert!(tok.is_expiring_soon(at(T + 3500)));
        assert!(!tok.is_expired(at(T + 3500)));
        assert!(tok.is_expired(at(T + 3600)));
        assert_eq!(tok.seconds_remaining(at(T + 3500)), 100);
    }

    #[test]
    fn expires_at_matches_issued_plus_lifetime() {
        let tok = token(T, 3600);
        assert_eq!(tok.expires_at().unwrap().timestamp(), T + 3600);
    }

    #[test]
    fn token_set_serialization_roundtrip() {
        let tok = token(T, 3600);
        let json = serde_json::to_string(&tok).unwrap();
        let deserialized: TokenSet = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, tok);
    }

    #[test]
    fn token_set_defaults_for_missing_fields() {
        let json = r#"{"access_token":"a","expires_in":60,"issued_at":1}"#;
        let tok: TokenSet = serde_json::from_str(json).unwrap();
        assert_eq!(tok.token_type, "Bearer");
        assert!(tok.refresh_token.is_none());
        assert!(!tok.has_refresh_token());
        assert!(tok.scope.is_empty());
    }

    #[test]
    fn token_response_conversion() {
        let raw = r#"{"access_token":"t1","token_type":"bearer","expires_in":3600,"refresh_token":"r1","scope":"read"}"#;
        let resp: TokenResponse = serde_json::from_str(raw).unwrap();
        let tok = resp.into_token_set("abc", at(T));
        assert_eq!(tok.access_token, "t1");
        assert_eq!(tok.refresh_token.as_deref(), Some("r1"));
        assert_eq!(tok.issued_at, T);
        assert_eq!(tok.expires_in, 3600);
        assert_eq!(tok.client_id, "abc");
    }

    #[test]
    fn token_response_minimal() {
        let resp: TokenResponse = serde_json::from_str(r#"{"access_token":"t1"}"#).unwrap();
        let tok = resp.into_token_set("abc", at(T));
        assert_eq!(tok.token_type, "Bearer");
        assert!(tok.refresh_token.is_none());
        assert_eq!(tok.expires_in, 0);
    }

    #[test]
    fn debug_redacts_secrets() {
        let debug = format!("{:?}", token(T, 3600));
        assert!(!debug.contains("access123"));
        assert!(!debug.contains("refresh456"));
        assert!(debug.contains("client_id"));
    }

    #[test]
    fn lifecycle_without_token_needs_reauth() {
        let lifecycle = TokenLifecycle::new(None);
        assert!(lifecycle.should_reauthenticate());
        assert!(lifecycle.is_expiring_soon(at(T)));
    }

    #[test]
    fn lifecycle_reauth_after_failed_refresh() {
        let mut lifecycle = TokenLifecycle::new(Some(token(T, 3600)));
        assert!(!lifecycle.should_reauthenticate());
        lifecycle.mark_refresh_failed();
        assert!(lifecycle.should_reauthenticate());
    }
}
