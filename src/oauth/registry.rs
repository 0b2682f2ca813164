use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::oauth::endpoints::ProviderEndpoints;
use crate::oauth::token::{TokenResponse, TokenSet};

/// Per-site client identity obtained through Dynamic Client Registration.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    /// Absent for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Unix timestamp (seconds).
    pub registered_at: i64,
    pub site: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("client_name", &self.client_name)
            .field("redirect_uris", &self.redirect_uris)
            .field("registered_at", &self.registered_at)
            .field("site", &self.site)
            .finish()
    }
}

/// RFC 7591 registration request body.
#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: [&'a str; 1],
    grant_types: [&'static str; 2],
    response_types: [&'static str; 1],
    #[serde(skip_serializing_if = "String::is_empty")]
    scope: String,
}

#[derive(Deserialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// OAuth error document (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Which call failed, so each maps to its own error variant.
#[derive(Debug, Clone, Copy)]
enum Call {
    Register,
    Exchange,
    Refresh,
}

impl Call {
    fn fail(self, status: Option<u16>, reason: String) -> AuthError {
        match self {
            Call::Register => AuthError::RegistrationFailed { status, reason },
            Call::Exchange => AuthError::TokenExchangeFailed { status, reason },
            Call::Refresh => AuthError::RefreshFailed { status, reason },
        }
    }
}

/// Talks to the provider's registration and token endpoints for one site.
///
/// None of these calls are retried: registration retries risk duplicate
/// clients, and token grants are single-use.
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    site: String,
    client_name: String,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

impl ClientRegistry {
    pub fn new(
        site: &str,
        client_name: &str,
        endpoints: ProviderEndpoints,
        http: reqwest::Client,
    ) -> Self {
        Self {
            site: site.to_string(),
            client_name: client_name.to_string(),
            endpoints,
            http,
        }
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    #[cfg(test)]
    pub(crate) fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub async fn register(
        &self,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<ClientCredentials, AuthError> {
        let body = RegistrationRequest {
            client_name: &self.client_name,
            redirect_uris: [redirect_uri],
            grant_types: ["authorization_code", "refresh_token"],
            response_types: ["code"],
            scope: scopes.join(" "),
        };
        tracing::debug!(site = %self.site, redirect_uri, "registering OAuth client");

        let resp = self
            .http
            .post(&self.endpoints.registration)
            .json(&body)
            .send()
            .await
            .map_err(|e| Call::Register.fail(None, transport_reason(&e)))?;
        let resp = check_status(resp, Call::Register).await?;

        let reg: RegistrationResponse = resp.json().await.map_err(|e| {
            Call::Register.fail(None, format!("invalid registration response: {e}"))
        })?;
        if reg.client_id.is_empty() {
            return Err(Call::Register.fail(None, "response has an empty client_id".into()));
        }

        let redirect_uris = if reg.redirect_uris.is_empty() {
            vec![redirect_uri.to_string()]
        } else {
            reg.redirect_uris
        };
        let creds = ClientCredentials {
            client_id: reg.client_id,
            client_secret: reg.client_secret.filter(|s| !s.is_empty()),
            client_name: reg.client_name.unwrap_or_else(|| self.client_name.clone()),
            redirect_uris,
            registered_at: Utc::now().timestamp(),
            site: self.site.clone(),
        };
        tracing::info!(site = %self.site, client_id = %creds.client_id, "registered OAuth client");
        Ok(creds)
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        creds: &ClientCredentials,
    ) -> Result<TokenSet, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", creds.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = creds.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        self.token_request(&form, &creds.client_id, Call::Exchange).await
    }

    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        creds: &ClientCredentials,
    ) -> Result<TokenSet, AuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", creds.client_id.as_str()),
        ];
        if let Some(secret) = creds.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let mut tokens = self
            .token_request(&form, &creds.client_id, Call::Refresh)
            .await?;
        // Providers that don't rotate refresh tokens omit them on refresh.
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        client_id: &str,
        call: Call,
    ) -> Result<TokenSet, AuthError> {
        let resp = self
            .http
            .post(&self.endpoints.token)
            .form(form)
            .send()
            .await
            .map_err(|e| call.fail(None, transport_reason(&e)))?;
        let resp = check_status(resp, call).await?;

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| call.fail(None, format!("invalid token response: {e}")))?;
        Ok(token_resp.into_token_set(client_id, Utc::now()))
    }
}

/// Pass 2xx responses through; turn anything else into the call's error,
/// quoting only the provider's `error`/`error_description` fields.
async fn check_status(resp: reqwest::Response, call: Call) -> Result<reqwest::Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let reason = match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(err) => match err.error_description.filter(|d| !d.is_empty()) {
            Some(desc) => format!("{}: {desc}", err.error),
            None => err.error,
        },
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    };
    tracing::debug!(status = status.as_u16(), ?call, "provider rejected request");
    Err(call.fail(Some(status.as_u16()), reason))
}

/// Describe a transport failure without echoing the request (and its form body).
fn transport_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "could not connect to the provider".to_string()
    } else {
        "request to the provider failed".to_string()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn registry(server: &MockServer) -> ClientRegistry {
        ClientRegistry::new(
            "example.com",
            "siteauth",
            ProviderEndpoints::with_base(&server.uri()),
            reqwest::Client::new(),
        )
    }

    fn public_creds() -> ClientCredentials {
        ClientCredentials {
            client_id: "abc".into(),
            client_secret: None,
            client_name: "siteauth".into(),
            redirect_uris: vec!["http://127.0.0.1:1/callback".into()],
            registered_at: 0,
            site: "example.com".into(),
        }
    }

    #[tokio::test]
    async fn register_public_client_without_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth2/register"))
            .and(body_partial_json(serde_json::json!({
                "client_name": "siteauth",
                "redirect_uris": ["http://127.0.0.1:5555/callback"],
                "grant_types": ["authorization_code", "refresh_token"],
                "response_types": ["code"],
                "scope": "read write"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "client_id": "abc" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let creds = registry(&server)
            .register(
                "http://127.0.0.1:5555/callback",
                &["read".to_string(), "write".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(creds.client_id, "abc");
        assert!(creds.client_secret.is_none());
        assert_eq!(creds.site, "example.com");
        assert_eq!(creds.redirect_uris, vec!["http://127.0.0.1:5555/callback"]);
    }

    #[tokio::test]
    async fn register_confidential_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth2/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_id": "abc",
                "client_secret": "s3cret",
                "client_name": "custom"
            })))
            .mount(&server)
            .await;

        let creds = registry(&server)
            .register("http://127.0.0.1:5555/callback", &[])
            .await
            .unwrap();
        assert_eq!(creds.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(creds.client_name, "custom");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[tokio::test]
    async fn register_failure_reports_status_and_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth2/register"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_redirect_uri",
                "error_description": "loopback only"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = registry(&server)
            .register("http://127.0.0.1:5555/callback", &[])
            .await
            .unwrap_err();
        match err {
            AuthError::RegistrationFailed { status, reason } => {
                assert_eq!(status, Some(400));
                assert_eq!(reason, "invalid_redirect_uri: loopback only");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn register_non_json_error_uses_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .mount(&server)
            .await;

        let err = registry(&server)
            .register("http://127.0.0.1:5555/callback", &[])
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(503));
        assert!(!err.to_string().contains("<html>"));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[tokio::test]
    async fn exchange_code_sends_pkce_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .and(body_string_contains("client_id=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "r1",
                "scope": "read"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = Utc::now().timestamp();
        let tokens = registry(&server)
            .exchange_code(
                "the-code",
                "http://127.0.0.1:5555/callback",
                "the-verifier",
                &public_creds(),
            )
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "t1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
        assert_eq!(tokens.client_id, "abc");
        assert!(tokens.issued_at >= before);
    }

    #[tokio::test]
    async fn exchange_code_includes_secret_for_confidential_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t1",
                "expires_in": 60
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut creds = public_creds();
        creds.client_secret = Some("s3cret".into());
        registry(&server)
            .exchange_code("c", "http://127.0.0.1:5555/callback", "v", &creds)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exchange_failure_surfaces_provider_fields_not_secrets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .mount(&server)
            .await;

        let mut creds = public_creds();
        creds.client_secret = Some("s3cret".into());
        let err = registry(&server)
            .exchange_code("c", "http://127.0.0.1:5555/callback", "the-verifier", &creds)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, AuthError::TokenExchangeFailed { status: Some(400), .. }));
        assert!(msg.contains("invalid_grant: code expired"));
        assert!(!msg.contains("s3cret"));
        assert!(!msg.contains("the-verifier"));
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t2",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = registry(&server)
            .refresh_token("r1", &public_creds())
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "t2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn refresh_rejected_is_refresh_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = registry(&server)
            .refresh_token("r1", &public_creds())
            .await
            .unwrap_err();
        match err {
            AuthError::RefreshFailed { status, reason } => {
                assert_eq!(status, Some(401));
                assert_eq!(reason, "invalid_grant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_failure() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let uri = format!("http://127.0.0.1:{port}");

        let registry = ClientRegistry::new(
            "example.com",
            "siteauth",
            ProviderEndpoints::with_base(&uri),
            reqwest::Client::new(),
        );
        let err = registry.refresh_token("r1", &public_creds()).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed { status: None, .. }));
        assert!(!err.to_string().contains("r1"));
    }
}
