use crate::oauth::pkce::PkceChallenge;

const AUTHORIZE_PATH: &str = "/oauth2/v1/authorize";
const TOKEN_PATH: &str = "/oauth2/v1/token";
const REGISTER_PATH: &str = "/api/v2/oauth2/register";

/// Provider endpoints for one site.
///
/// Only [`ProviderEndpoints::for_site`] is public, so registration and token
/// calls always go over HTTPS to hosts derived from the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization: String,
    pub token: String,
    pub registration: String,
}

impl ProviderEndpoints {
    pub fn for_site(site: &str) -> Self {
        let app = format!("https://app.{site}");
        let api = format!("https://api.{site}");
        Self {
            authorization: format!("{app}{AUTHORIZE_PATH}"),
            token: format!("{api}{TOKEN_PATH}"),
            registration: format!("{api}{REGISTER_PATH}"),
        }
    }

    /// Point every endpoint at a fake provider.
    #[cfg(test)]
    pub(crate) fn with_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            authorization: format!("{base}{AUTHORIZE_PATH}"),
            token: format!("{base}{TOKEN_PATH}"),
            registration: format!("{base}{REGISTER_PATH}"),
        }
    }

    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
        pkce: &PkceChallenge,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");
        let params: [(&str, &str); 7] = [
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", pkce.method),
            ("scope", scope.as_str()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoded(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.authorization)
    }
}

/// Check that `site` is a bare host name such as `eu1.example.com`.
pub fn validate_site(site: &str) -> Result<(), String> {
    if site.is_empty() {
        return Err("site must not be empty".to_string());
    }
    if site.starts_with('.') || site.ends_with('.') || site.contains("..") {
        return Err(format!("site '{site}' is not a valid host name"));
    }
    if let Some(bad) = site
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
    {
        return Err(format!(
            "site '{site}' contains '{bad}'; expected a bare host name without scheme, port or path"
        ));
    }
    Ok(())
}

pub(crate) fn urlencoded(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char);
            }
            _ => {
                result.push('%');
                result.push_str(&format!("{b:02X}"));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::random::seeded::SeededSource;

    #[test]
    fn endpoints_are_https_on_site_hosts() {
        let ep = ProviderEndpoints::for_site("eu1.example.com");
        assert_eq!(ep.authorization, "https://app.eu1.example.com/oauth2/v1/authorize");
        assert_eq!(ep.token, "https://api.eu1.example.com/oauth2/v1/token");
        assert_eq!(
            ep.registration,
            "https://api.eu1.example.com/api/v2/oauth2/register"
        );
    }

    #[test]
    fn sites_never_share_endpoints() {
        let a = ProviderEndpoints::for_site("us1.example.com");
        let b = ProviderEndpoints::for_site("eu1.example.com");
        assert_ne!(a.token, b.token);
        assert_ne!(a.registration, b.registration);
    }

    #[test]
    fn authorization_url_carries_flow_parameters() {
        let ep = ProviderEndpoints::for_site("example.com");
        let pkce = PkceChallenge::create(&SeededSource::new(3));
        let url = ep.authorization_url(
            "abc",
            "http://127.0.0.1:4242/callback",
            "state-xyz",
            &pkce,
            &["read".to_string(), "write".to_string()],
        );
        assert!(url.starts_with("https://app.example.com/oauth2/v1/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=abc"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A4242%2Fcallback"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains(&format!("code_challenge={}", pkce.challenge)));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=read%20write"));
        assert!(!url.contains(&pkce.verifier));
    }

    #[test]
    fn validate_site_accepts_host_names() {
        assert!(validate_site("example.com").is_ok());
        assert!(validate_site("us3.example-eu.com").is_ok());
    }

    #[test]
    fn validate_site_rejects_urls_and_junk() {
        assert!(validate_site("").is_err());
        assert!(validate_site("https://example.com").is_err());
        assert!(validate_site("example.com/path").is_err());
        assert!(validate_site("example.com:8080").is_err());
        assert!(validate_site(".example.com").is_err());
        assert!(validate_site("example..com").is_err());
    }

    #[test]
    fn urlencoded_reserved_chars() {
        assert_eq!(urlencoded("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(urlencoded("safe-_.~"), "safe-_.~");
    }
}
