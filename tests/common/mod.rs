use std::path::Path;

use assert_cmd::Command;
use siteauth::{ClientCredentials, CredentialStore, FileStore, TokenSet};
use tempfile::TempDir;

pub const SITE: &str = "example.com";

/// Empty storage directory for one test.
pub fn temp_storage_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// `siteauth` with its state confined to `dir` and no ambient site settings.
pub fn siteauth_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("siteauth").unwrap();
    cmd.env("SITEAUTH_CONFIG_DIR", dir)
        .env_remove("SITEAUTH_SITE")
        .env_remove("SITEAUTH_CALLBACK_TIMEOUT_SECS")
        .env_remove("SITEAUTH_LOG_LEVEL");
    cmd
}

pub fn token_set(issued_at: i64, expires_in: i64) -> TokenSet {
    TokenSet {
        access_token: "stored-access-token".into(),
        refresh_token: Some("stored-refresh-token".into()),
        token_type: "Bearer".into(),
        expires_in,
        issued_at,
        scope: "read".into(),
        client_id: "abc".into(),
    }
}

pub fn store_tokens(dir: &Path, tokens: &TokenSet) {
    FileStore::new(dir).save_tokens(SITE, tokens).unwrap();
}

pub fn store_client(dir: &Path) {
    let creds = ClientCredentials {
        client_id: "abc".into(),
        client_secret: None,
        client_name: "siteauth".into(),
        redirect_uris: vec!["http://127.0.0.1:8765/callback".into()],
        registered_at: 0,
        site: SITE.into(),
    };
    FileStore::new(dir).save_client_credentials(SITE, &creds).unwrap();
}
