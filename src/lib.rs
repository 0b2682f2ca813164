pub mod cli;
pub mod config;
pub mod error;
pub mod oauth;

pub use config::{load_settings, AuthSettings, Overrides};
pub use error::AuthError;
pub use oauth::{
    AuthOrchestrator, BrowserOpener, ClientCredentials, CredentialStore, FileStore, MemoryStore,
    StatusReport, TokenSet,
};

/// Convenience for callers that only need a usable bearer token for a site.
///
/// Refreshes first when the stored token is close to expiry.
pub async fn authorization_header(settings: &AuthSettings) -> Result<String, AuthError> {
    let store = std::sync::Arc::new(FileStore::new(settings.storage_dir.clone()));
    AuthOrchestrator::new(settings, store)?
        .authorization_header()
        .await
}
