use std::io::IsTerminal;
use std::sync::Arc;

use crate::config::AuthSettings;
use crate::error::AuthError;
use crate::oauth::{AuthOrchestrator, FileStore, NoBrowser};

use super::output::{print_login_success, print_logout, print_refresh_success, print_status};

fn orchestrator(settings: &AuthSettings) -> Result<AuthOrchestrator, AuthError> {
    let store = Arc::new(FileStore::new(settings.storage_dir.clone()));
    AuthOrchestrator::new(settings, store)
}

pub async fn run_login(settings: &AuthSettings, no_browser: bool) -> Result<(), AuthError> {
    let mut orch = orchestrator(settings)?;
    if no_browser {
        orch = orch.with_browser(Box::new(NoBrowser));
    }
    let tokens = orch.login().await?;
    print_login_success(&settings.site, &tokens, std::io::stdout().is_terminal());
    Ok(())
}

/// Report the stored token. Not being logged in is not an error.
pub fn run_status(settings: &AuthSettings, json: bool) -> Result<(), AuthError> {
    let report = orchestrator(settings)?.status()?;
    print_status(&report, json, std::io::stdout().is_terminal());
    Ok(())
}

pub async fn run_refresh(settings: &AuthSettings, json: bool) -> Result<(), AuthError> {
    let orch = orchestrator(settings)?;
    orch.refresh().await?;
    let report = orch.status()?;
    print_refresh_success(&report, json, std::io::stdout().is_terminal());
    Ok(())
}

/// Print a usable access token (or the whole header value), refreshing first
/// when it is close to expiry. An expired token is never printed.
pub async fn run_token(settings: &AuthSettings, header: bool) -> Result<(), AuthError> {
    let orch = orchestrator(settings)?;
    let value = if header {
        orch.authorization_header().await?
    } else {
        orch.valid_token().await?.access_token
    };
    println!("{value}");
    Ok(())
}

pub fn run_logout(settings: &AuthSettings) -> Result<(), AuthError> {
    orchestrator(settings)?.logout()?;
    print_logout(&settings.site, std::io::stdout().is_terminal());
    Ok(())
}
