use colored::Colorize;

use crate::error::AuthError;
use crate::oauth::{StatusReport, TokenSet, TokenStatus};

pub fn print_login_success(site: &str, tokens: &TokenSet, is_tty: bool) {
    let head = format!("Authenticated to {site}");
    if is_tty {
        println!("{}", head.green().bold());
    } else {
        println!("{head}");
    }
    if let Some(at) = tokens.expires_at() {
        println!("Token expires: {}", at.to_rfc3339());
    }
}

pub fn print_status(report: &StatusReport, json: bool, is_tty: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        return;
    }
    for line in status_lines(report, is_tty) {
        println!("{line}");
    }
}

pub fn print_refresh_success(report: &StatusReport, json: bool, is_tty: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        return;
    }
    let head = format!("Token refreshed for {}", report.site);
    if is_tty {
        println!("{}", head.green().bold());
    } else {
        println!("{head}");
    }
    if let Some(at) = &report.expires_at {
        println!("Token expires: {at}");
    }
}

pub fn print_logout(site: &str, is_tty: bool) {
    let msg = format!("Logged out of {site}");
    if is_tty {
        println!("{}", msg.bold());
    } else {
        println!("{msg}");
    }
}

/// Print `Error: <action> failed: <message>`, or the JSON error object.
pub fn print_error(err: &AuthError, action: &str, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&err.to_json(action)).unwrap_or_default()
        );
    } else {
        eprintln!("Error: {action} failed: {err}");
    }
}

fn status_lines(report: &StatusReport, is_tty: bool) -> Vec<String> {
    let label = match report.status {
        TokenStatus::NoToken => "Not authenticated",
        TokenStatus::Valid => "Authenticated",
        TokenStatus::Expiring => "Authenticated (token expiring soon)",
        TokenStatus::Expired => "Token expired",
    };
    let label = if is_tty {
        match report.status {
            TokenStatus::Valid => label.green().bold().to_string(),
            TokenStatus::Expiring => label.yellow().bold().to_string(),
            TokenStatus::NoToken | TokenStatus::Expired => label.red().bold().to_string(),
        }
    } else {
        label.to_string()
    };

    let mut lines = vec![format!("{label} ({})", report.site)];
    if let Some(at) = &report.expires_at {
        let remaining = report.expires_in_secs.unwrap_or(0);
        if report.status == TokenStatus::Expired {
            lines.push(format!("  Expired:  {at}"));
        } else {
            lines.push(format!("  Expires:  {at} (in {})", format_remaining(remaining)));
        }
    }
    if let Some(token_type) = &report.token_type {
        lines.push(format!("  Type:     {token_type}"));
        let refresh = if report.has_refresh { "yes" } else { "no" };
        lines.push(format!("  Refresh:  {refresh}"));
    }
    if report.refresh_failed || report.status == TokenStatus::Expired {
        lines.push("  Run: siteauth login".to_string());
    } else if report.status == TokenStatus::NoToken {
        lines.push("  Run: siteauth login to authenticate".to_string());
    }
    lines.push(format!("  Storage:  {}", report.storage));
    lines
}

fn format_remaining(secs: i64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
