use clap::{Parser, Subcommand};

use siteauth::cli::output::print_error;
use siteauth::{AuthError, Overrides};

#[derive(Parser)]
#[command(name = "siteauth", version, about = "OAuth2 login and token management for a site")]
struct Cli {
    /// Site to authenticate against, e.g. eu1.example.com
    #[arg(long, global = true)]
    site: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through the browser and store the tokens
    Login {
        /// Seconds to wait for the browser redirect
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show whether a valid token is stored
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Exchange the stored refresh token for a new access token
    Refresh {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print a valid access token, refreshing it first if needed
    Token {
        /// Print the full Authorization header value
        #[arg(long)]
        header: bool,
    },

    /// Delete stored tokens and client registration
    Logout,
}

impl Commands {
    fn action(&self) -> &'static str {
        match self {
            Commands::Login { .. } => "login",
            Commands::Status { .. } => "status",
            Commands::Refresh { .. } => "refresh",
            Commands::Token { .. } => "token",
            Commands::Logout => "logout",
        }
    }

    fn json(&self) -> bool {
        matches!(
            self,
            Commands::Status { json: true } | Commands::Refresh { json: true }
        )
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SITEAUTH_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let action = cli.command.action();
    let json = cli.command.json();

    if let Err(e) = run(cli).await {
        print_error(&e, action, json);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AuthError> {
    let overrides = Overrides {
        site: cli.site,
        callback_timeout_secs: match &cli.command {
            Commands::Login { timeout, .. } => *timeout,
            _ => None,
        },
    };
    let settings = siteauth::load_settings(&overrides)?;

    match cli.command {
        Commands::Login { no_browser, .. } => {
            siteauth::cli::auth::run_login(&settings, no_browser).await
        }
        Commands::Status { json } => siteauth::cli::auth::run_status(&settings, json),
        Commands::Refresh { json } => siteauth::cli::auth::run_refresh(&settings, json).await,
        Commands::Token { header } => siteauth::cli::auth::run_token(&settings, header).await,
        Commands::Logout => siteauth::cli::auth::run_logout(&settings),
    }
}
