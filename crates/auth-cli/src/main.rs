//! authctl - drive an auth session from the terminal.

mod commands;

use std::path::PathBuf;

use auth_config::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};

/// Auth session command-line interface.
#[derive(Parser)]
#[command(name = "authctl")]
#[command(about = "Inspect and drive an auth session against a configured backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for config and persisted tokens. Defaults to ~/.authstate
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored token and current session status
    Status,
    /// Fetch the session
    Session {
        /// Call the session endpoint even without a stored token
        #[arg(short, long)]
        force: bool,
        /// Redirect to the sign-in page when unauthenticated
        #[arg(long)]
        required: bool,
    },
    /// Sign in
    SignIn {
        #[command(flatten)]
        credentials: CredentialArgs,
        /// Provider id (authjs only)
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Register a new account
    SignUp {
        #[command(flatten)]
        credentials: CredentialArgs,
        /// Do not sign in after registering
        #[arg(long)]
        prevent_login: bool,
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Sign out and drop stored tokens
    SignOut {
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Rotate the access token with the stored refresh token
    Refresh,
    /// Print the CSRF token (authjs only)
    Csrf,
    /// List configured sign-in providers (authjs only)
    Providers,
    /// Keep the session fresh and print every change. Press Enter to signal focus.
    Watch,
}

#[derive(clap::Args)]
struct CredentialArgs {
    #[arg(short, long)]
    username: Option<String>,
    #[arg(short, long, env = "AUTHSTATE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Raw JSON credentials, overriding username/password
    #[arg(long, conflicts_with_all = ["username", "password"])]
    credentials: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let auth = commands::build_auth(config, &paths)?;

    match cli.command {
        None | Some(Commands::Status) => commands::status(&auth)?,
        Some(Commands::Session { force, required }) => {
            commands::session(&auth, force, required).await?;
        }
        Some(Commands::SignIn {
            credentials,
            provider,
            callback_url,
        }) => {
            let credentials = credentials.into_value()?;
            commands::sign_in(&auth, credentials, provider, callback_url).await?;
        }
        Some(Commands::SignUp {
            credentials,
            prevent_login,
            callback_url,
        }) => {
            let credentials = credentials
                .into_value()?
                .ok_or("sign-up needs --username/--password or --credentials")?;
            commands::sign_up(&auth, credentials, prevent_login, callback_url).await?;
        }
        Some(Commands::SignOut { callback_url }) => {
            commands::sign_out(&auth, callback_url).await?;
        }
        Some(Commands::Refresh) => commands::refresh(&auth).await?,
        Some(Commands::Csrf) => commands::csrf(&auth).await?,
        Some(Commands::Providers) => commands::providers(&auth).await?,
        Some(Commands::Watch) => commands::watch(&auth).await?,
    }

    Ok(())
}

impl CredentialArgs {
    fn into_value(self) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error>> {
        if let Some(raw) = self.credentials {
            return Ok(Some(serde_json::from_str(&raw)?));
        }
        match (self.username, self.password) {
            (None, None) => Ok(None),
            (username, password) => Ok(Some(serde_json::json!({
                "username": username.unwrap_or_default(),
                "password": password.unwrap_or_default(),
            }))),
        }
    }
}
