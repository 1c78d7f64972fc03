//! Command handlers.

use std::sync::Arc;

use auth_config::{Config, Paths};
use serde_json::Value;
use session_engine::{
    Auth, GetSessionOptions, NavigationError, NavigationTarget, Navigator, SessionSnapshot,
    SignInOptions, SignOutOptions, SignUpExtra, SignUpOptions,
};
use token_storage::FileStorage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Prints redirects instead of following them.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, target: &NavigationTarget) -> Result<(), NavigationError> {
        let kind = if target.external { "external" } else { "in-app" };
        println!("Redirect ({}): {}", kind, target.url);
        Ok(())
    }
}

pub fn build_auth(config: Config, paths: &Paths) -> Result<Auth, Box<dyn std::error::Error>> {
    paths.ensure_dirs()?;
    let storage = Arc::new(FileStorage::new(paths.token_file()));
    Ok(Auth::from_config(config, storage, Arc::new(PrintNavigator))?)
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("  Status:    {}", snapshot.status());
    println!("  Loading:   {}", snapshot.loading);
    match snapshot.last_refreshed_at {
        Some(at) => println!("  Refreshed: {}", at.to_rfc3339()),
        None => println!("  Refreshed: never"),
    }
    if let Some(data) = snapshot.data.as_value() {
        println!("  Data:      {}", data);
    }
}

pub fn status(auth: &Auth) -> CommandResult {
    println!("Provider: {}", auth.provider_kind());
    match auth.token()? {
        Some(token) => println!("  Token:     {}", token),
        None => println!("  Token:     none"),
    }
    if let Some(refresh_token) = auth.refresh_token()? {
        println!("  Refresh:   {}", refresh_token);
    }
    print_snapshot(&auth.snapshot());
    Ok(())
}

pub async fn session(auth: &Auth, force: bool, required: bool) -> CommandResult {
    let data = auth
        .get_session(GetSessionOptions {
            force,
            required,
            ..Default::default()
        })
        .await?;
    match data {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("Not signed in"),
    }
    Ok(())
}

pub async fn sign_in(
    auth: &Auth,
    credentials: Option<Value>,
    provider: Option<String>,
    callback_url: Option<String>,
) -> CommandResult {
    let result = auth
        .sign_in(
            credentials,
            SignInOptions {
                provider,
                callback_url,
                ..Default::default()
            },
        )
        .await?;

    if result.ok {
        println!("Signed in ({})", auth.status());
    } else {
        println!(
            "Sign-in failed: {} (HTTP {})",
            result.error.as_deref().unwrap_or("unknown error"),
            result.status
        );
    }
    Ok(())
}

pub async fn sign_up(
    auth: &Auth,
    credentials: Value,
    prevent_login: bool,
    callback_url: Option<String>,
) -> CommandResult {
    let response = auth
        .sign_up(
            credentials,
            SignUpOptions {
                callback_url,
                ..Default::default()
            },
            SignUpExtra {
                prevent_login_flow: prevent_login,
            },
        )
        .await?;
    println!("Registered: {}", response);
    println!("Status: {}", auth.status());
    Ok(())
}

pub async fn sign_out(auth: &Auth, callback_url: Option<String>) -> CommandResult {
    auth.sign_out(SignOutOptions {
        callback_url,
        ..Default::default()
    })
    .await?;
    println!("Signed out");
    Ok(())
}

pub async fn refresh(auth: &Auth) -> CommandResult {
    auth.refresh().await?;
    println!("Token refreshed");
    Ok(())
}

pub async fn csrf(auth: &Auth) -> CommandResult {
    println!("{}", auth.get_csrf_token().await?);
    Ok(())
}

pub async fn providers(auth: &Auth) -> CommandResult {
    let providers = auth.get_providers().await?;
    if providers.is_empty() {
        println!("No providers configured");
    }
    for (id, provider) in providers {
        println!("{:<16} {:<12} {}", id, provider.kind, provider.name);
    }
    Ok(())
}

pub async fn watch(auth: &Auth) -> CommandResult {
    let mut snapshots = auth.subscribe();
    auth.get_session(GetSessionOptions::default()).await?;
    print_snapshot(&snapshots.borrow_and_update());

    if !auth.start()? {
        println!("Automatic refresh is disabled; watching manual changes only");
    }
    info!("Watching session, press Enter to signal focus, Ctrl-C to exit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Session changed");
                print_snapshot(&snapshots.borrow_and_update());
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        auth.notify_focus();
                    }
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping");
                break;
            }
        }
    }

    auth.shutdown();
    Ok(())
}
