//! Storefront CLI - sign in and out of the storefront backend from a terminal.
//!
//! Every command builds one `SessionManager`, lets it resolve the current
//! session, then drives it. Failures are shown as short messages; set
//! `RUST_LOG=debug` for the full story on stderr.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_core::{
    normalize, ApiClient, AuthError, AuthStatus, Avatar, Config, Credentials, Registration,
    SessionManager, TokenStore, User,
};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration unsuccessful";

#[derive(Parser)]
#[command(name = "storefront", version, about = "Storefront account session client")]
struct Cli {
    /// Backend address (overrides the config file and STOREFRONT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print user records as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show whether a session is active
    Status,
    /// Show the logged-in user
    Whoami,
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// End the session
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        /// Avatar image (JPEG, PNG or WebP, at most 2 MB)
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let tokens = Arc::new(TokenStore::open(cache_dir));

    let api = match cli.api_url {
        Some(ref url) => ApiClient::new(url, config.request_timeout(), tokens.clone())?,
        None => ApiClient::from_config(&config, tokens.clone())?,
    };
    info!(base_url = %api.base_url(), "Storefront CLI starting");

    let session = SessionManager::start(Arc::new(api));
    let state = session.resolved().await;

    let ok = match cli.command {
        Command::Status => {
            match state.status() {
                AuthStatus::Authenticated => {
                    println!("Logged in");
                    if let Some(token) = tokens.live_token() {
                        println!("Session token expires in {} minutes", token.minutes_until_expiry());
                    }
                }
                AuthStatus::Unauthenticated | AuthStatus::Unknown => println!("Not logged in"),
            }
            true
        }
        Command::Whoami => match state.current_user() {
            Some(user) => {
                print_user(user, cli.json)?;
                true
            }
            None => {
                println!("Not logged in");
                false
            }
        },
        Command::Login { email } => {
            if let Some(user) = state.current_user() {
                println!("Already logged in as {}", user.email);
                true
            } else {
                login(&session, &mut config, email, cli.json).await?
            }
        }
        Command::Logout => {
            session.logout().await;
            println!("Logged out");
            true
        }
        Command::Register { email, avatar } => {
            register(&session, email, avatar.as_deref()).await?
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn login(
    session: &SessionManager,
    config: &mut Config,
    email: Option<String>,
    json: bool,
) -> Result<bool> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    match session.login(&Credentials::new(email.clone(), password)).await {
        Ok(user) => {
            println!("Welcome back, {}!", user.display_name());
            print_user(&user, json)?;

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            Ok(true)
        }
        Err(e) => {
            report_failure(e, LOGIN_FAILED);
            Ok(false)
        }
    }
}

async fn register(session: &SessionManager, email: String, avatar: Option<&Path>) -> Result<bool> {
    let avatar = avatar.map(read_avatar).transpose()?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm_password = rpassword::prompt_password("Confirm password: ")?;

    let registration = Registration {
        email,
        password,
        confirm_password,
        avatar,
    };

    match session.register(&registration).await {
        Ok(()) => {
            println!("Registration successful! Log in to continue.");
            Ok(true)
        }
        Err(e) => {
            report_failure(e, REGISTRATION_FAILED);
            Ok(false)
        }
    }
}

/// Per-field messages for bad input, one normalized line for anything else.
fn report_failure(error: AuthError, fallback: &str) {
    if let Some(fields) = error.field_errors() {
        for (field, messages) in fields.fields() {
            for message in messages {
                eprintln!("{}: {}", field, message);
            }
        }
        return;
    }
    let error = anyhow::Error::from(error);
    eprintln!("{}", normalize(&error, fallback));
}

fn prompt_email(last_email: Option<&str>) -> Result<String> {
    match last_email {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match last_email {
        Some(last) if input.is_empty() => last.to_string(),
        _ => input.to_string(),
    })
}

fn read_avatar(path: &Path) -> Result<Avatar> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read avatar {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());

    Ok(Avatar {
        content_type: content_type_for(path).to_string(),
        file_name,
        bytes,
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_user(user: &User, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(user)?);
    } else {
        println!("{} (id {})", user.email, user.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("me.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("me.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("me.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("me.webp")), "image/webp");
        assert_eq!(content_type_for(Path::new("me.gif")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("avatar")), "application/octet-stream");
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["storefront", "--json", "login", "--email", "a@b.com"])
            .expect("login should parse");
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Login { email: Some(ref e) } if e == "a@b.com"));

        let cli = Cli::try_parse_from(["storefront", "register", "--email", "a@b.com", "--api-url", "http://x"])
            .expect("register should parse");
        assert_eq!(cli.api_url.as_deref(), Some("http://x"));
        assert!(matches!(cli.command, Command::Register { avatar: None, .. }));

        assert!(Cli::try_parse_from(["storefront"]).is_err());
    }
}
