//! Command-line front end for the Acsys data-access layer.
//!
//! Every subcommand loads the JSON configuration, selects the configured
//! backend and prints its result as JSON on stdout. Errors go to stderr;
//! failures caused by the request print only a generic message.
//!
//! # Security Guarantees
//! - Passwords are read from a prompt or `ACSYS_PASSWORD`, never from flags
//! - Tokens and secrets taken from the environment are hidden in `--help`
//! - Connection strings are redacted wherever they are printed

use acsys_core::logging::{LogFormat, init_logging};
use acsys_core::{
    AcsysError, AppConfig, AppContext, LockState, PageOptions, QueryOptions, Role, StorageRequest,
    error::redact_database_url, security::SigningSecret,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "acsys")]
#[command(about = "Pluggable data-access layer with lock-gated tables and signed tokens")]
#[command(version)]
#[command(long_about = "
Acsys - uniform record access over interchangeable backends

Reads and writes tables through one driver chosen from configuration,
serving unlocked tables without credentials and everything else behind
signed session tokens.

SUPPORTED DATABASES:
- SQLite (sqlite:// or .db/.sqlite files)
- MySQL (mysql://) [if compiled with --features mysql]
- MongoDB (mongodb://) [if compiled with --features mongodb]

EXAMPLES:
  acsys check
  acsys create-user admin --role Administrator
  ACSYS_TOKEN=$(acsys login admin | jq -r .access_token) acsys tables
  acsys read-open posts --query '{\"where\": [[\"views\", \">\", 10]]}'
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Configuration file
    #[arg(short, long, env = "ACSYS_CONFIG", default_value = "acsys.json")]
    config: PathBuf,

    /// Overrides database.url
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Overrides auth.secret
    #[arg(long, env = "ACSYS_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Args)]
struct TokenArg {
    /// Access token from `login`
    #[arg(long, env = "ACSYS_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, provision metadata tables and report status
    Check,
    /// Show the effective configuration without connecting
    Info,
    /// List tables with lock state and size
    Tables(TokenArg),
    /// Count the records of a table
    Size {
        table: String,
        #[command(flatten)]
        auth: TokenArg,
    },
    /// Describe the columns or fields of a table
    Describe {
        table: String,
        #[command(flatten)]
        auth: TokenArg,
    },
    /// Read records with a token, regardless of lock state
    Read {
        table: String,
        /// Query options as JSON: {"where": [...], "limit": n, "order": [field, dir]}
        #[arg(long, default_value = "{}")]
        query: String,
        #[command(flatten)]
        auth: TokenArg,
    },
    /// Read records of an unlocked table without a token
    ReadOpen {
        table: String,
        #[arg(long, default_value = "{}")]
        query: String,
    },
    /// Read one page; without a token only unlocked tables are served
    Page {
        table: String,
        /// Page options as JSON: {"where": [...], "order": [...], "page_size": n, "cursor": "..."}
        #[arg(long, default_value = "{}")]
        options: String,
        #[arg(long, env = "ACSYS_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Exchange a username and password for a token pair
    Login { username: String },
    /// Exchange a refresh token for a new pair
    Refresh {
        #[arg(long, env = "ACSYS_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
    /// Provision a user
    CreateUser {
        username: String,
        #[arg(long, default_value = "Standard User")]
        role: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Lock a table (Administrator only)
    Lock {
        table: String,
        #[command(flatten)]
        auth: TokenArg,
    },
    /// Unlock a table (Administrator only)
    Unlock {
        table: String,
        #[command(flatten)]
        auth: TokenArg,
    },
    /// Produce a retrievable URL for a stored file
    StorageUrl {
        path: String,
        /// Link lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Retrieve a stored file through its signed link
    Fetch {
        path: String,
        /// Token from the `token` parameter of a file URL
        #[arg(long)]
        link: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report whether an Administrator exists
    HasAdmin,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.global.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet, format) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", describe_error(&err));
            ExitCode::FAILURE
        }
    }
}

/// Message shown for a failed command.
///
/// Core errors print only their caller-safe message. Request failures log
/// their detail at debug level; anything else is logged as an error.
fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AcsysError>() {
        Some(e) => {
            if e.is_client_error() {
                tracing::debug!("{:#}", err);
            } else {
                tracing::error!("{:#}", err);
            }
            e.caller_message().to_string()
        }
        None => format!("{:#}", err),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let secret = cli.secret.as_deref().map(SigningSecret::new);
    let config = AppConfig::load(&cli.config, cli.database_url.clone(), secret)?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    if matches!(cli.command, Command::Info) {
        return print_json(&serde_json::json!({
            "project_name": config.project_name(),
            "database": {
                "type": config.database_type(),
                "url": redact_database_url(&config.database.url),
            },
            "storage": {
                "type": config.storage_type(),
                "public_files": config.storage.public_files,
            },
            "access_ttl_hours": config.auth.access_ttl_hours,
            "refresh_ttl_hours": config.auth.refresh_ttl_hours,
        }));
    }

    let context = AppContext::initialize(config).await?;
    let gate = context.gate();

    match cli.command {
        Command::Info => Ok(()),
        Command::Check => print_json(&serde_json::json!({
            "connected": context.driver().is_connected().await,
            "database": context.database_type(),
            "storage": context.storage_type(),
        })),
        Command::Tables(auth) => print_json(&gate.list_tables(&auth.token).await?),
        Command::Size { table, auth } => print_json(&serde_json::json!({
            "table": table,
            "size": gate.table_size(&auth.token, &table).await?,
        })),
        Command::Describe { table, auth } => print_json(&gate.describe(&auth.token, &table).await?),
        Command::Read { table, query, auth } => {
            let options = QueryOptions::parse(&query)?;
            print_json(&gate.read(&auth.token, &table, &options).await?)
        }
        Command::ReadOpen { table, query } => {
            let options = QueryOptions::parse(&query)?;
            print_json(&gate.read_open(&table, &options).await?)
        }
        Command::Page {
            table,
            options,
            token,
        } => {
            let options = PageOptions::parse(&options)?;
            let page = match token {
                Some(token) => gate.page(&token, &table, &options).await?,
                None => gate.page_open(&table, &options).await?,
            };
            print_json(&page)
        }
        Command::Login { username } => {
            let password = read_password("Password: ")?;
            print_json(&context.auth().authenticate(&username, &password).await?)
        }
        Command::Refresh { refresh_token } => {
            print_json(&context.auth().refresh(&refresh_token).await?)
        }
        Command::CreateUser {
            username,
            role,
            email,
        } => {
            let password = read_password("New password: ")?;
            let profile = context
                .auth()
                .create_user(&username, &password, Role::from(role), &email)
                .await?;
            print_json(&profile)
        }
        Command::Lock { table, auth } => {
            gate.set_table_lock(&auth.token, &table, LockState::Locked)
                .await?;
            print_json(&serde_json::json!({ "table": table, "lock_state": LockState::Locked }))
        }
        Command::Unlock { table, auth } => {
            gate.set_table_lock(&auth.token, &table, LockState::Unlocked)
                .await?;
            print_json(&serde_json::json!({ "table": table, "lock_state": LockState::Unlocked }))
        }
        Command::StorageUrl { path, expires_in } => {
            let mut request = StorageRequest::new(path);
            if let Some(secs) = expires_in {
                let lifetime = chrono::Duration::try_seconds(secs)
                    .context("--expires-in is out of range")?;
                request = request.expires_in(lifetime);
            }
            let url = context.storage().get_storage_url(&request).await?;
            print_json(&serde_json::json!({ "url": url }))
        }
        Command::Fetch { path, link, output } => {
            let bytes = context.storage().fetch_file(&path, link.as_deref()).await?;
            match output {
                Some(output) => tokio::fs::write(&output, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", output.display())),
                None => std::io::stdout()
                    .write_all(&bytes)
                    .context("Failed to write to stdout"),
            }
        }
        Command::HasAdmin => print_json(&serde_json::json!({
            "has_admin": context.auth().has_admin().await?,
        })),
    }
}

/// Reads a password from `ACSYS_PASSWORD` or an interactive prompt.
fn read_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var("ACSYS_PASSWORD") {
        return Ok(Zeroizing::new(password));
    }
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
