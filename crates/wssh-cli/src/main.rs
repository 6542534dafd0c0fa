//! wssh: SSH through a WebSocket gateway.
//!
//! Opens an interactive shell (or runs one command) on a remote host,
//! reached through a gateway that bridges WebSocket to SSH. Authenticates
//! with a password or an OpenSSH private key.

mod config;
mod session;
mod terminal;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Password;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use wssh_client::{AuthenticationMethod, ConnectionConfig, OutboundFraming};
use wssh_core::keys;

use crate::config::{expand_home, parse_target, Config};

/// wssh: SSH through a WebSocket gateway
#[derive(Parser)]
#[command(name = "wssh", version, about = "SSH sessions tunneled through a WebSocket gateway")]
struct Cli {
    /// Target in [user@]host format (defaults to the configured host)
    target: Option<String>,

    /// Gateway WebSocket URL (ws:// or wss://)
    #[arg(short, long)]
    gateway: Option<String>,

    /// SSH port on the target host
    #[arg(short, long)]
    port: Option<u16>,

    /// Private key file for public-key authentication
    #[arg(short = 'i', long = "identity")]
    identity: Option<PathBuf>,

    /// Authenticate with a password even if an identity is configured
    #[arg(long)]
    password_auth: bool,

    /// Seconds to wait for authentication
    #[arg(long)]
    timeout: Option<u64>,

    /// Run a command instead of an interactive shell. Piped stdin is
    /// forwarded to it.
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Frame session input as "binary" frames or as text {"data"} messages
    #[arg(long)]
    framing: Option<OutboundFraming>,

    /// Config file path
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "wssh=debug,wssh_cli=debug,wssh_client=debug,wssh_core=debug"
    } else {
        "wssh_cli=warn,wssh_client=warn,wssh_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge CLI flags over the config file into a connection config,
/// prompting for whatever secret the chosen method needs.
fn build_connection(cli: &Cli, cfg: &Config) -> Result<ConnectionConfig> {
    let target = match (&cli.target, cfg.default.host.as_str()) {
        (Some(target), _) => target.clone(),
        (None, "") => anyhow::bail!("no target given and no default host configured"),
        (None, host) => host.to_string(),
    };
    let (username, hostname) = parse_target(&target)?;

    let endpoint = cli
        .gateway
        .clone()
        .or_else(|| Some(cfg.default.gateway.clone()).filter(|g| !g.is_empty()))
        .context("no gateway configured; pass --gateway or set default.gateway")?;
    wssh_client::transport::validate_endpoint(&endpoint)?;

    let identity = cli
        .identity
        .clone()
        .or_else(|| cfg.default.identity.as_deref().map(expand_home))
        .filter(|_| !cli.password_auth);

    let (cols, rows) = terminal::get_terminal_size();
    let mut connection = ConnectionConfig {
        endpoint,
        hostname: hostname.clone(),
        port: cli.port.unwrap_or(cfg.default.port),
        username: username.clone(),
        auth_timeout: Duration::from_secs(cli.timeout.unwrap_or(cfg.default.timeout_secs)),
        term: cfg.default.term.clone(),
        command: cli.command.clone(),
        framing: cli.framing.unwrap_or(cfg.default.framing),
        cols,
        rows,
        ..Default::default()
    };

    match identity {
        Some(path) => {
            let pem = keys::read_private_key(&path)
                .with_context(|| format!("failed to read identity {}", path.display()))?;
            if keys::is_encrypted(&pem)? {
                let passphrase = Password::new()
                    .with_prompt(format!("Enter passphrase for key '{}'", path.display()))
                    .allow_empty_password(true)
                    .interact()
                    .context("failed to read passphrase")?;
                connection.key_passphrase = Some(passphrase);
            }
            debug!(identity = %path.display(), "using public-key authentication");
            connection.authentication_method = AuthenticationMethod::PrivateKey;
            connection.private_key = Some(pem);
        }
        None => {
            let password = Password::new()
                .with_prompt(format!("{username}@{hostname}'s password"))
                .allow_empty_password(true)
                .interact()
                .context("failed to read password")?;
            connection.authentication_method = AuthenticationMethod::Password;
            connection.password = Some(password);
        }
    }

    Ok(connection)
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let cfg = Config::load(&config_path)?;
    let connection = build_connection(&cli, &cfg)?;
    let interactive = connection.command.is_none();
    session::run(connection, interactive).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("wssh: {e:#}");
        std::process::exit(1);
    }
}
