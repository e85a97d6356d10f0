use std::io;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

use termftp::{
    AppError, ConfigManager, EventEmitter, FtpClient, FtpConnector, LocalDirectoryLister, Repl,
    Result, SessionEndpoint, init_tracing, parse_host_port,
};

/// Interactive FTP client
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Server to connect to, as host or host:port
    host: Option<String>,

    /// Control port, overrides the port in HOST
    #[arg(short, long)]
    port: Option<u16>,

    /// User name; anonymous login when omitted
    #[arg(short, long)]
    user: Option<String>,

    #[arg(long, env = "FTP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Remote directory to start in
    #[arg(short, long)]
    remote_path: Option<String>,

    /// Local directory for downloads and uploads
    #[arg(short, long)]
    local_dir: Option<PathBuf>,

    /// Connect to a saved bookmark (by name or host)
    #[arg(short, long, conflicts_with = "host")]
    bookmark: Option<String>,

    /// Config file, instead of the one in the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Start without connecting
    #[arg(long)]
    no_connect: bool,
}

fn resolve_endpoint(cli: &Cli, config: &mut ConfigManager) -> Result<SessionEndpoint> {
    let default_port = cli.port.unwrap_or(config.settings().default_port);

    let mut endpoint = match (&cli.bookmark, &cli.host) {
        (Some(name), _) => {
            let bookmark = config
                .find_bookmark(name)
                .cloned()
                .ok_or_else(|| AppError::ConfigError(format!("No bookmark named {name}")))?;
            config.touch_last_used(&bookmark.id)?;
            let mut endpoint = bookmark.to_endpoint();
            if let Some(port) = cli.port {
                endpoint.set_host_port(bookmark.host.clone(), port);
            }
            endpoint
        }
        (None, Some(host)) => {
            let (host, port) = parse_host_port(host, default_port)?;
            SessionEndpoint::new(host, cli.port.unwrap_or(port))
        }
        (None, None) => SessionEndpoint::new(String::new(), default_port),
    };

    if let Some(user) = &cli.user {
        endpoint.set_user_info(user.clone(), cli.password.clone());
    } else if cli.password.is_some() {
        let username = endpoint.username().to_string();
        endpoint.set_user_info(username, cli.password.clone());
    }
    if let Some(path) = &cli.remote_path {
        endpoint.set_remote_path(path.clone());
    }
    Ok(endpoint)
}

fn resolve_local_dir(cli: &Cli, config: &ConfigManager) -> Result<PathBuf> {
    let dir = match cli.local_dir.clone().or_else(|| config.settings().local_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    dir.canonicalize().map_err(|e| {
        AppError::ValidationError(format!("Invalid local directory {}: {}", dir.display(), e))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level)?;
    info!("Starting termftp {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    let endpoint = resolve_endpoint(&cli, &mut config)?;
    let local_dir = resolve_local_dir(&cli, &config)?;

    let (emitter, mut events) = EventEmitter::channel();
    let (mut client, mut notifications) =
        FtpClient::new(FtpConnector, LocalDirectoryLister, emitter);
    let should_connect = !cli.no_connect && !endpoint.host().is_empty();
    client.set_endpoint(endpoint);

    if should_connect && let Err(e) = client.connect() {
        error!("Failed to start connection: {}", e);
        eprintln!("error: {e}");
    }

    let mut repl = Repl::new(client, config, local_dir, io::stdout());
    repl.run(
        BufReader::new(tokio::io::stdin()),
        &mut notifications,
        &mut events,
    )
    .await?;

    info!("Exiting");
    Ok(())
}
