use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroframe::{Client, ClientConfig, ClientError, DefaultHandler, Envelope, Handler, fetch_wrapper_key};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("timed out waiting for `{0}`")]
    Timeout(String),
    #[error("failed to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "zeroframe-cli", about = "ZeroFrame WebSocket API CLI")]
struct Cli {
    /// Site address to open the API connection for.
    #[arg(long, env = "ZEROFRAME_SITE")]
    site: String,

    #[command(flatten)]
    instance: InstanceArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for values otherwise read from `ZEROFRAME_*` variables.
#[derive(Args, Debug)]
struct InstanceArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long, default_value_t = false)]
    secure: bool,

    #[arg(long)]
    master_address: Option<String>,

    #[arg(long)]
    reconnect_attempts: Option<i64>,

    #[arg(long)]
    reconnect_delay_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the wrapper key of the site.
    WrapperKey,
    /// Send one command and print its result.
    Cmd {
        name: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Log every command pushed by the server until ctrl-c.
    Listen,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = build_config(cli.site, cli.instance);

    match cli.command {
        Command::WrapperKey => run_wrapper_key(&config).await,
        Command::Cmd { name, params, timeout_secs } => {
            run_cmd(config, &name, &params, Duration::from_secs(timeout_secs)).await
        }
        Command::Listen => run_listen(config).await,
    }
}

fn build_config(site: String, args: InstanceArgs) -> ClientConfig {
    let mut config = ClientConfig::from_env(site);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.secure |= args.secure;
    if let Some(master) = args.master_address {
        config.master_address = Some(master);
    }
    if let Some(attempts) = args.reconnect_attempts {
        config.reconnect_attempts = attempts;
    }
    if let Some(ms) = args.reconnect_delay_ms {
        config.reconnect_delay = Duration::from_millis(ms);
    }
    config
}

async fn run_wrapper_key(config: &ClientConfig) -> Result<(), CliError> {
    let key = fetch_wrapper_key(config).await?;
    println!("{key}");
    Ok(())
}

async fn run_cmd(config: ClientConfig, name: &str, params: &str, wait: Duration) -> Result<(), CliError> {
    let params: Value = serde_json::from_str(params)?;
    let config = config.with_logging(false, true);
    let client = Client::connect_site(config, DefaultHandler).await?;

    let reply = client.request(name, params)?;
    let result = tokio::time::timeout(wait, reply)
        .await
        .map_err(|_| CliError::Timeout(name.to_owned()))??;
    println!("{}", serde_json::to_string_pretty(&result)?);

    client.close().await;
    Ok(())
}

/// Logs push traffic and connection changes.
struct PushLogger;

impl Handler for PushLogger {
    fn on_open(&self, client: &Client) {
        info!(site = %client.config().site, "connected");
    }

    fn on_error(&self, _client: &Client, err: &ClientError) {
        warn!(error = %err, "connection error");
    }

    fn on_close(&self, _client: &Client) {
        info!("disconnected");
    }

    fn on_request(&self, _client: &Client, cmd: &str, envelope: &Envelope) {
        let params = envelope.params.as_ref().map(Value::to_string).unwrap_or_default();
        info!(id = ?envelope.id, cmd = %cmd, params = %params, "push");
    }
}

async fn run_listen(config: ClientConfig) -> Result<(), CliError> {
    let client = Client::connect_site(config, PushLogger).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    client.close().await;
    Ok(())
}
