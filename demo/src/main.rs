//! pulsewire demo: hold one stream open, print what arrives, send what you type.
//!
//! Each line read from stdin is `<type> [json-payload]`, for example
//! `subscribe {"symbol": "ACME"}`. Lines are queued while the connection is
//! down and flushed once it is back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pulsewire_client::{
    ClientConfig, ClientEvent, ConnectionManager, CredentialProvider, EventKind, NoCredentials,
    StaticToken,
};
use pulsewire_websocket::{WebSocketTransport, WebSocketTransportConfig};

/// Stream messages over a self-healing WebSocket connection
#[derive(Parser, Debug)]
#[command(name = "pulsewire-demo", version)]
struct Cli {
    /// Endpoint URL (ws, wss, http or https); overrides the config file
    #[arg(env = "PULSEWIRE_URL")]
    url: Option<String>,

    /// Load settings from a TOML, YAML or JSON file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Bearer token presented during the handshake
    #[arg(long, env = "PULSEWIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Require an encrypted connection
    #[arg(long)]
    ssl: bool,

    /// Message type to print; repeat for several
    #[arg(long = "listen", short = 'l', value_name = "TYPE")]
    listen: Vec<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = load_config(&cli)?;
    let credentials: Arc<dyn CredentialProvider> = match &cli.token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(NoCredentials),
    };
    let transport = WebSocketTransport::new(WebSocketTransportConfig::default())?;
    let manager = ConnectionManager::new(config, Arc::new(transport), credentials)?;

    register_printers(&manager, &cli.listen);

    match manager.connect().await {
        Ok(state) => info!(%state, endpoint = manager.endpoint(), "Initial connection settled"),
        Err(e) if e.is_terminal() => bail!("cannot connect: {e}"),
        Err(e) => warn!(error = %e, "Initial connection failed, continuing"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if let Err(e) = send_line(&manager, &line).await {
                    warn!(error = %e, "Not sent");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    manager.shutdown().await?;
    let metrics = manager.metrics();
    println!(
        "{}",
        serde_json::to_string_pretty(&metrics).context("encoding metrics")?
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if cli.ssl {
        config.ssl = true;
    }
    if config.url.is_empty() {
        bail!("no endpoint given; pass a URL or set `url` in the config file");
    }
    Ok(config)
}

fn register_printers(manager: &ConnectionManager, listen: &[String]) {
    manager.on(EventKind::Connect, |event| {
        if let ClientEvent::Connect { endpoint } = event {
            info!(%endpoint, "Connected");
        }
    });
    manager.on(EventKind::Disconnect, |event| {
        if let ClientEvent::Disconnect { reason } = event {
            warn!(%reason, "Disconnected");
        }
    });
    manager.on(EventKind::Reconnecting, |event| {
        if let ClientEvent::Reconnecting { attempt, delay } = event {
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
        }
    });
    manager.on(EventKind::Error, |event| {
        if let ClientEvent::Error(e) = event {
            error!(error = %e, "Client error");
        }
    });

    for kind in listen {
        manager.on(EventKind::message(kind.as_str()), |event| {
            if let ClientEvent::Message(envelope) = event
                && let Ok(line) = serde_json::to_string(envelope)
            {
                println!("{line}");
            }
        });
    }
}

async fn send_line(manager: &ConnectionManager, line: &str) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let (kind, payload) = match line.split_once(char::is_whitespace) {
        Some((kind, rest)) => (
            kind,
            serde_json::from_str(rest.trim()).context("payload is not valid JSON")?,
        ),
        None => (line, serde_json::Value::Null),
    };
    let outcome = manager.send(kind, payload).await?;
    info!(kind, ?outcome, "Message accepted");
    Ok(())
}
