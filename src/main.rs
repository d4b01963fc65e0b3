use anyhow::{Context, Result};
use clap::Parser;
use elan_bridge::{server, Bridge, CommandSender, Config, SerialLink};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "elan-bridge")]
#[command(about = "Bridge between an Elan amplifier serial link and WebSocket subscribers")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "elan-bridge.toml")]
    config: String,

    /// Override the serial device from the config file
    #[arg(long)]
    serial: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=elan_bridge=debug). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config).context("Failed to load config")?;
    if let Some(serial) = cli.serial {
        config.serial.path = serial;
    }

    let (hw_tx, hw_rx) = mpsc::unbounded_channel();
    let (bridge, handle) = Bridge::new(
        config.profile.clone(),
        config.bridge_settings(),
        CommandSender::new(hw_tx),
    )
    .context("Invalid hardware profile")?;

    let link = SerialLink::open(&config.serial.path, config.serial.baud_rate)
        .context("Failed to open serial link")?;
    link.start(config.profile.clone(), handle.clone(), hw_rx)
        .context("Failed to start serial threads")?;

    let bridge_task = bridge.spawn();

    let listener = server::bind(config.server.listen.as_str())
        .await
        .context("Failed to bind WebSocket listener")?;

    tokio::select! {
        result = server::serve(listener, handle) => result.context("WebSocket server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    bridge_task.abort();
    Ok(())
}
