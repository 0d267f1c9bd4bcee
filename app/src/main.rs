mod sidecar;
mod sidecar_ipc;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use thread_relay_core::clients::SourceClient;
use thread_relay_core::config::LogFormat;
use thread_relay_core::{open_store, query, BridgeConfig, BridgeContext, Dispatcher};

use crate::sidecar::SidecarSource;
use crate::telegram::TelegramClient;

#[derive(Debug, Parser)]
#[command(name = "thread-relay", about = "Relay WhatsApp conversations into Telegram forum threads")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "THREAD_RELAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

fn init_tracing(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    config.validate_sidecar()?;
    init_tracing(&config);

    let store = open_store(&config.database_path)
        .with_context(|| format!("opening store at {}", config.database_path.display()))?;
    let known_threads = store.with_conn(|conn| query::list_topics(conn, config.telegram.target_chat_id))?;
    for topic in &known_threads {
        debug!(chat = %topic.wa_chat_key, thread_id = topic.tg_thread_id, "known thread");
    }
    let dest = TelegramClient::new(&config.telegram)?;
    let (source, mut events) = SidecarSource::spawn(&config.whatsapp.sidecar_command)
        .await
        .context("starting whatsapp sidecar")?;
    let source = Arc::new(source);
    info!(
        own_id = %source.own_id(),
        target_chat = config.telegram.target_chat_id,
        threads = known_threads.len(),
        "bridge starting"
    );

    let dispatcher = Arc::new(Dispatcher::new(BridgeContext {
        config,
        store: Arc::new(store),
        source: source.clone(),
        dest: Arc::new(dest),
        start_time: Utc::now(),
    })?);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    dispatcher.spawn(event);
                }
                None => {
                    warn!("sidecar event stream ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    source.shutdown().await;
    info!("bridge stopped");
    Ok(())
}
