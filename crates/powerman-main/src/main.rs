// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PowerMan.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use powerman_core::{Collaborators, SubscriptionManager, SystemClock};
use powerman_ha::{
    HaAdvicePublisher, HaConversationAdvisor, HaNotifier, HaStateSource, HomeAssistantClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "powerman", version)]
#[command(about = "Energy advisor for Home Assistant", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(default_value = "powerman.toml")]
    config: PathBuf,

    /// Override the HTTP API port
    #[arg(short, long)]
    port: Option<u16>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG, defaults to info
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set default tracing subscriber")?;

    let mut config = AppConfig::load(&cli.config)?;
    if cli.check {
        info!("✅ Configuration is valid ({} entries)", config.entries.len());
        return Ok(());
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    info!("🚀 Starting PowerMan v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration Summary:");
    for entry in &config.entries {
        info!(
            "   - {} ({}): {} entities, every {} min, AI insights {}",
            entry.id,
            entry.name,
            entry.entities.mapped().count(),
            entry.options.advisor_interval_minutes,
            if entry.options.external_agent().is_some() {
                "on"
            } else {
                "off"
            }
        );
    }

    let ha_client = if std::env::var("SUPERVISOR_TOKEN").is_ok() {
        info!("🏠 Initializing HA client using Supervisor API...");
        HomeAssistantClient::from_supervisor()?
    } else {
        info!("🏠 Initializing HA client from configuration...");
        HomeAssistantClient::from_config(
            config.home_assistant.base_url.clone(),
            config.home_assistant.token.clone(),
        )?
    };

    if !ha_client.ping().await? {
        warn!("Home Assistant is not reachable yet, readings will be absent until it is");
    }

    let timezone = match ha_client.get_timezone().await {
        Ok(timezone) => Some(timezone),
        Err(e) => {
            warn!("Could not read timezone from Home Assistant: {}", e);
            config.home_assistant.timezone.clone()
        }
    };
    let clock = SystemClock::from_name(timezone.as_deref());
    info!("🌍 Peak windows use timezone {}", clock.timezone());

    // Conversation agents answer slowly; give their client a longer request timeout
    let advisor_timeout = Duration::from_secs(config.max_external_call_timeout_secs().max(10) + 5);
    let advisor_client = Arc::new(ha_client.cloned_with_timeout(advisor_timeout)?);
    let ha_client = Arc::new(ha_client);

    let collaborators = Collaborators {
        states: Arc::new(HaStateSource::new(ha_client.clone())),
        notifier: Arc::new(HaNotifier::new(ha_client.clone())),
        advisor: Arc::new(HaConversationAdvisor::new(advisor_client)),
        publisher: Arc::new(HaAdvicePublisher::new(ha_client)),
        clock: Arc::new(clock),
    };

    let manager = Arc::new(SubscriptionManager::new(collaborators));
    for entry in config.entries.clone() {
        manager
            .start(entry)
            .context("Failed to start entry subscription")?;
    }

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let web_manager = manager.clone();
    let server = config.server.clone();
    let web = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.changed().await;
        };
        if let Err(e) =
            powerman_web::start_web_server(web_manager, &server.bind_address, server.port, shutdown)
                .await
        {
            error!("Web server failed: {:#}", e);
        }
    });

    info!("✅ PowerMan running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("🛑 Shutting down");
    let _ = shutdown_tx.send(true);
    manager.shutdown_all().await;
    if let Err(e) = web.await {
        warn!("Web server task ended abnormally: {}", e);
    }

    info!("👋 PowerMan stopped");
    Ok(())
}
