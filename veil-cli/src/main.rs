//! veildns CLI
//!
//! Runs the DNS interception gateway, performs ad-hoc lookups and
//! generates sample configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use veil_dns::DenyList;
use veil_gateway::{
    Config, DnsGateway, DohClient, EventKind, EventSink, GatewayEvent, OAuth2Client, UdpFrontend,
};

/// veildns - deny-list filtering, private DNS gateway
#[derive(Parser)]
#[command(name = "veildns")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "veildns.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run,

    /// Resolve a name through the configured upstream resolver
    Lookup {
        /// Name to resolve
        name: String,
    },

    /// Generate a sample configuration file
    GenConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "veildns.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run => run(cli.config).await,
        Commands::Lookup { name } => lookup(cli.config, &name).await,
        Commands::GenConfig { output } => generate_config(output),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: &PathBuf) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {:?}", path))
}

async fn run(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    info!("configuration loaded from {:?}", config_path);

    let deny_list = match &config.filter.deny_list {
        Some(path) => {
            let list = DenyList::load(path)
                .with_context(|| format!("failed to read deny-list {:?}", path))?;
            info!("deny-list loaded: {} patterns from {:?}", list.len(), path);
            list
        }
        None => DenyList::empty(),
    };

    let doh = match &config.doh {
        Some(doh_config) => {
            let oauth2 = doh_config.oauth2.as_ref().map(|o| {
                OAuth2Client::new(
                    o.token_url.clone(),
                    o.client_id.clone(),
                    o.client_secret.clone(),
                )
            });
            let (proxy, aead) = match &doh_config.proxy {
                Some(proxy) => (Some(proxy.url.clone()), proxy.aead),
                None => (None, false),
            };
            Some(
                DohClient::new(&doh_config.url, oauth2, proxy, aead)
                    .context("failed to create DoH client")?,
            )
        }
        None => None,
    };
    let no_pad = config.doh.as_ref().is_some_and(|d| d.no_pad);

    // event consumer: one line per query/block
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<GatewayEvent>(256);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event.kind {
                EventKind::Block => info!("blocked {}", event.name),
                EventKind::Query => tracing::debug!("query {}", event.name),
                EventKind::Config => info!("config changed: {}", event.name),
            }
        }
    });

    let frontend = UdpFrontend::bind(&config.listen.bind)
        .await
        .with_context(|| format!("failed to bind front-end on {}", config.listen.bind))?;

    let gateway = Arc::new(
        DnsGateway::new(
            &config.resolver.server,
            deny_list,
            doh,
            frontend.writer(),
            EventSink::new(event_tx),
            no_pad,
        )
        .await
        .context("failed to start gateway")?,
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let response_loop = {
        let gateway = gateway.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = gateway.run(shutdown).await {
                error!("gateway response loop failed: {}", e);
            }
        })
    };

    let frontend_loop = {
        let gateway = gateway.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = frontend.run(gateway, shutdown).await {
                error!("front-end failed: {}", e);
            }
        })
    };

    info!("veildns running, press Ctrl-C to stop");
    wait_for_shutdown().await;
    info!("shutting down");

    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = response_loop.await;
        let _ = frontend_loop.await;
    })
    .await;

    Ok(())
}

async fn lookup(config_path: PathBuf, name: &str) -> Result<()> {
    // fall back to defaults when no config file is around
    let config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        Config::default()
    };

    let mut resolver = veil_gateway::Resolver::new(&config.resolver.server)
        .await
        .with_context(|| format!("failed to reach resolver {}", config.resolver.server))?;

    let results = resolver
        .resolve(name)
        .await
        .with_context(|| format!("lookup of '{}' failed", name))?;

    if results.is_empty() {
        println!("{}: no A records", name);
        return Ok(());
    }
    for result in results {
        let ttl = result
            .not_after
            .saturating_duration_since(std::time::Instant::now());
        println!(
            "{}\t{}\t(expires in {})",
            name,
            result.address,
            veil_dns::types::format_ttl(ttl.as_secs() as u32)
        );
    }
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<()> {
    if output.exists() {
        anyhow::bail!("{:?} already exists, not overwriting", output);
    }
    std::fs::write(&output, Config::sample())
        .with_context(|| format!("failed to write {:?}", output))?;
    println!("sample configuration written to {:?}", output);
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
}
