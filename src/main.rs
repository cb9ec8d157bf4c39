mod agent;
mod config;
mod error;
mod panel;
mod types;
mod web;

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use agent::{PaperAgentFactory, SimulatedFeed};
use config::{Credentials, PanelConfig};
use types::TradeRecord;
use panel::{render, ControlPanel, LogView, Notice, Session};
use web::{start_panel_server, AppState};

#[derive(Parser)]
#[command(name = "trading-agent-panel")]
#[command(version)]
#[command(about = "Control panel for a cryptocurrency auto-trading agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "panel.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the control panel over HTTP
    Serve {
        /// Port to listen on (overrides the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start the agent headless and print its status until Ctrl+C
    Run {
        /// Seconds between status refreshes
        #[arg(short, long, default_value = "10")]
        refresh_secs: u64,
    },
    /// Validate configuration and credentials
    CheckConfig,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Trading Agent Panel v{}", env!("CARGO_PKG_VERSION"));

    let config = PanelConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            serve(config, port).await
        }
        Commands::Run { refresh_secs } => run_headless(config, refresh_secs).await,
        Commands::CheckConfig => check_config(&config),
        Commands::PrintConfig => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Builds the panel and starts a task that logs every fill.
fn build_panel(config: &PanelConfig) -> ControlPanel {
    let feed = Arc::new(SimulatedFeed::new(config.paper.seed));
    let factory = Arc::new(PaperAgentFactory::new(feed, config.paper.initial_cash));
    tokio::spawn(log_fills(factory.subscribe_trades()));
    ControlPanel::new(factory)
}

async fn log_fills(mut trades: broadcast::Receiver<TradeRecord>) {
    loop {
        match trades.recv().await {
            Ok(trade) => info!(
                "Fill: {} {} {} ({})",
                trade.action.label(),
                trade.ticker,
                trade.amount,
                trade.order_id.as_deref().unwrap_or("-")
            ),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Fill log fell behind, {} trades not shown", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn serve(config: PanelConfig, port: u16) -> Result<()> {
    let credentials = Credentials::from_env();
    if !credentials.is_complete() {
        warn!("Credentials are incomplete; set them via PUT /api/credentials before starting the agent");
    }

    let state = AppState::new(
        Session::new(config.agent.clone(), credentials),
        build_panel(&config),
        config.server.settle_delay(),
    );

    start_panel_server(state, port).await
}

async fn run_headless(config: PanelConfig, refresh_secs: u64) -> Result<()> {
    let panel = build_panel(&config);
    let mut session = Session::new(config.agent.clone(), Credentials::from_env());

    let notice = panel.start(&mut session).await;
    if let Notice::Error(message) = notice {
        return Err(anyhow!(message));
    }
    info!("{}", notice.message());

    let mut ticker = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let view = render(&session, Local::now().naive_local()).await;
                println!("{}", view.status.summary());
                if let LogView::Lines { lines } = &view.logs {
                    if let Some(latest) = lines.first() {
                        println!("  {}", latest.text);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                let notice = panel.stop(&mut session).await;
                info!("{}", notice.message());
                break;
            }
        }
    }

    Ok(())
}

fn check_config(config: &PanelConfig) -> Result<()> {
    println!("Configuration OK");
    println!("  Server port:        {}", config.server.port);
    println!("  Interval:           {} minutes", config.agent.interval_minutes);
    println!("  Max investment:     {} KRW", config.agent.max_investment);
    println!("  Max trades per day: {}", config.agent.max_trading_count);
    println!("  Target coins:       {}", config.agent.target_coins.join(", "));
    println!(
        "  Risk level:         {} ({})",
        config.agent.risk_level,
        config.agent.risk_level.description()
    );
    println!("  Model:              {}", config.agent.model);

    let credentials = Credentials::from_env();
    println!("  Exchange keys:      {}", if credentials.has_exchange_keys() { "set" } else { "missing" });
    println!("  Model API key:      {}", if credentials.has_model_key() { "set" } else { "missing" });

    if !credentials.is_complete() {
        return Err(anyhow!("credentials are incomplete; the agent cannot be started"));
    }
    Ok(())
}
