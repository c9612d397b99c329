mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use memebase_stats::{
    api::{self, AppState},
    config::Config,
    contract::MemebaseContract,
    conversation,
    eth::{self, EthClient},
    models::EventKind,
    report::render_text,
    service::{StatsQuery, StatsService},
};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env_with_rpc_override(&cli.rpc_urls)
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Stats {
            addresses,
            events,
            json,
        } => {
            let service = StatsService::from_config(&config)?;
            let query = StatsQuery::parse(&addresses, &events)?;
            let report = service.run(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_text(&report));
            }
        }
        Commands::Chat => {
            let service = StatsService::from_config(&config)?;
            conversation::run_console(&service, config.conversation_timeout).await?;
        }
        Commands::Serve { addr } => {
            let bind = addr.unwrap_or_else(|| config.http_bind_addr.clone());
            let state = AppState {
                service: Arc::new(StatsService::from_config(&config)?),
            };
            api::run_http_server(&bind, state).await?;
        }
        Commands::CheckEndpoints => {
            let endpoints = EthClient::from_urls(config.require_rpc_urls()?, config.rpc_timeout)?;
            for health in eth::check_endpoints(&endpoints, config.rpc_timeout).await {
                match health.latest_block {
                    Ok(latest) => println!("ok    {} (latest block {})", health.url, latest),
                    Err(err) => println!("FAIL  {} ({})", health.url, err),
                }
            }
        }
        Commands::Events => {
            let contract = MemebaseContract::new(config.contract_address)?;
            for kind in EventKind::ALL {
                let topic = contract
                    .topic(kind)
                    .map(|t| format!("{:#x}", t))
                    .unwrap_or_default();
                println!("{}  {}", kind.menu_label(), topic);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
