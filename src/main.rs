//! `retrieval-engine` — binary entry point (§10.4).
//!
//! Reads configuration from environment variables (optionally overlaid
//! from a YAML file), wires the six components together, and either starts
//! the HTTP server or runs a one-shot maintenance command.

use std::sync::Arc;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use colored::Colorize;

use retrieval_types::config::EngineConfig;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "retrieval-engine")]
#[command(author = "retrieval-engine")]
#[command(version)]
#[command(about = "Multi-agent legal provision retrieval engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to an optional YAML config file overlaying defaults (§10.3).
    #[arg(long, global = true, env = "RETRIEVAL_CONFIG_PATH")]
    config: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (`/search`, `/search/stream`, `/healthz`).
    Serve {
        #[arg(long, env = "RETRIEVAL_BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind_addr: String,
    },
    /// Run domain bootstrap once against a live graph store, then exit.
    Bootstrap,
    /// Trigger one split/merge rebalance pass, then exit.
    Rebalance,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,retrieval_engine=debug".into()),
        )
        .init();
}

#[cfg(feature = "database")]
async fn build_components(
    config: EngineConfig,
) -> anyhow::Result<(Arc<graph_store::postgres::PgGraphStore>, Arc<embedding_gateway::http::HttpEmbeddingGateway>, Arc<domain_registry::DomainRegistry<graph_store::postgres::PgGraphStore, embedding_gateway::http::HttpEmbeddingGateway>>)> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    tracing::info!("connected to database");

    let node_endpoint = std::env::var("RETRIEVAL_NODE_EMBED_URL").unwrap_or_else(|_| "http://localhost:8081/embed/node".into());
    let relation_endpoint = std::env::var("RETRIEVAL_RELATION_EMBED_URL").unwrap_or_else(|_| "http://localhost:8081/embed/relation".into());
    let llm_api_key = std::env::var("RETRIEVAL_LLM_API_KEY").unwrap_or_default();

    let retry_max = config.retry_max;
    let store = Arc::new(graph_store::postgres::PgGraphStore::new(pool, retry_max));
    let gateway = Arc::new(embedding_gateway::http::HttpEmbeddingGateway::new(node_endpoint, relation_endpoint, llm_api_key));
    let registry = Arc::new(domain_registry::DomainRegistry::new(store.clone(), gateway.clone(), config));

    Ok((store, gateway, registry))
}

#[cfg(all(feature = "server", feature = "cli"))]
async fn serve(config: EngineConfig, bind_addr: String) -> anyhow::Result<()> {
    let (store, gateway, registry) = build_components(config.clone()).await?;
    registry.bootstrap().await?;

    let orchestrator = Arc::new(orchestrator::Orchestrator::new(store, gateway, registry, config));
    let state = retrieval_web::AppState { orchestrator };
    let app = retrieval_web::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "retrieval-engine listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(all(feature = "cli", not(feature = "database")))]
fn main() -> std::process::ExitCode {
    eprintln!("{}: the `database` feature is required to run retrieval-engine", "error".red().bold());
    std::process::ExitCode::FAILURE
}

#[cfg(all(feature = "cli", feature = "database"))]
fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_file_or_default(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("{}: {e}", "config error".red().bold());
        std::process::exit(1);
    });

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    let result = rt.block_on(async {
        match cli.command {
            #[cfg(feature = "server")]
            Command::Serve { bind_addr } => serve(config, bind_addr).await,
            #[cfg(not(feature = "server"))]
            Command::Serve { .. } => anyhow::bail!("binary was built without the `server` feature"),
            Command::Bootstrap => {
                let (_, _, registry) = build_components(config).await?;
                registry.bootstrap().await?;
                println!("{}", "bootstrap complete".green());
                Ok(())
            }
            Command::Rebalance => {
                let (_, _, registry) = build_components(config).await?;
                registry.bootstrap().await?;
                registry.rebalance().await?;
                println!("{}", "rebalance complete".green());
                Ok(())
            }
        }
    });

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("retrieval-engine was built without the `cli` feature; nothing to run");
}
