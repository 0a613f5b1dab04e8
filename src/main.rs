//! Conversational RAG server entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use conversational_rag::api::{create_router, AppState};
use conversational_rag::chain;
use conversational_rag::config::{AppMetadata, Config};
use conversational_rag::metrics;
use conversational_rag::runnable::{RouteOptions, Runnable, RunnableConfig};
use conversational_rag::telemetry::{self, TelemetryGuard};
use conversational_rag::utils::shutdown_signal;

/// Conversational RAG chain server.
#[derive(Parser, Debug)]
#[command(name = "conversational-rag")]
#[command(about = "Serve a conversational retrieval-augmented-generation chain over HTTP")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Ask the chain a single question from the terminal.
    Ask {
        /// The question to answer.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging; span export stops when the guard drops
    let _telemetry = init_tracing(args.verbose, &config)?;

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(&config),
        Some(Command::Ask { question }) => cmd_ask(&config, question).await,
        Some(Command::Serve { port }) => cmd_serve(config, port).await,
        None => cmd_serve(config, None).await,
    }
}

fn init_tracing(verbose: bool, config: &Config) -> anyhow::Result<Option<TelemetryGuard>> {
    let guard = telemetry::init(config.otel_enabled).context("failed to start span export")?;

    let filter = if verbose {
        EnvFilter::new("conversational_rag=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if config.log_json {
        tracing_subscriber::registry()
            .with(telemetry::layer(config.otel_enabled))
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(telemetry::layer(config.otel_enabled))
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    Ok(guard)
}

/// Check configuration validity.
fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    let metadata = AppMetadata::CURRENT;

    println!("======================================================================");
    println!("{} {} - CONFIGURATION CHECK", metadata.title.to_uppercase(), metadata.version);
    println!("======================================================================");

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Bind Address: {}", config.bind_addr());
    println!(
        "  Proxy Prefix: {}",
        if config.proxy_prefix().is_empty() { "(none)" } else { config.proxy_prefix() }
    );
    println!("  Model Endpoint: {}", config.llm_base_url);
    println!("  Model: {}", config.llm_model);
    println!(
        "  API Key: {}",
        if config.nvidia_api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            "present"
        } else {
            "missing"
        }
    );
    println!("  Temperature: {}", config.llm_temperature);
    println!("  Max Tokens: {}", config.llm_max_tokens);
    println!("  Documents: {}", config.docs_dir.as_deref().unwrap_or("(none)"));
    println!("  Retriever Top K: {}", config.retriever_top_k);
    println!("  Batch Concurrency: {}", config.max_concurrency);
    println!("  Span Export: {}", if config.otel_enabled { "OTLP" } else { "off" });
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Ask the chain a single question.
async fn cmd_ask(config: &Config, question: String) -> anyhow::Result<()> {
    let rag_chain = chain::from_config(config).await?;
    let answer = rag_chain
        .invoke(
            serde_json::json!({ "question": question }),
            &RunnableConfig::default(),
        )
        .await?;

    match answer.as_str() {
        Some(text) => println!("{}", text),
        None => println!("{}", answer),
    }

    Ok(())
}

/// Run the HTTP server.
async fn cmd_serve(mut config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    // Override with CLI args if provided
    if let Some(port) = port_override {
        config.port = port;
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let metadata = AppMetadata::CURRENT;
    info!("Starting {} v{}", metadata.title, metadata.version);
    info!("Model: {} via {}", config.llm_model, config.llm_base_url);
    if config.proxy_prefix().is_empty() {
        info!("Serving without a proxy prefix");
    } else {
        info!("Serving behind proxy prefix {}", config.proxy_prefix());
    }

    // Initialize metrics
    let metrics_handle = metrics::init_metrics().context("failed to install metrics recorder")?;
    let upkeep_handle = metrics_handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            upkeep_handle.run_upkeep();
        }
    });

    let rag_chain = Arc::new(chain::from_config(&config).await?);

    // Create app state
    let app_state = AppState::new(config.proxy_prefix(), metrics_handle);
    let options = RouteOptions::default().max_concurrency(config.max_concurrency);
    let router = create_router(app_state, rag_chain, options);

    // Start HTTP server
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
