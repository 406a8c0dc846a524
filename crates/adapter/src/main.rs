//! openapi-mcp-adapter: serve an OpenAPI document as MCP tools.
//!
//! # Usage
//!
//! ```bash
//! # Dump the compiled catalog and exit
//! openapi-mcp-adapter --spec ./petstore.yaml --print-tools
//!
//! # Run with a config file and live reload
//! OPENAPI_MCP_CONFIG=adapter.yaml openapi-mcp-adapter --log-format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use openapi_mcp_adapter::{AdapterConfig, App};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "openapi-mcp-adapter", version, about)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, env = "OPENAPI_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// OpenAPI document location; overrides `openApiUrl` from the config file.
    #[arg(long, env = "OPENAPI_MCP_SPEC")]
    spec: Option<String>,

    /// Print the compiled tool catalog as JSON and exit.
    #[arg(long)]
    print_tools: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new("openapi_mcp_adapter=info,openapi_mcp_tools=info,openapi_mcp_http_tools=info")
    })?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("Failed to initialise tracing")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = AdapterConfig::load(cli.config.as_deref(), cli.spec.as_deref())
        .context("Failed to load configuration")?;
    tracing::info!(spec = %config.engine.open_api_url, "Starting openapi-mcp adapter");

    let app = App::build(config)
        .await
        .context("Failed to build the tool catalog")?;
    if let Some(scopes) = app.scopes() {
        tracing::info!(scopes = ?scopes, "Required scopes");
    }

    if cli.print_tools {
        let catalog = serde_json::to_string_pretty(&app.catalog_json())
            .context("Failed to serialize the tool catalog")?;
        println!("{catalog}");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let scheduler = app
        .start_live_reload(&cancel)
        .context("Failed to start live reload")?;

    tracing::info!("Ready; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    cancel.cancel();
    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        tracing::warn!("Live reload scheduler ended abnormally: {e}");
    }
    Ok(())
}
