// Standalone MCP server binary (stdio transport)

use anyhow::{Context, Result};
use harvest_mcp::config::{AppConfig, DEFAULT_CONFIG_FILE};
use harvest_mcp::server::ServerComponents;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("HARVEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let config = AppConfig::load(&config_path)?;

    // stdout carries the protocol, so logs go to stderr as JSON
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .with_target(false)
        .init();

    tracing::info!(transport = "stdio", "Harvest MCP server starting");

    let catalog = Arc::new(
        config
            .catalog_service()
            .context("Failed to build StakeKit client")?,
    );
    let components = ServerComponents::for_catalog(catalog);
    let server = components.new_server();

    tracing::info!(tools = server.tools().len(), "Registered tools");

    server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await?;

    tracing::info!(transport = "stdio", "Harvest MCP server stopped");
    Ok(())
}
