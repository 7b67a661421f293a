use anyhow::{Context, Result};
use harvest_mcp::config::AppConfig;
use harvest_mcp::server::ServerComponents;
use harvest_mcp::session::{SessionConfig, SessionRegistry};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub app: AppConfig,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let app = AppConfig::load(config_path).context("Failed to load configuration")?;

        Ok(Self {
            app,
            session: SessionConfig::default(),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let catalog = Arc::new(
            config
                .app
                .catalog_service()
                .context("Failed to build StakeKit client")?,
        );
        let components = ServerComponents::for_catalog(catalog);
        let registry = SessionRegistry::streamable_http(components, config.session.clone());

        Ok(Self { registry })
    }
}
