//! # Harvest SDK
//!
//! Resilient client for the StakeKit / Yield.xyz yield API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harvest_sdk::{CatalogConfig, CatalogService, SdkResult, StakeKitClient};
//!
//! #[tokio::main]
//! async fn main() -> SdkResult<()> {
//!     // Build client
//!     let client = StakeKitClient::builder()
//!         .api_key("your-stakekit-key")
//!         .build()?;
//!
//!     // Cached catalog over the client
//!     let catalog = CatalogService::new(client, CatalogConfig::default());
//!
//!     let networks = catalog.networks().await?;
//!     println!("{} networks from the {} host", networks.items.len(), networks.source);
//!
//!     let yields = catalog.yields_for_network("ethereum").await?;
//!     println!("Found {} ethereum yields", yields.len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

// Re-export main client
pub use catalog::{CatalogConfig, CatalogService};
pub use client::{StakeKitClient, StakeKitClientBuilder};
pub use config::{ClientConfig, RetryConfig};
pub use error::{SdkError, SdkResult};
pub use transport::{HttpTransport, UpstreamRequest, UpstreamResponse};

// Re-export core types for convenience
pub use harvest_core::types::{
    CachedList, Network, PageMeta, Protocol, Source, Token, TokenRef, Yield, YieldPage,
};
