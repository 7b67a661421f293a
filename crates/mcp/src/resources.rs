//! MCP resources: URI-addressed, cached views over the catalog.
//!
//! | URI                        | Format   | TTL    |
//! |----------------------------|----------|--------|
//! | `yield://{yieldId}`        | JSON     | 5 min  |
//! | `network://{networkId}`    | Markdown | 10 min |
//! | `token://{tokenId}`        | JSON     | 10 min |
//! | `protocol://{protocolId}`  | JSON     | 15 min |
//! | `networks://all`           | JSON     | 30 min |
//!
//! Rendered text is cached per identifier, so a hit skips every upstream call.

use crate::protocol::{ReadResourceResult, Resource, ResourceContents, ResourceTemplate};
use anyhow::Result;
use chrono::Utc;
use harvest_core::analytics::{peer_stats, percentile};
use harvest_core::cache::TtlCache;
use harvest_core::error::ToolError;
use harvest_core::types::{Network, Yield};
use harvest_sdk::CatalogService;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const JSON_MIME: &str = "application/json";
const MARKDOWN_MIME: &str = "text/markdown";
const NETWORK_TOP_YIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Yield,
    Network,
    Token,
    Protocol,
    AllNetworks,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Yield,
        ResourceKind::Network,
        ResourceKind::Token,
        ResourceKind::Protocol,
        ResourceKind::AllNetworks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Yield => "yield-detail",
            Self::Network => "network-detail",
            Self::Token => "token-detail",
            Self::Protocol => "protocol-detail",
            Self::AllNetworks => "networks-overview",
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Self::Yield => "yield",
            Self::Network => "network",
            Self::Token => "token",
            Self::Protocol => "protocol",
            Self::AllNetworks => "networks",
        }
    }

    pub fn uri_template(self) -> &'static str {
        match self {
            Self::Yield => "yield://{yieldId}",
            Self::Network => "network://{networkId}",
            Self::Token => "token://{tokenId}",
            Self::Protocol => "protocol://{protocolId}",
            Self::AllNetworks => "networks://all",
        }
    }

    pub fn ttl(self) -> Duration {
        let minutes = match self {
            Self::Yield => 5,
            Self::Network | Self::Token => 10,
            Self::Protocol => 15,
            Self::AllNetworks => 30,
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Network => MARKDOWN_MIME,
            _ => JSON_MIME,
        }
    }

    fn description(self) -> String {
        format!("Dynamic resource for {}", self.name())
    }
}

/// Split a resource URI into its kind and identifier.
pub fn parse_resource_uri(uri: &str) -> Result<(ResourceKind, String), ToolError> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| ToolError::validation(format!("Invalid resource URI {}", uri)))?;
    let kind = ResourceKind::ALL
        .into_iter()
        .find(|kind| kind.scheme() == scheme)
        .ok_or_else(|| ToolError::not_found(format!("Resource {} not found.", uri)))?;

    let identifier = rest.trim_end_matches('/');
    if identifier.is_empty() {
        return Err(ToolError::validation(format!(
            "Resource URI {} is missing an identifier",
            uri
        )));
    }
    if kind == ResourceKind::AllNetworks && identifier != "all" {
        return Err(ToolError::not_found(format!("Resource {} not found.", uri)));
    }
    Ok((kind, identifier.to_string()))
}

/// Resource registry with one cache per resource kind
pub struct ResourceRegistry {
    catalog: Arc<CatalogService>,
    caches: Vec<(ResourceKind, TtlCache<String>)>,
}

impl ResourceRegistry {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        let caches = ResourceKind::ALL
            .into_iter()
            .map(|kind| (kind, TtlCache::new(kind.ttl())))
            .collect();
        Self { catalog, caches }
    }

    fn cache(&self, kind: ResourceKind) -> Option<&TtlCache<String>> {
        self.caches
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, cache)| cache)
    }

    /// Concrete resources; only the overview has a fixed URI.
    pub fn list_resources(&self) -> Vec<Resource> {
        let kind = ResourceKind::AllNetworks;
        vec![Resource {
            uri: kind.uri_template().to_string(),
            name: kind.name().to_string(),
            description: Some(kind.description()),
            mime_type: kind.mime_type().to_string(),
        }]
    }

    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| ResourceTemplate {
                uri_template: kind.uri_template().to_string(),
                name: kind.name().to_string(),
                description: Some(kind.description()),
                mime_type: kind.mime_type().to_string(),
            })
            .collect()
    }

    /// Read a resource, serving cached text when fresh.
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        let (kind, identifier) = parse_resource_uri(uri)?;
        let cache = self.cache(kind);

        let text = match cache.and_then(|c| c.get(&identifier)) {
            Some(text) => {
                debug!(uri, "Resource cache hit");
                text
            }
            None => {
                let text = self.render(kind, &identifier).await?;
                if let Some(cache) = cache {
                    cache.set(identifier, text.clone(), None);
                }
                text
            }
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: kind.mime_type().to_string(),
                text,
            }],
        })
    }

    async fn render(&self, kind: ResourceKind, identifier: &str) -> Result<String> {
        let payload = match kind {
            ResourceKind::Network => return self.network_markdown(identifier).await,
            ResourceKind::Yield => self.yield_resource(identifier).await?,
            ResourceKind::Token => self.token_resource(identifier).await?,
            ResourceKind::Protocol => self.protocol_resource(identifier).await?,
            ResourceKind::AllNetworks => self.all_networks_resource().await?,
        };
        Ok(serde_json::to_string_pretty(&payload)?)
    }

    async fn yield_resource(&self, yield_id: &str) -> Result<Value> {
        let yields = self.catalog.yields().await?;
        let entry = yields
            .items
            .iter()
            .find(|entry| entry.id == yield_id)
            .ok_or_else(|| ToolError::not_found(format!("Yield {} not found.", yield_id)))?;

        let peers = match entry.primary_network() {
            Some(network) => self.catalog.yields_for_network(network).await?,
            None => Vec::new(),
        };
        let stats = peer_stats(&peers);
        let metadata = entry.metadata.as_ref();

        Ok(json!({
            "id": entry.id,
            "name": entry.display_name(),
            "network": entry.primary_network(),
            "type": entry.kind(),
            "apy": entry.apy(),
            "tvlUsd": entry.tvl_usd(),
            "description": metadata.and_then(|m| m.description.as_ref()),
            "provider": metadata.and_then(|m| m.provider.as_ref()),
            "lifecycle": entry.lifecycle,
            "risk": {
                "level": entry.risk_level(),
                "warnings": metadata.and_then(|m| m.warnings.as_ref()),
            },
            "peerAnalysis": {
                "networkMedianApy": stats.median,
                "percentile": percentile(entry.apy(), &stats.peers),
            },
        }))
    }

    async fn network_markdown(&self, network_id: &str) -> Result<String> {
        let networks = self.catalog.networks().await?;
        let network = networks
            .items
            .iter()
            .find(|n| n.id == network_id)
            .ok_or_else(|| ToolError::not_found(format!("Network {} not found.", network_id)))?;
        let yields = self.catalog.yields_for_network(network_id).await?;
        Ok(render_network_markdown(network, &yields))
    }

    async fn token_resource(&self, token_id: &str) -> Result<Value> {
        let tokens = self.catalog.tokens().await?;
        let token = tokens
            .items
            .iter()
            .find(|t| t.id.as_deref() == Some(token_id) || t.symbol == token_id)
            .ok_or_else(|| ToolError::not_found(format!("Token {} not found.", token_id)))?;
        let yields = self.catalog.yields_for_token(&token.symbol).await?;

        let related: Vec<Value> = yields
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "name": entry.display_name(),
                    "network": entry.primary_network(),
                    "apy": entry.apy(),
                    "type": entry.kind(),
                })
            })
            .collect();

        Ok(json!({
            "token": {
                "id": token.id,
                "symbol": token.symbol,
                "name": token.name,
                "description": token.description,
                "decimals": token.decimals,
                "networks": token.networks,
                "priceUsd": token.price_usd,
                "tags": token.tags,
            },
            "yields": related,
        }))
    }

    async fn protocol_resource(&self, protocol_id: &str) -> Result<Value> {
        let protocols = self.catalog.protocols().await?;
        let protocol = protocols
            .items
            .iter()
            .find(|p| p.id == protocol_id)
            .ok_or_else(|| ToolError::not_found(format!("Protocol {} not found.", protocol_id)))?;
        let yields = self.catalog.yields_for_protocol(protocol).await?;
        let stats = peer_stats(&yields);

        let related: Vec<Value> = yields
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "name": entry.display_name(),
                    "apy": entry.apy(),
                    "tvlUsd": entry.tvl_usd(),
                    "type": entry.kind(),
                })
            })
            .collect();

        Ok(json!({
            "protocol": {
                "id": protocol.id,
                "name": protocol.name,
                "description": protocol.description,
                "website": protocol.website,
                "category": protocol.category,
                "networks": protocol.networks,
                "audits": protocol.audits,
                "riskFactors": protocol.risk_factors,
            },
            "yields": related,
            "stats": {
                "networkMedianApy": stats.median,
                "yieldCount": yields.len(),
            },
        }))
    }

    async fn all_networks_resource(&self) -> Result<Value> {
        let networks = self.catalog.networks().await?;
        let yields = self.catalog.yields().await?;

        Ok(json!({
            "generatedAt": Utc::now().to_rfc3339(),
            "categories": group_networks(&networks.items, &yields.items),
            "references": {
                "tools": ["list-supported-chains", "get-yields-by-network"],
                "resources": ["network://{networkId}", "yield://{yieldId}"],
            },
        }))
    }

    /// Drop all cached resource text.
    pub fn clear(&self) {
        for (_, cache) in &self.caches {
            cache.clear(None);
        }
    }
}

/// Networks grouped by category in first-seen order, each with its yield count.
fn group_networks(networks: &[Network], yields: &[Yield]) -> Vec<Value> {
    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();

    for network in networks {
        let category = network.category.clone().unwrap_or_else(|| "unknown".to_string());
        let yield_count = yields
            .iter()
            .filter(|y| y.primary_network().unwrap_or("unknown") == network.id)
            .count();
        let summary = json!({
            "id": network.id,
            "name": network.name,
            "isTestnet": network.is_testnet(),
            "yieldCount": yield_count,
        });

        match groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, members)) => members.push(summary),
            None => groups.push((category, vec![summary])),
        }
    }

    groups
        .into_iter()
        .map(|(category, networks)| json!({ "category": category, "networks": networks }))
        .collect()
}

pub fn render_network_markdown(network: &Network, yields: &[Yield]) -> String {
    let mut top: Vec<&Yield> = yields.iter().collect();
    top.sort_by(|a, b| b.apy().unwrap_or(0.0).total_cmp(&a.apy().unwrap_or(0.0)));
    top.truncate(NETWORK_TOP_YIELDS);

    let explorers = network
        .explorers
        .as_ref()
        .filter(|e| !e.is_empty())
        .map(|e| e.join(", "))
        .unwrap_or_else(|| "N/A".to_string());

    let mut out = format!("# {} Network Overview\n\n", network.name);
    out.push_str(&format!(
        "- **Category:** {}\n",
        network.category.as_deref().unwrap_or("unknown")
    ));
    out.push_str(&format!(
        "- **Testnet:** {}\n",
        if network.is_testnet() { "Yes" } else { "No" }
    ));
    out.push_str(&format!(
        "- **Native Token:** {}\n",
        network
            .native_token
            .as_ref()
            .and_then(|t| t.symbol.as_deref())
            .unwrap_or("N/A")
    ));
    out.push_str(&format!("- **Explorers:** {}\n", explorers));
    out.push_str("| Yield | APY | TVL (USD) | Type |\n| --- | --- | --- | --- |\n");

    if top.is_empty() {
        out.push_str("| No active yields | - | - | - |");
    } else {
        let rows: Vec<String> = top
            .iter()
            .map(|entry| {
                format!(
                    "| {} | {} | {} | {} |",
                    entry.display_name(),
                    format_percent(entry.apy()),
                    format_usd(entry.tvl_usd()),
                    entry.kind()
                )
            })
            .collect();
        out.push_str(&rows.join("\n"));
    }

    if let Some(reason) = &network.deprecation_reason {
        out.push_str(&format!("\n> **Caution:** {}", reason));
    }
    out
}

fn format_percent(apy: Option<f64>) -> String {
    match apy.filter(|v| *v != 0.0) {
        Some(apy) => format!("{:.2}%", apy * 100.0),
        None => "n/a".to_string(),
    }
}

fn format_usd(value: Option<f64>) -> String {
    match value.filter(|v| *v != 0.0 && v.is_finite()) {
        Some(value) => format!("${}", group_thousands(value)),
        None => "n/a".to_string(),
    }
}

/// `1234567.5` → `1,234,567.5`, at most three fraction digits.
fn group_thousands(value: f64) -> String {
    let formatted = format!("{:.3}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}
