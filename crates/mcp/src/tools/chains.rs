// Network, token and protocol tools over the cached catalog

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_boolean, json_schema_integer, json_schema_object, json_schema_string,
    parse_arguments, run_tool, Tool, ToolRegistry,
};
use anyhow::Result;
use harvest_core::analytics::apy_stats;
use harvest_core::error::ToolError;
use harvest_core::types::{Network, Token, Yield};
use harvest_sdk::CatalogService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const CHAIN_NOTABLE_YIELDS: usize = 3;
const TOKEN_TOP_YIELDS: usize = 5;
const MAX_TOKEN_LIMIT: u32 = 200;

/// Tokens merged by upper-cased symbol, in first-seen order
#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub token: Token,
    pub networks: Vec<String>,
}

/// Merge tokens sharing a symbol, keeping only networks accepted by `allowed`.
///
/// Later duplicates contribute networks and override price and decimals when
/// they carry them.
pub fn build_token_map(tokens: &[Token], allowed: Option<&HashSet<String>>) -> Vec<TokenEntry> {
    let mut entries: Vec<TokenEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for token in tokens {
        let networks = token
            .networks
            .iter()
            .flatten()
            .filter(|network| !network.is_empty())
            .filter(|network| allowed.map_or(true, |set| set.contains(*network)));

        let key = token.symbol.to_uppercase();
        match index.get(&key) {
            Some(&i) => {
                let entry = &mut entries[i];
                for network in networks {
                    if !entry.networks.contains(network) {
                        entry.networks.push(network.clone());
                    }
                }
                if token.price_usd.is_some() {
                    entry.token.price_usd = token.price_usd;
                }
                if token.decimals.is_some() {
                    entry.token.decimals = token.decimals;
                }
            }
            None => {
                let mut merged: Vec<String> = Vec::new();
                for network in networks {
                    if !merged.contains(network) {
                        merged.push(network.clone());
                    }
                }
                index.insert(key, entries.len());
                entries.push(TokenEntry {
                    token: token.clone(),
                    networks: merged,
                });
            }
        }
    }

    entries
}

/// Short yield description used in chain, token and protocol outputs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefYield {
    pub id: String,
    pub name: String,
    pub network: Option<String>,
    pub apy: Option<f64>,
    pub tvl_usd: Option<f64>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&Yield> for BriefYield {
    fn from(entry: &Yield) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.display_name(),
            network: entry.primary_network().map(str::to_string),
            apy: entry.apy(),
            tvl_usd: entry.tvl_usd(),
            kind: entry.kind().to_string(),
        }
    }
}

/// Positive-APY yields, highest first, at most `n`.
pub fn top_by_apy(yields: &[Yield], n: usize) -> Vec<BriefYield> {
    let mut ranked: Vec<BriefYield> = yields
        .iter()
        .map(BriefYield::from)
        .filter(|entry| entry.apy.unwrap_or(0.0) > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.apy.unwrap_or(0.0).total_cmp(&a.apy.unwrap_or(0.0)));
    ranked.truncate(n);
    ranked
}

fn matches_category(category: Option<&str>, wanted: Option<&str>) -> bool {
    match (category, wanted) {
        (Some(category), Some(wanted)) => category.eq_ignore_ascii_case(wanted),
        _ => true,
    }
}

/// List supported networks
pub struct ListSupportedChainsTool {
    catalog: Arc<CatalogService>,
}

impl ListSupportedChainsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainsArgs {
    category: Option<String>,
    #[serde(default)]
    include_testnets: bool,
}

/// Networks that are not deprecated and pass the category and testnet filters.
pub fn filter_networks<'a>(
    networks: &'a [Network],
    category: Option<&str>,
    include_testnets: bool,
) -> Vec<&'a Network> {
    networks
        .iter()
        .filter(|network| !network.is_deprecated())
        .filter(|network| include_testnets || !network.is_testnet())
        .filter(|network| matches_category(network.category.as_deref(), category))
        .collect()
}

#[async_trait::async_trait]
impl Tool for ListSupportedChainsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list-supported-chains".to_string(),
            title: Some("List supported blockchain networks".to_string()),
            description:
                "Returns StakeKit-supported networks with optional category and testnet filters."
                    .to_string(),
            input_schema: json_schema_object(
                json!({
                    "category": json_schema_string("Network category, e.g. evm"),
                    "includeTestnets": json_schema_boolean("Include testnets (default false)")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("list-supported-chains", async {
            let args: ChainsArgs = parse_arguments(arguments, "list-supported-chains")?;
            let networks = self.catalog.networks().await?;

            let filtered = filter_networks(
                &networks.items,
                args.category.as_deref(),
                args.include_testnets,
            );
            let deprecated = networks.items.iter().filter(|n| n.is_deprecated()).count();
            let mainnets = filtered.iter().filter(|n| !n.is_testnet()).count();

            let items: Vec<Value> = filtered
                .iter()
                .map(|network| {
                    json!({
                        "id": network.id,
                        "name": network.name,
                        "category": network.category,
                        "isTestnet": network.is_testnet(),
                        "logoUrl": network.logo,
                        "nativeToken": network.native_token.as_ref().and_then(|t| t.symbol.as_ref()),
                        "explorerUrl": network.explorers.as_ref().and_then(|e| e.first()),
                        "deprecationReason": network.deprecation_reason,
                    })
                })
                .collect();

            Ok(json!({
                "items": items,
                "summary": {
                    "total": filtered.len(),
                    "mainnets": mainnets,
                    "testnets": filtered.len() - mainnets,
                    "fetchedAt": networks.fetched_at,
                    "deprecatedCount": deprecated,
                },
                "source": networks.source,
            }))
        })
        .await
    }
}

/// Network details with its best yields
pub struct GetChainDetailsTool {
    catalog: Arc<CatalogService>,
}

impl GetChainDetailsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainDetailsArgs {
    network_id: String,
}

#[async_trait::async_trait]
impl Tool for GetChainDetailsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-chain-details".to_string(),
            title: Some("Get network details".to_string()),
            description: "Fetches detailed metadata for a network including top yields.".to_string(),
            input_schema: json_schema_object(
                json!({ "networkId": json_schema_string("Network identifier") }),
                vec!["networkId"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-chain-details", async {
            let args: ChainDetailsArgs = parse_arguments(arguments, "get-chain-details")?;
            let networks = self.catalog.networks().await?;
            let network = networks
                .items
                .iter()
                .find(|n| n.id == args.network_id)
                .ok_or_else(|| {
                    ToolError::not_found(format!(
                        "Network {} was not found. Call list-supported-chains for valid identifiers.",
                        args.network_id
                    ))
                })?;

            let yields = self.catalog.yields_for_network(&args.network_id).await?;

            Ok(json!({
                "network": {
                    "id": network.id,
                    "name": network.name,
                    "category": network.category,
                    "isTestnet": network.is_testnet(),
                    "deprecationReason": network.deprecation_reason,
                    "nativeToken": network.native_token,
                    "explorers": network.explorers,
                    "blockTime": network.block_time,
                    "finality": network.finality,
                    "gasToken": network.gas_token,
                    "fetchedAt": networks.fetched_at,
                },
                "notableYields": top_by_apy(&yields, CHAIN_NOTABLE_YIELDS),
                "source": networks.source,
            }))
        })
        .await
    }
}

/// List tokens merged by symbol
pub struct ListSupportedTokensTool {
    catalog: Arc<CatalogService>,
}

impl ListSupportedTokensTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensArgs {
    network_id: Option<String>,
    symbol: Option<String>,
    limit: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for ListSupportedTokensTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list-supported-tokens".to_string(),
            title: Some("List supported tokens".to_string()),
            description: "Lists StakeKit token coverage with deduplicated network associations."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "networkId": json_schema_string("Only tokens available on this network"),
                    "symbol": json_schema_string("Case-insensitive symbol substring"),
                    "limit": json_schema_integer("Maximum tokens to return", 1, Some(MAX_TOKEN_LIMIT as i64))
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("list-supported-tokens", async {
            let args: TokensArgs = parse_arguments(arguments, "list-supported-tokens")?;
            if let Some(limit) = args.limit {
                if !(1..=MAX_TOKEN_LIMIT).contains(&limit) {
                    return Err(ToolError::validation(format!(
                        "limit must be between 1 and {}",
                        MAX_TOKEN_LIMIT
                    ))
                    .into());
                }
            }

            let (networks, tokens) =
                futures::try_join!(self.catalog.networks(), self.catalog.tokens())?;
            let active: HashSet<String> = networks
                .items
                .iter()
                .filter(|n| !n.is_deprecated())
                .map(|n| n.id.clone())
                .collect();

            let symbol = args.symbol.as_ref().map(|s| s.to_lowercase());
            let entries: Vec<TokenEntry> = build_token_map(&tokens.items, Some(&active))
                .into_iter()
                .filter(|entry| match &args.network_id {
                    Some(network) => entry.networks.contains(network),
                    None => true,
                })
                .filter(|entry| match &symbol {
                    Some(symbol) => entry.token.symbol.to_lowercase().contains(symbol.as_str()),
                    None => true,
                })
                .collect();

            let total = entries.len();
            let limit = args.limit.map_or(total, |l| l as usize);
            let items: Vec<Value> = entries
                .iter()
                .take(limit)
                .map(|entry| {
                    json!({
                        "symbol": entry.token.symbol,
                        "name": entry.token.name,
                        "networks": entry.networks,
                        "decimals": entry.token.decimals,
                        "priceUsd": entry.token.price_usd,
                        "tags": entry.token.tags,
                    })
                })
                .collect();

            Ok(json!({
                "items": items,
                "summary": {
                    "total": total,
                    "fetchedAt": tokens.fetched_at,
                },
                "source": tokens.source,
            }))
        })
        .await
    }
}

/// Token metadata with its best yields
pub struct GetTokenDetailsTool {
    catalog: Arc<CatalogService>,
}

impl GetTokenDetailsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenDetailsArgs {
    token_id: Option<String>,
    symbol: Option<String>,
    network_id: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetTokenDetailsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-token-details".to_string(),
            title: Some("Get token details".to_string()),
            description: "Provides metadata and leading yields for a token.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "tokenId": json_schema_string("Token identifier (exclusive with symbol)"),
                    "symbol": json_schema_string("Token symbol (exclusive with tokenId)"),
                    "networkId": json_schema_string("Restrict a symbol lookup to one network")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-token-details", async {
            let args: TokenDetailsArgs = parse_arguments(arguments, "get-token-details")?;
            let token_id = args.token_id.filter(|s| !s.is_empty());
            let symbol = args.symbol.filter(|s| !s.is_empty());
            if token_id.is_some() == symbol.is_some() {
                return Err(ToolError::validation(
                    "Provide either tokenId or symbol, but not both.",
                )
                .into());
            }

            let tokens = self.catalog.tokens().await?;
            let entries = build_token_map(&tokens.items, None);
            let found = entries.into_iter().find(|entry| match (&token_id, &symbol) {
                (Some(id), _) => entry.token.id.as_deref() == Some(id.as_str()),
                (None, Some(symbol)) => {
                    entry.token.symbol.eq_ignore_ascii_case(symbol)
                        && args
                            .network_id
                            .as_ref()
                            .map_or(true, |network| entry.networks.contains(network))
                }
                (None, None) => false,
            });
            let entry = found.ok_or_else(|| {
                ToolError::not_found(
                    "Token not found. Use list-supported-tokens to explore available symbols.",
                )
            })?;

            let yields = self.catalog.yields_for_token(&entry.token.symbol).await?;
            let token = &entry.token;

            Ok(json!({
                "token": {
                    "id": token.id,
                    "symbol": token.symbol,
                    "name": token.name,
                    "description": token.description,
                    "decimals": token.decimals,
                    "networks": entry.networks,
                    "priceUsd": token.price_usd,
                    "tags": token.tags,
                    "fetchedAt": tokens.fetched_at,
                },
                "supportedYields": top_by_apy(&yields, TOKEN_TOP_YIELDS),
                "source": tokens.source,
            }))
        })
        .await
    }
}

/// List protocols with yield counts
pub struct ListProtocolsTool {
    catalog: Arc<CatalogService>,
}

impl ListProtocolsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
struct ProtocolsArgs {
    category: Option<String>,
    chain: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ListProtocolsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list-protocols".to_string(),
            title: Some("List supported DeFi protocols".to_string()),
            description: "Returns protocols with derived network and yield metrics.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "category": json_schema_string("Protocol category"),
                    "chain": json_schema_string("Only protocols deployed on this network")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("list-protocols", async {
            let args: ProtocolsArgs = parse_arguments(arguments, "list-protocols")?;
            let protocols = self.catalog.protocols().await?;
            let yields = self.catalog.yields().await?;

            let items: Vec<Value> = protocols
                .items
                .iter()
                .filter(|p| matches_category(p.category.as_deref(), args.category.as_deref()))
                .filter(|p| match (&args.chain, &p.networks) {
                    (Some(chain), Some(networks)) => networks.contains(chain),
                    _ => true,
                })
                .map(|protocol| {
                    let yield_count = yields.items.iter().filter(|y| protocol.owns(y)).count();
                    json!({
                        "id": protocol.id,
                        "name": protocol.name,
                        "category": protocol.category,
                        "networks": protocol.networks,
                        "tvlUsd": protocol.tvl_usd,
                        "website": protocol.website,
                        "description": protocol.description,
                        "primaryChain": protocol.networks.as_ref().and_then(|n| n.first()),
                        "yieldCount": yield_count,
                        "fetchedAt": protocols.fetched_at,
                    })
                })
                .collect();

            Ok(json!({
                "summary": {
                    "total": items.len(),
                    "fetchedAt": protocols.fetched_at,
                },
                "items": items,
                "source": protocols.source,
            }))
        })
        .await
    }
}

/// Protocol metadata with aggregate yield metrics
pub struct GetProtocolDetailsTool {
    catalog: Arc<CatalogService>,
}

impl GetProtocolDetailsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolDetailsArgs {
    protocol_id: String,
}

#[async_trait::async_trait]
impl Tool for GetProtocolDetailsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-protocol-details".to_string(),
            title: Some("Get protocol details".to_string()),
            description: "Provides metadata, audits, and aggregate yield metrics for a protocol."
                .to_string(),
            input_schema: json_schema_object(
                json!({ "protocolId": json_schema_string("Protocol identifier") }),
                vec!["protocolId"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-protocol-details", async {
            let args: ProtocolDetailsArgs = parse_arguments(arguments, "get-protocol-details")?;
            let protocols = self.catalog.protocols().await?;
            let protocol = protocols
                .items
                .iter()
                .find(|p| p.id == args.protocol_id)
                .ok_or_else(|| {
                    ToolError::not_found(
                        "Protocol not found. Use list-protocols to explore available integrations.",
                    )
                })?;

            let related = self.catalog.yields_for_protocol(protocol).await?;
            let stats = apy_stats(&related);
            let summaries: Vec<BriefYield> = related.iter().map(BriefYield::from).collect();

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
                    "fetchedAt": protocols.fetched_at,
                },
                "yields": summaries,
                "stats": {
                    "yieldCount": related.len(),
                    "minApy": stats.min,
                    "maxApy": stats.max,
                    "medianApy": stats.median,
                },
                "source": protocols.source,
            }))
        })
        .await
    }
}

/// Register every network, token and protocol tool.
pub fn register_chain_tools(registry: &mut ToolRegistry, catalog: Arc<CatalogService>) {
    registry.register(Arc::new(ListSupportedChainsTool::new(catalog.clone())));
    registry.register(Arc::new(GetChainDetailsTool::new(catalog.clone())));
    registry.register(Arc::new(ListSupportedTokensTool::new(catalog.clone())));
    registry.register(Arc::new(GetTokenDetailsTool::new(catalog.clone())));
    registry.register(Arc::new(ListProtocolsTool::new(catalog.clone())));
    registry.register(Arc::new(GetProtocolDetailsTool::new(catalog)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(symbol: &str, networks: &[&str], price: Option<f64>) -> Token {
        Token {
            symbol: symbol.to_string(),
            networks: Some(networks.iter().map(|n| n.to_string()).collect()),
            price_usd: price,
            ..Default::default()
        }
    }

    fn network(id: &str, testnet: bool, deprecated: bool, category: &str) -> Network {
        Network {
            id: id.to_string(),
            name: id.to_string(),
            category: Some(category.to_string()),
            is_testnet: Some(testnet),
            deprecated: Some(deprecated),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_map_merges_by_symbol() {
        let tokens = vec![
            token("usdc", &["ethereum"], Some(1.0)),
            token("ETH", &["ethereum", "base"], None),
            token("USDC", &["polygon", "ethereum", "fantom"], Some(0.999)),
        ];
        let allowed: HashSet<String> = ["ethereum", "polygon", "base"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let entries = build_token_map(&tokens, Some(&allowed));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].token.symbol, "usdc");
        assert_eq!(entries[0].networks, vec!["ethereum", "polygon"]);
        assert_eq!(entries[0].token.price_usd, Some(0.999));
        assert_eq!(entries[1].networks, vec!["ethereum", "base"]);
    }

    #[test]
    fn test_filter_networks() {
        let networks = vec![
            network("ethereum", false, false, "evm"),
            network("goerli", true, false, "evm"),
            network("terra", false, true, "cosmos"),
            network("cosmos", false, false, "cosmos"),
        ];

        let ids = |list: Vec<&Network>| list.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(filter_networks(&networks, None, false)), vec!["ethereum", "cosmos"]);
        assert_eq!(
            ids(filter_networks(&networks, Some("EVM"), true)),
            vec!["ethereum", "goerli"]
        );
    }

    #[test]
    fn test_top_by_apy() {
        let yields: Vec<Yield> = [("a", 0.02), ("b", 0.0), ("c", 0.09), ("d", 0.05)]
            .iter()
            .map(|(id, apy)| Yield {
                id: id.to_string(),
                apy: Some(*apy),
                ..Default::default()
            })
            .collect();

        let top = top_by_apy(&yields, 2);
        let ids: Vec<_> = top.iter().map(|y| y.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }
}
