// Yield discovery tools backed by the StakeKit yields endpoint

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_boolean, json_schema_integer, json_schema_number, json_schema_object,
    json_schema_string, parse_arguments, run_tool, Tool, ToolRegistry,
};
use anyhow::Result;
use chrono::Utc;
use harvest_core::error::ToolError;
use harvest_core::normalize::dedupe_by_id;
use harvest_core::types::{PageMeta, Source, Yield};
use harvest_sdk::api::{YieldListing, YieldQuery};
use harvest_sdk::CatalogService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;
const TOP_YIELDS_FETCH_LIMIT: u32 = 100;
const LONG_WITHDRAWAL_DAYS: f64 = 7.0;

/// Shared pagination arguments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub cursor: Option<String>,
}

impl Pagination {
    fn validate(&self) -> Result<(), ToolError> {
        match self.limit {
            Some(limit) if !(1..=MAX_PAGE_LIMIT).contains(&limit) => Err(ToolError::validation(
                format!("limit must be between 1 and {}", MAX_PAGE_LIMIT),
            )),
            _ => Ok(()),
        }
    }

    /// Query with `limit`, plus `offset`/`page` when an offset is given.
    pub fn to_query(&self) -> YieldQuery {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        YieldQuery {
            limit: Some(limit),
            offset: self.offset,
            page: self.offset.map(|offset| offset / limit + 1),
            cursor: self.cursor.clone(),
            ..Default::default()
        }
    }
}

fn pagination_properties() -> serde_json::Map<String, Value> {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "limit".to_string(),
        json_schema_integer("Page size (default 20)", 1, Some(MAX_PAGE_LIMIT as i64)),
    );
    properties.insert(
        "offset".to_string(),
        json_schema_integer("Number of results to skip", 0, None),
    );
    properties.insert(
        "cursor".to_string(),
        json_schema_string("Opaque cursor from a previous page"),
    );
    properties
}

fn paginated_schema(extra: Value, required: Vec<&str>) -> Value {
    let mut properties = pagination_properties();
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    json_schema_object(Value::Object(properties), required)
}

/// Compact view of a yield for list outputs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldSummary {
    pub id: String,
    pub name: String,
    pub network: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub apy: Option<f64>,
    pub reward_token_symbols: Vec<String>,
    pub tvl_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    pub tags: Vec<String>,
}

impl From<&Yield> for YieldSummary {
    fn from(entry: &Yield) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.display_name(),
            network: entry.network_id().unwrap_or("unknown").to_string(),
            kind: entry.kind().to_string(),
            apy: entry.apy(),
            reward_token_symbols: entry.reward_symbols(),
            tvl_usd: entry.tvl_usd(),
            risk_level: entry.risk_level().map(str::to_string),
            tags: entry.all_tags(),
        }
    }
}

pub fn summarize(items: &[Yield]) -> Vec<YieldSummary> {
    items.iter().map(YieldSummary::from).collect()
}

/// List output shared by the yield tools
#[derive(Debug, Serialize)]
pub struct ListOutput<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
    pub source: Source,
}

/// Warnings about getting funds back out of a yield.
pub fn withdrawal_warnings(entry: &Yield) -> Vec<String> {
    let mut warnings = Vec::new();
    let exit = entry.metadata.as_ref().and_then(|m| m.exit.as_ref());
    let lifecycle = entry.lifecycle.as_ref();

    let supports_exit = lifecycle
        .and_then(|l| l.supports_exit)
        .or_else(|| exit.and_then(|e| e.supports_exit))
        .or_else(|| entry.status.as_ref().and_then(|s| s.exit));
    if supports_exit == Some(false) {
        warnings.push(
            "This yield does not currently support exits. Review liquidity before recommending."
                .to_string(),
        );
    }

    let days = lifecycle
        .and_then(|l| l.withdrawal_period.as_ref())
        .or_else(|| exit.and_then(|e| e.withdrawal_period.as_ref()))
        .and_then(|p| p.days);
    if let Some(days) = days.filter(|d| *d > LONG_WITHDRAWAL_DAYS) {
        warnings.push(format!(
            "Withdrawal period is {} days which exceeds the recommended 7-day threshold.",
            days
        ));
    }

    warnings
}

fn yield_overview(entry: &Yield) -> Value {
    let metadata = entry.metadata.as_ref();
    let lifecycle = entry.lifecycle.as_ref();
    let status = entry.status.as_ref();

    json!({
        "id": entry.id,
        "name": entry.display_name(),
        "network": entry.network_id().unwrap_or("unknown"),
        "type": entry.kind(),
        "description": metadata.and_then(|m| m.description.as_ref()),
        "apy": entry.apy(),
        "apr": entry.apr(),
        "tvlUsd": entry.tvl_usd(),
        "provider": {
            "id": entry.provider_id(),
            "name": entry.provider_name(),
            "website": metadata.and_then(|m| m.provider.as_ref()).and_then(|p| p.website.as_ref()),
        },
        "tokens": {
            "deposit": entry.deposit_token(),
            "rewards": entry.reward_token_refs(),
        },
        "lifecycle": {
            "supportsEnter": lifecycle.and_then(|l| l.supports_enter).or_else(|| status.and_then(|s| s.enter)),
            "supportsExit": lifecycle.and_then(|l| l.supports_exit).or_else(|| status.and_then(|s| s.exit)),
            "warmup": lifecycle.and_then(|l| l.warmup_period.as_ref()),
            "cooldown": lifecycle.and_then(|l| l.cooldown_period.as_ref()),
            "withdrawal": lifecycle.and_then(|l| l.withdrawal_period.as_ref()),
        },
        "rewards": entry.rewards.as_ref().map(|rewards| {
            rewards
                .iter()
                .map(|reward| json!({
                    "symbol": reward.token_symbol.as_ref().or_else(|| reward.token.as_ref().and_then(|t| t.symbol.as_ref())),
                    "apy": reward.apy.or(reward.reward_rate),
                    "type": reward.reward_type,
                }))
                .collect::<Vec<_>>()
        }),
        "fees": metadata.and_then(|m| m.fees.as_ref()),
        "risk": {
            "level": entry.risk_level(),
            "tags": entry.all_tags(),
            "warnings": metadata.and_then(|m| m.warnings.as_ref()),
        },
        "warnings": withdrawal_warnings(entry),
    })
}

async fn fetch_yield_list(catalog: &CatalogService, query: &YieldQuery) -> Result<YieldListing> {
    Ok(catalog.client().yields().list(query).await?)
}

/// List yield opportunities with pagination and filters
pub struct GetYieldOpportunitiesTool {
    catalog: Arc<CatalogService>,
}

impl GetYieldOpportunitiesTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
struct OpportunitiesArgs {
    #[serde(flatten)]
    pagination: Pagination,
    network: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetYieldOpportunitiesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-yield-opportunities".to_string(),
            title: Some("List yield opportunities".to_string()),
            description: "Returns paginated yield opportunities with APY and metadata for discovery."
                .to_string(),
            input_schema: paginated_schema(
                json!({
                    "network": json_schema_string("Network identifier filter"),
                    "type": json_schema_string("Yield type filter (staking, lending, vault, ...)")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-yield-opportunities", async {
            let args: OpportunitiesArgs = parse_arguments(arguments, "get-yield-opportunities")?;
            args.pagination.validate()?;

            let query = YieldQuery {
                network: args.network,
                kind: args.kind,
                ..args.pagination.to_query()
            };
            let listing = fetch_yield_list(&self.catalog, &query).await?;

            Ok(ListOutput {
                items: summarize(&listing.items),
                meta: listing.meta,
                source: listing.source,
            })
        })
        .await
    }
}

/// Detailed view of one yield
pub struct GetYieldDetailsTool {
    catalog: Arc<CatalogService>,
}

impl GetYieldDetailsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsArgs {
    yield_id: String,
}

#[async_trait::async_trait]
impl Tool for GetYieldDetailsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-yield-details".to_string(),
            title: Some("Get yield opportunity details".to_string()),
            description: "Fetches comprehensive information about a specific yield by identifier."
                .to_string(),
            input_schema: json_schema_object(
                json!({ "yieldId": json_schema_string("Yield identifier") }),
                vec!["yieldId"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-yield-details", async {
            let args: DetailsArgs = parse_arguments(arguments, "get-yield-details")?;
            if args.yield_id.is_empty() {
                return Err(ToolError::validation("yieldId is required").into());
            }

            let detail = match self.catalog.client().yields().get(&args.yield_id).await {
                Ok(detail) => detail,
                Err(e) if e.is_not_found() => {
                    return Err(ToolError::not_found(format!(
                        "Yield {} was not found. Verify the identifier using get-yield-opportunities.",
                        args.yield_id
                    ))
                    .into())
                }
                Err(e) => return Err(e.into()),
            };

            Ok(json!({ "overview": yield_overview(&detail.entry) }))
        })
        .await
    }
}

/// Yields on one network
pub struct GetYieldsByNetworkTool {
    catalog: Arc<CatalogService>,
}

impl GetYieldsByNetworkTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkArgs {
    #[serde(flatten)]
    pagination: Pagination,
    network_id: String,
}

#[async_trait::async_trait]
impl Tool for GetYieldsByNetworkTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-yields-by-network".to_string(),
            title: Some("List yields for a specific network".to_string()),
            description: "Filters yield opportunities by blockchain network identifier.".to_string(),
            input_schema: paginated_schema(
                json!({ "networkId": json_schema_string("Network identifier") }),
                vec!["networkId"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-yields-by-network", async {
            let args: NetworkArgs = parse_arguments(arguments, "get-yields-by-network")?;
            args.pagination.validate()?;

            let query = args.pagination.to_query().network(args.network_id.as_str());
            let listing = fetch_yield_list(&self.catalog, &query).await?;
            if listing.items.is_empty() {
                return Err(ToolError::not_found(format!(
                    "No yields found for network {}. Call list-supported-chains to confirm network availability.",
                    args.network_id
                ))
                .with_details(json!({ "networkId": args.network_id }))
                .into());
            }

            Ok(ListOutput {
                items: summarize(&listing.items),
                meta: listing.meta,
                source: listing.source,
            })
        })
        .await
    }
}

/// Yields that accept or reward a token
pub struct GetYieldsByTokenTool {
    catalog: Arc<CatalogService>,
}

impl GetYieldsByTokenTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenArgs {
    #[serde(flatten)]
    pagination: Pagination,
    token_symbol: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenYieldSummary {
    #[serde(flatten)]
    summary: YieldSummary,
    token_match_type: &'static str,
}

#[async_trait::async_trait]
impl Tool for GetYieldsByTokenTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-yields-by-token".to_string(),
            title: Some("List yields supporting a token".to_string()),
            description: "Finds yields that accept or reward a specific token symbol.".to_string(),
            input_schema: paginated_schema(
                json!({ "tokenSymbol": json_schema_string("Token symbol, e.g. ETH") }),
                vec!["tokenSymbol"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-yields-by-token", async {
            let args: TokenArgs = parse_arguments(arguments, "get-yields-by-token")?;
            args.pagination.validate()?;

            let query = args.pagination.to_query().token(args.token_symbol.as_str());
            let listing = fetch_yield_list(&self.catalog, &query).await?;
            let wanted = args.token_symbol.to_lowercase();

            let items: Vec<TokenYieldSummary> = listing
                .items
                .iter()
                .filter_map(|entry| {
                    let deposit = entry
                        .deposit_token()
                        .and_then(|t| t.symbol.as_deref())
                        .map(str::to_lowercase);
                    let summary = YieldSummary::from(entry);
                    let rewards_match = summary
                        .reward_token_symbols
                        .iter()
                        .any(|symbol| symbol.to_lowercase() == wanted);
                    if !rewards_match && deposit.as_deref() != Some(wanted.as_str()) {
                        return None;
                    }
                    Some(TokenYieldSummary {
                        summary,
                        token_match_type: if rewards_match { "reward" } else { "deposit" },
                    })
                })
                .collect();

            if items.is_empty() {
                return Err(ToolError::not_found(format!(
                    "No yields found for token {}. Verify symbol via list-supported-tokens.",
                    args.token_symbol
                ))
                .with_details(json!({ "tokenSymbol": args.token_symbol }))
                .into());
            }

            Ok(ListOutput {
                items,
                meta: listing.meta,
                source: listing.source,
            })
        })
        .await
    }
}

/// Staking and optionally liquid staking yields
pub struct GetStakingYieldsTool {
    catalog: Arc<CatalogService>,
}

impl GetStakingYieldsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakingArgs {
    #[serde(flatten)]
    pagination: Pagination,
    #[serde(default)]
    include_liquid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StakingYieldSummary {
    #[serde(flatten)]
    summary: YieldSummary,
    staking_mechanism: &'static str,
}

#[async_trait::async_trait]
impl Tool for GetStakingYieldsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-staking-yields".to_string(),
            title: Some("List staking and liquid staking yields".to_string()),
            description:
                "Retrieves staking yields with optional inclusion of liquid staking opportunities."
                    .to_string(),
            input_schema: paginated_schema(
                json!({
                    "includeLiquid": json_schema_boolean("Also include liquid staking yields (default false)")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-staking-yields", async {
            let args: StakingArgs = parse_arguments(arguments, "get-staking-yields")?;
            args.pagination.validate()?;

            let query = args.pagination.to_query().kind("staking");
            let staking = fetch_yield_list(&self.catalog, &query).await?;

            let mut combined = staking.items;
            if args.include_liquid {
                let liquid_query = YieldQuery {
                    kind: Some("liquid_staking".to_string()),
                    ..query
                };
                let liquid = fetch_yield_list(&self.catalog, &liquid_query).await?;
                combined.extend(liquid.items);
                combined = dedupe_by_id(combined);
            }

            let items = summarize(&combined)
                .into_iter()
                .map(|summary| StakingYieldSummary {
                    staking_mechanism: if summary.kind.contains("liquid") {
                        "Liquid staking"
                    } else {
                        "Validator"
                    },
                    summary,
                })
                .collect();

            Ok(ListOutput {
                items,
                meta: staking.meta,
                source: staking.source,
            })
        })
        .await
    }
}

/// Lending market yields
pub struct GetLendingYieldsTool {
    catalog: Arc<CatalogService>,
}

impl GetLendingYieldsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
struct LendingArgs {
    #[serde(flatten)]
    pagination: Pagination,
    protocol: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LendingYieldSummary {
    #[serde(flatten)]
    summary: YieldSummary,
    supply_apy: Option<f64>,
    collateral_factor: Option<f64>,
    borrow_apy: Option<f64>,
}

#[async_trait::async_trait]
impl Tool for GetLendingYieldsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-lending-yields".to_string(),
            title: Some("List lending market yields".to_string()),
            description: "Returns yields categorized as lending or borrowing markets.".to_string(),
            input_schema: paginated_schema(
                json!({ "protocol": json_schema_string("Case-insensitive name filter") }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-lending-yields", async {
            let args: LendingArgs = parse_arguments(arguments, "get-lending-yields")?;
            args.pagination.validate()?;

            let query = args.pagination.to_query().kind("lending");
            let listing = fetch_yield_list(&self.catalog, &query).await?;
            let protocol = args.protocol.map(|p| p.to_lowercase());

            let items = listing
                .items
                .iter()
                .map(|entry| (entry, YieldSummary::from(entry)))
                .filter(|(_, summary)| match &protocol {
                    Some(protocol) => summary.name.to_lowercase().contains(protocol.as_str()),
                    None => true,
                })
                .map(|(entry, summary)| {
                    let metrics = entry.metrics.as_ref();
                    LendingYieldSummary {
                        supply_apy: summary.apy,
                        collateral_factor: metrics.and_then(|m| m.collateral_factor),
                        borrow_apy: metrics.and_then(|m| m.borrow_apy),
                        summary,
                    }
                })
                .collect();

            Ok(ListOutput {
                items,
                meta: listing.meta,
                source: listing.source,
            })
        })
        .await
    }
}

/// Vault and structured product yields
pub struct GetVaultYieldsTool {
    catalog: Arc<CatalogService>,
}

impl GetVaultYieldsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
struct VaultArgs {
    #[serde(flatten)]
    pagination: Pagination,
    strategy: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VaultYieldSummary {
    #[serde(flatten)]
    summary: YieldSummary,
    strategy: Option<String>,
    lockup: Option<harvest_core::types::LifecyclePeriod>,
    performance_fee: Option<f64>,
    management_fee: Option<f64>,
    risk_rating: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetVaultYieldsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-vault-yields".to_string(),
            title: Some("List vault and structured product yields".to_string()),
            description:
                "Surfaces vault opportunities including strategy, lockup, and fee insights."
                    .to_string(),
            input_schema: paginated_schema(
                json!({ "strategy": json_schema_string("Case-insensitive name filter") }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-vault-yields", async {
            let args: VaultArgs = parse_arguments(arguments, "get-vault-yields")?;
            args.pagination.validate()?;

            let query = args.pagination.to_query().kind("vault");
            let listing = fetch_yield_list(&self.catalog, &query).await?;
            let strategy = args.strategy.as_ref().map(|s| s.to_lowercase());

            let items: Vec<VaultYieldSummary> = listing
                .items
                .iter()
                .filter(|entry| match &strategy {
                    Some(strategy) => entry.display_name().to_lowercase().contains(strategy.as_str()),
                    None => true,
                })
                .map(|entry| {
                    let metadata = entry.metadata.as_ref();
                    let fees = metadata.and_then(|m| m.fees.as_ref());
                    VaultYieldSummary {
                        summary: YieldSummary::from(entry),
                        strategy: metadata.and_then(|m| m.strategy.clone()),
                        lockup: entry
                            .lifecycle
                            .as_ref()
                            .and_then(|l| l.withdrawal_period.clone()),
                        performance_fee: fees.and_then(|f| f.performance),
                        management_fee: fees.and_then(|f| f.management),
                        risk_rating: metadata
                            .and_then(|m| m.risk_rating.clone().or_else(|| m.risk_level.clone())),
                    }
                })
                .collect();

            if items.is_empty() {
                let message = match &args.strategy {
                    Some(strategy) => format!("No vaults found matching strategy {}.", strategy),
                    None => "No vault opportunities available from StakeKit at this time.".to_string(),
                };
                return Err(ToolError::not_found(message).into());
            }

            Ok(ListOutput {
                items,
                meta: listing.meta,
                source: listing.source,
            })
        })
        .await
    }
}

/// Highest-APY yields
pub struct GetTopYieldsTool {
    catalog: Arc<CatalogService>,
}

impl GetTopYieldsTool {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopArgs {
    limit: Option<u32>,
    min_tvl_usd: Option<f64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankedYield {
    id: String,
    name: String,
    apy: Option<f64>,
    network: String,
    #[serde(rename = "type")]
    kind: String,
    tvl_usd: Option<f64>,
}

/// Rank by APY descending with id as tiebreak, keeping positive-APY yields
/// at or above the TVL floor.
pub fn rank_top_yields(summaries: Vec<YieldSummary>, min_tvl_usd: f64, limit: usize) -> Vec<YieldSummary> {
    let mut ranked: Vec<YieldSummary> = summaries
        .into_iter()
        .filter(|s| s.apy.unwrap_or(0.0) > 0.0 && s.tvl_usd.unwrap_or(0.0) >= min_tvl_usd)
        .collect();
    ranked.sort_by(|a, b| {
        b.apy
            .unwrap_or(0.0)
            .total_cmp(&a.apy.unwrap_or(0.0))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    ranked
}

#[async_trait::async_trait]
impl Tool for GetTopYieldsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get-top-yields".to_string(),
            title: Some("Top yields by APY".to_string()),
            description: "Returns the highest APY yields meeting optional TVL and type filters."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "limit": json_schema_integer("Number of yields to return (default 5)", 1, Some(20)),
                    "minTvlUsd": json_schema_number("Minimum TVL in USD (default 0)"),
                    "type": json_schema_string("Yield type filter")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        run_tool("get-top-yields", async {
            let args: TopArgs = parse_arguments(arguments, "get-top-yields")?;
            let limit = args.limit.unwrap_or(5);
            if !(1..=20).contains(&limit) {
                return Err(ToolError::validation("limit must be between 1 and 20").into());
            }
            let min_tvl_usd = args.min_tvl_usd.unwrap_or(0.0);
            if min_tvl_usd < 0.0 {
                return Err(ToolError::validation("minTvlUsd must be at least 0").into());
            }

            let query = YieldQuery {
                kind: args.kind,
                ..YieldQuery::new().limit(TOP_YIELDS_FETCH_LIMIT)
            };
            let listing = fetch_yield_list(&self.catalog, &query).await?;

            let ranked: Vec<RankedYield> =
                rank_top_yields(summarize(&listing.items), min_tvl_usd, limit as usize)
                    .into_iter()
                    .map(|s| RankedYield {
                        id: s.id,
                        name: s.name,
                        apy: s.apy,
                        network: s.network,
                        kind: s.kind,
                        tvl_usd: s.tvl_usd,
                    })
                    .collect();

            if ranked.is_empty() {
                return Err(ToolError::not_found(
                    "No yields met the ranking criteria. Adjust filters and retry.",
                )
                .into());
            }

            Ok(json!({
                "generatedAt": Utc::now().to_rfc3339(),
                "items": ranked,
                "meta": listing.meta,
                "source": listing.source,
            }))
        })
        .await
    }
}

/// Register every yield tool.
pub fn register_yield_tools(registry: &mut ToolRegistry, catalog: Arc<CatalogService>) {
    registry.register(Arc::new(GetYieldOpportunitiesTool::new(catalog.clone())));
    registry.register(Arc::new(GetYieldDetailsTool::new(catalog.clone())));
    registry.register(Arc::new(GetYieldsByNetworkTool::new(catalog.clone())));
    registry.register(Arc::new(GetYieldsByTokenTool::new(catalog.clone())));
    registry.register(Arc::new(GetStakingYieldsTool::new(catalog.clone())));
    registry.register(Arc::new(GetLendingYieldsTool::new(catalog.clone())));
    registry.register(Arc::new(GetVaultYieldsTool::new(catalog.clone())));
    registry.register(Arc::new(GetTopYieldsTool::new(catalog)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: Value) -> Yield {
        serde_json::from_value(value).unwrap()
    }

    fn summary(id: &str, apy: Option<f64>, tvl: Option<f64>) -> YieldSummary {
        YieldSummary::from(&Yield {
            id: id.to_string(),
            apy,
            tvl_usd: tvl,
            ..Default::default()
        })
    }

    #[test]
    fn test_pagination_to_query() {
        let pagination = Pagination {
            limit: Some(10),
            offset: Some(25),
            cursor: Some("c1".to_string()),
        };
        let query = pagination.to_query();

        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(25));
        assert_eq!(query.page, Some(3));
        assert_eq!(query.cursor.as_deref(), Some("c1"));

        let defaults = Pagination::default().to_query();
        assert_eq!(defaults.limit, Some(20));
        assert_eq!(defaults.page, None);
    }

    #[test]
    fn test_pagination_limit_bounds() {
        let too_big = Pagination {
            limit: Some(101),
            ..Default::default()
        };
        assert!(too_big.validate().is_err());

        let zero = Pagination {
            limit: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        assert!(Pagination::default().validate().is_ok());
    }

    #[test]
    fn test_summary_serialization() {
        let summary = YieldSummary::from(&entry(json!({
            "id": "ethereum-eth-lido-staking",
            "token": {"symbol": "ETH", "network": "ethereum"},
            "type": "liquid_staking",
            "apy": 0.031
        })));
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["name"], "Ethereum Eth Lido Staking");
        assert_eq!(json["network"], "ethereum");
        assert_eq!(json["type"], "liquid_staking");
        assert_eq!(json["rewardTokenSymbols"], json!(["ETH"]));
        assert_eq!(json["tvlUsd"], Value::Null);
        assert!(json.get("riskLevel").is_none());
    }

    #[test]
    fn test_withdrawal_warnings() {
        let locked = entry(json!({
            "id": "a",
            "lifecycle": {"supportsExit": false, "withdrawalPeriod": {"days": 21}}
        }));
        let warnings = withdrawal_warnings(&locked);
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[1],
            "Withdrawal period is 21 days which exceeds the recommended 7-day threshold."
        );

        let from_status = entry(json!({"id": "b", "status": {"exit": false}}));
        assert_eq!(withdrawal_warnings(&from_status).len(), 1);

        let liquid = entry(json!({"id": "c", "metadata": {"exit": {"withdrawalPeriod": {"days": 7}}}}));
        assert!(withdrawal_warnings(&liquid).is_empty());
    }

    #[test]
    fn test_rank_top_yields() {
        let ranked = rank_top_yields(
            vec![
                summary("b", Some(0.05), Some(100.0)),
                summary("a", Some(0.05), Some(100.0)),
                summary("c", Some(0.09), Some(10.0)),
                summary("d", Some(0.0), Some(1e9)),
                summary("e", None, Some(1e9)),
                summary("f", Some(0.01), Some(500.0)),
            ],
            50.0,
            2,
        );
        let ids: Vec<_> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_overview_includes_warnings_and_provider() {
        let overview = yield_overview(&entry(json!({
            "id": "cosmos-atom",
            "metadata": {
                "name": "Cosmos Staking",
                "providerId": "cosmos-hub",
                "provider": {"name": "Cosmos Hub", "website": "https://cosmos.network"}
            },
            "lifecycle": {"withdrawalPeriod": {"days": 21}},
            "rewards": [{"tokenSymbol": "ATOM", "apy": 0.15}]
        })));

        assert_eq!(overview["name"], "Cosmos Staking");
        assert_eq!(overview["provider"]["id"], "cosmos-hub");
        assert_eq!(overview["rewards"][0]["symbol"], "ATOM");
        assert_eq!(overview["warnings"].as_array().unwrap().len(), 1);
    }
}
