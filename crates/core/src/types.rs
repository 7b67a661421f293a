use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Upstream fields not named in a declared shape, kept verbatim.
pub type Extra = Map<String, Value>;

/// Which upstream host served a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Primary,
    Fallback,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// A normalized list fetched once and shared until its cache entry expires
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedList<T> {
    pub items: Vec<T>,
    pub source: Source,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CachedList<T> {
    pub fn new(items: Vec<T>, source: Source) -> Self {
        Self {
            items,
            source,
            fetched_at: Utc::now(),
        }
    }
}

/// Anything with an identity used for de-duplication
pub trait Entity {
    /// Identity of the entity, if it carries one.
    fn identity(&self) -> Option<&str>;
}

/// Reference to a token embedded in other entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One component of a reward rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardComponent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<RewardComponent>>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A duration expressed the way the upstream API does
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecyclePeriod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_enter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_exit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_period: Option<LifecyclePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<LifecyclePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_period: Option<LifecyclePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_window: Option<LifecyclePeriod>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YieldStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apy_base: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apy_reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrow_apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply_apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collateral_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fees {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staking_mechanism: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<Lifecycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees: Option<Fees>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A yield opportunity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Yield {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_token: Option<TokenRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_tokens: Option<Vec<TokenRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl_usd: Option<f64>,
    #[serde(rename = "tvlUsd24hAgo", skip_serializing_if = "Option::is_none")]
    pub tvl_usd_24h_ago: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<YieldStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<YieldMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Vec<Reward>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<YieldMetadata>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Entity for Yield {
    fn identity(&self) -> Option<&str> {
        Some(&self.id)
    }
}

impl Yield {
    /// Human-readable name, falling back to a title-cased id.
    pub fn display_name(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.name.clone())
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| title_case(&self.id))
    }

    /// Network the yield lives on, as declared directly or through its token.
    pub fn primary_network(&self) -> Option<&str> {
        self.network
            .as_deref()
            .or_else(|| self.token.as_ref().and_then(|t| t.network.as_deref()))
    }

    /// Best-effort network: direct, token, metadata, then the first listed network.
    pub fn network_id(&self) -> Option<&str> {
        self.primary_network()
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| m.extra.get("network"))
                    .and_then(Value::as_str)
            })
            .or_else(|| {
                self.networks
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(String::as_str)
            })
    }

    /// Yield type (staking, lending, vault, ...), `"unknown"` when undeclared.
    pub fn kind(&self) -> &str {
        self.kind
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.kind.as_deref()))
            .or_else(|| self.metadata.as_ref().and_then(|m| m.category.as_deref()))
            .or(self.category.as_deref())
            .unwrap_or("unknown")
    }

    pub fn apy(&self) -> Option<f64> {
        let metrics = self.metrics.as_ref();
        self.apy
            .or_else(|| metrics.and_then(|m| m.apy))
            .or_else(|| metrics.and_then(|m| m.apr))
            .or(self.apr)
            .filter(|v| v.is_finite())
    }

    pub fn apr(&self) -> Option<f64> {
        self.apr
            .or_else(|| self.metrics.as_ref().and_then(|m| m.apr))
    }

    pub fn tvl_usd(&self) -> Option<f64> {
        self.tvl_usd
            .or_else(|| self.metrics.as_ref().and_then(|m| m.tvl_usd))
            .or(self.tvl)
    }

    pub fn deposit_token(&self) -> Option<&TokenRef> {
        self.deposit_token.as_ref().or(self.token.as_ref())
    }

    /// Reward tokens as declared, or derived from the reward list.
    pub fn reward_token_refs(&self) -> Vec<&TokenRef> {
        match &self.reward_tokens {
            Some(tokens) => tokens.iter().collect(),
            None => self
                .rewards
                .iter()
                .flatten()
                .filter_map(|r| r.token.as_ref())
                .collect(),
        }
    }

    /// Distinct reward symbols; the deposit token symbol when nothing else is known.
    pub fn reward_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        for token in self.reward_token_refs() {
            let symbol = token
                .symbol
                .as_ref()
                .or(token.name.as_ref())
                .or(token.id.as_ref());
            if let Some(symbol) = symbol {
                if !symbols.contains(symbol) {
                    symbols.push(symbol.clone());
                }
            }
        }
        if symbols.is_empty() {
            if let Some(symbol) = self.token.as_ref().and_then(|t| t.symbol.clone()) {
                symbols.push(symbol);
            }
        }
        symbols
    }

    /// Union of tags, metadata tags and metadata labels, first occurrence order.
    pub fn all_tags(&self) -> Vec<String> {
        let metadata = self.metadata.as_ref();
        let sources = [
            self.tags.as_ref(),
            metadata.and_then(|m| m.tags.as_ref()),
            metadata.and_then(|m| m.labels.as_ref()),
        ];
        let mut tags: Vec<String> = Vec::new();
        for tag in sources.into_iter().flatten().flatten() {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    pub fn risk_level(&self) -> Option<&str> {
        let metadata = self.metadata.as_ref()?;
        metadata
            .risk_level
            .as_deref()
            .or(metadata.risk_rating.as_deref())
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.provider_id.as_deref()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.metadata.as_ref()?.provider.as_ref()?.name.as_deref()
    }
}

/// Title-case an identifier split on `-` and `_`.
pub fn title_case(value: &str) -> String {
    value
        .split(['-', '_'])
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strict yield-list envelope with pagination metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldPage {
    #[serde(alias = "items")]
    pub data: Vec<Yield>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next_page: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl YieldPage {
    pub fn meta(&self) -> PageMeta {
        PageMeta {
            limit: self.limit,
            offset: self.offset,
            cursor: self.cursor.clone().or_else(|| self.next_cursor.clone()),
            has_next_page: self.has_next_page,
            total_count: self.total_count.or(self.total),
        }
    }
}

/// Pagination details surfaced to tool callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next_page: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// A blockchain network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_testnet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_token: Option<TokenRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_token: Option<TokenRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Network {
    pub fn is_testnet(&self) -> bool {
        self.is_testnet.unwrap_or(false)
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated.unwrap_or(false)
    }
}

impl Entity for Network {
    fn identity(&self) -> Option<&str> {
        Some(&self.id)
    }
}

/// A token, identified by symbol and optionally by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Entity for Token {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// A DeFi protocol (called a provider by newer API versions)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audits: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Entity for Protocol {
    fn identity(&self) -> Option<&str> {
        Some(&self.id)
    }
}

impl Protocol {
    /// Whether a yield belongs to this protocol by provider id or name.
    pub fn owns(&self, entry: &Yield) -> bool {
        entry.provider_id() == Some(self.id.as_str())
            || entry.provider_name() == Some(self.name.as_str())
    }
}
