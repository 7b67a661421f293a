//! Cached catalog of networks, tokens, protocols and yields.
//!
//! Each list lives in its own [`TtlCache`] under a fixed key. A cache miss
//! fetches through the resilient transport, normalizes, and stores the list
//! behind an `Arc` so concurrent readers share one copy until it expires.

use crate::api::YieldQuery;
use crate::client::StakeKitClient;
use crate::error::SdkResult;
use harvest_core::cache::TtlCache;
use harvest_core::types::{CachedList, Network, Protocol, Token, Yield};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const NETWORKS_KEY: &str = "networks";
const TOKENS_KEY: &str = "tokens";
const PROTOCOLS_KEY: &str = "protocols";
const YIELDS_KEY: &str = "yields";

/// Page size used when caching the full yield list.
pub const CATALOG_YIELD_LIMIT: u32 = 200;
/// Page size for server-side network filtering.
pub const NETWORK_YIELD_LIMIT: u32 = 50;
/// Page size for server-side token filtering.
pub const TOKEN_YIELD_LIMIT: u32 = 100;

/// Catalog cache settings
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Lifetime of every cached list.
    pub ttl: Duration,
    /// Skip cache reads and writes entirely.
    pub bypass_cache: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            bypass_cache: false,
        }
    }
}

/// Catalog service fronting the StakeKit API
pub struct CatalogService {
    client: StakeKitClient,
    config: CatalogConfig,
    networks: TtlCache<Arc<CachedList<Network>>>,
    tokens: TtlCache<Arc<CachedList<Token>>>,
    protocols: TtlCache<Arc<CachedList<Protocol>>>,
    yields: TtlCache<Arc<CachedList<Yield>>>,
}

impl CatalogService {
    pub fn new(client: StakeKitClient, config: CatalogConfig) -> Self {
        Self {
            networks: TtlCache::new(config.ttl),
            tokens: TtlCache::new(config.ttl),
            protocols: TtlCache::new(config.ttl),
            yields: TtlCache::new(config.ttl),
            client,
            config,
        }
    }

    /// Underlying client, for uncached calls.
    pub fn client(&self) -> &StakeKitClient {
        &self.client
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    async fn cached<T, F>(
        &self,
        cache: &TtlCache<Arc<CachedList<T>>>,
        key: &str,
        loader: F,
    ) -> SdkResult<Arc<CachedList<T>>>
    where
        F: Future<Output = SdkResult<CachedList<T>>>,
    {
        if !self.config.bypass_cache {
            if let Some(hit) = cache.get(key) {
                debug!(key, items = hit.items.len(), "Catalog cache hit");
                return Ok(hit);
            }
        }

        let list = Arc::new(loader.await?);
        debug!(key, items = list.items.len(), source = %list.source, "Catalog loaded");

        if !self.config.bypass_cache {
            cache.set(key, list.clone(), None);
        }
        Ok(list)
    }

    pub async fn networks(&self) -> SdkResult<Arc<CachedList<Network>>> {
        self.cached(&self.networks, NETWORKS_KEY, async {
            self.client.networks().list().await
        })
        .await
    }

    pub async fn tokens(&self) -> SdkResult<Arc<CachedList<Token>>> {
        self.cached(&self.tokens, TOKENS_KEY, async {
            self.client.tokens().list().await
        })
        .await
    }

    pub async fn protocols(&self) -> SdkResult<Arc<CachedList<Protocol>>> {
        self.cached(&self.protocols, PROTOCOLS_KEY, async {
            self.client.providers().list().await
        })
        .await
    }

    pub async fn yields(&self) -> SdkResult<Arc<CachedList<Yield>>> {
        self.cached(&self.yields, YIELDS_KEY, async {
            let query = YieldQuery::new().limit(CATALOG_YIELD_LIMIT);
            let listing = self.client.yields().list_for(&query, "yields").await?;
            Ok(CachedList::new(listing.items, listing.source))
        })
        .await
    }

    /// Yields on one network, filtered server-side. Not cached.
    pub async fn yields_for_network(&self, network_id: &str) -> SdkResult<Vec<Yield>> {
        let query = YieldQuery::new()
            .network(network_id)
            .limit(NETWORK_YIELD_LIMIT);
        let listing = self
            .client
            .yields()
            .list_for(&query, "yields by network")
            .await?;
        Ok(listing.items)
    }

    /// Yields involving one token symbol, filtered server-side. Not cached.
    pub async fn yields_for_token(&self, symbol: &str) -> SdkResult<Vec<Yield>> {
        let query = YieldQuery::new().token(symbol).limit(TOKEN_YIELD_LIMIT);
        let listing = self
            .client
            .yields()
            .list_for(&query, "yields by token")
            .await?;
        Ok(listing.items)
    }

    /// Cached yields owned by `protocol`.
    pub async fn yields_for_protocol(&self, protocol: &Protocol) -> SdkResult<Vec<Yield>> {
        let yields = self.yields().await?;
        Ok(yields
            .items
            .iter()
            .filter(|entry| protocol.owns(entry))
            .cloned()
            .collect())
    }

    /// Drop every cached list.
    pub fn clear_caches(&self) {
        self.networks.clear(None);
        self.tokens.clear(None);
        self.protocols.clear(None);
        self.yields.clear(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use harvest_core::analytics::{median, percentile, finite_apys};
    use harvest_core::types::Source;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog_for(server: &MockServer, config: CatalogConfig) -> CatalogService {
        let client = StakeKitClient::builder()
            .primary_url(format!("{}/v2", server.uri()))
            .fallback_url(format!("{}/v1", server.uri()))
            .api_key("sk-test")
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap();
        CatalogService::new(client, config)
    }

    async fn mount_networks(server: &MockServer, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/v2/networks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "ethereum", "name": "Ethereum", "category": "evm"},
                {"id": "ethereum", "name": "Ethereum duplicate"},
                {"id": "broken"}
            ])))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_second_fetch_within_ttl_is_cached() {
        let server = MockServer::start().await;
        mount_networks(&server, 1).await;
        let catalog = catalog_for(&server, CatalogConfig::default());

        let first = catalog.networks().await.unwrap();
        let second = catalog.networks().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].name, "Ethereum");
        assert_eq!(first.source, Source::Primary);
    }

    #[tokio::test]
    async fn test_clear_caches_forces_refetch() {
        let server = MockServer::start().await;
        mount_networks(&server, 2).await;
        let catalog = catalog_for(&server, CatalogConfig::default());

        catalog.networks().await.unwrap();
        catalog.clear_caches();
        catalog.networks().await.unwrap();
    }

    #[tokio::test]
    async fn test_bypass_cache_always_fetches() {
        let server = MockServer::start().await;
        mount_networks(&server, 2).await;
        let catalog = catalog_for(
            &server,
            CatalogConfig {
                bypass_cache: true,
                ..Default::default()
            },
        );

        catalog.networks().await.unwrap();
        catalog.networks().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_list_is_refetched() {
        let server = MockServer::start().await;
        mount_networks(&server, 2).await;
        let catalog = catalog_for(
            &server,
            CatalogConfig {
                ttl: Duration::from_millis(20),
                ..Default::default()
            },
        );

        catalog.networks().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        catalog.networks().await.unwrap();
    }

    #[tokio::test]
    async fn test_providers_items_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/providers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "lido", "name": "Lido"}, {"name": "no id"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let catalog = catalog_for(&server, CatalogConfig::default());

        let protocols = catalog.protocols().await.unwrap();
        assert_eq!(protocols.items.len(), 1);
        assert_eq!(protocols.items[0].id, "lido");
    }

    #[tokio::test]
    async fn test_yields_for_network_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/yields"))
            .and(query_param("network", "ethereum"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "eth-lido", "apy": 0.04, "network": "ethereum"},
                    {"id": "eth-rocket", "apy": 0.05, "network": "ethereum"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/yields"))
            .and(query_param("network", "polygon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "matic-native", "apy": 0.02, "network": "polygon"}]
            })))
            .expect(0)
            .mount(&server)
            .await;
        let catalog = catalog_for(&server, CatalogConfig::default());

        let yields = catalog.yields_for_network("ethereum").await.unwrap();
        assert_eq!(yields.len(), 2);
        assert!(yields.iter().all(|y| y.id != "matic-native"));

        let peers = finite_apys(&yields);
        let network_median = median(&peers).unwrap();
        assert!((network_median - 0.045).abs() < 1e-12);
        assert_eq!(percentile(Some(0.04), &peers), Some(50));
    }

    #[tokio::test]
    async fn test_yields_for_protocol_filters_cached_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/yields"))
            .and(query_param("limit", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "a", "metadata": {"providerId": "lido"}},
                    {"id": "b", "metadata": {"provider": {"name": "Lido"}}},
                    {"id": "c", "metadata": {"providerId": "aave"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let catalog = catalog_for(&server, CatalogConfig::default());
        let lido = Protocol {
            id: "lido".to_string(),
            name: "Lido".to_string(),
            ..Default::default()
        };

        let owned = catalog.yields_for_protocol(&lido).await.unwrap();
        let ids: Vec<_> = owned.iter().map(|y| y.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        // Served from cache the second time
        catalog.yields_for_protocol(&lido).await.unwrap();
    }
}
