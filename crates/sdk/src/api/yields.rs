//! Yields API endpoints.

use crate::client::StakeKitClient;
use crate::error::SdkResult;
use crate::transport::http::encode_path_segment;
use harvest_core::normalize::{dedupe_by_id, parse_strict};
use harvest_core::types::{PageMeta, Source, Yield, YieldPage};
use serde::Serialize;

/// Filters and pagination for `GET /yields`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YieldQuery {
    pub network: Option<String>,
    pub token: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub page: Option<u32>,
    pub cursor: Option<String>,
}

impl YieldQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn token(mut self, symbol: impl Into<String>) -> Self {
        self.token = Some(symbol.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in a stable order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let numbers = [
            ("limit", self.limit),
            ("offset", self.offset),
            ("page", self.page),
        ];
        let strings = [
            ("cursor", &self.cursor),
            ("network", &self.network),
            ("token", &self.token),
            ("type", &self.kind),
        ];

        numbers
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key.to_string(), v.to_string())))
            .chain(
                strings
                    .into_iter()
                    .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v))),
            )
            .collect()
    }
}

/// A validated, de-duplicated page of yields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldListing {
    pub items: Vec<Yield>,
    pub meta: PageMeta,
    pub source: Source,
}

/// A single yield and the host that served it.
#[derive(Debug, Clone, Serialize)]
pub struct YieldDetail {
    #[serde(rename = "yield")]
    pub entry: Yield,
    pub source: Source,
}

/// Yields API for discovering opportunities.
pub struct YieldsApi<'a> {
    client: &'a StakeKitClient,
}

impl<'a> YieldsApi<'a> {
    pub(crate) fn new(client: &'a StakeKitClient) -> Self {
        Self { client }
    }

    /// List yields matching `query`.
    pub async fn list(&self, query: &YieldQuery) -> SdkResult<YieldListing> {
        self.list_for(query, "StakeKit yields endpoint").await
    }

    /// List yields, naming `context` in schema errors.
    ///
    /// Any element that fails validation fails the whole page.
    pub async fn list_for(&self, query: &YieldQuery, context: &str) -> SdkResult<YieldListing> {
        let response = self.client.http.get("/yields", query.to_query()).await?;
        let page: YieldPage = parse_strict(&response.data, context)?;
        let meta = page.meta();

        Ok(YieldListing {
            items: dedupe_by_id(page.data),
            meta,
            source: response.source,
        })
    }

    /// Fetch one yield by id.
    pub async fn get(&self, yield_id: &str) -> SdkResult<YieldDetail> {
        let path = format!("/yields/{}", encode_path_segment(yield_id)?);
        let response = self.client.http.get(&path, Vec::new()).await?;
        let entry = parse_strict(&response.data, "StakeKit yield details endpoint")?;

        Ok(YieldDetail {
            entry,
            source: response.source,
        })
    }
}
