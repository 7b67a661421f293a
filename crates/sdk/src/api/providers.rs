//! Providers API endpoints.
//!
//! Newer API versions call protocols "providers"; the entity stays [`Protocol`].

use crate::client::StakeKitClient;
use crate::error::SdkResult;
use harvest_core::normalize::{dedupe_by_id, parse_list};
use harvest_core::types::{CachedList, Protocol};

/// Providers API for listing DeFi protocols.
pub struct ProvidersApi<'a> {
    client: &'a StakeKitClient,
}

impl<'a> ProvidersApi<'a> {
    pub(crate) fn new(client: &'a StakeKitClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> SdkResult<CachedList<Protocol>> {
        let response = self.client.http.get("/providers", Vec::new()).await?;
        let items = dedupe_by_id(parse_list(&response.data, "providers"));
        Ok(CachedList::new(items, response.source))
    }
}
