//! Networks API endpoints.

use crate::client::StakeKitClient;
use crate::error::SdkResult;
use harvest_core::normalize::{dedupe_by_id, parse_list};
use harvest_core::types::{CachedList, Network};

/// Networks API for listing supported blockchains.
pub struct NetworksApi<'a> {
    client: &'a StakeKitClient,
}

impl<'a> NetworksApi<'a> {
    pub(crate) fn new(client: &'a StakeKitClient) -> Self {
        Self { client }
    }

    /// List every network, dropping malformed entries.
    pub async fn list(&self) -> SdkResult<CachedList<Network>> {
        let response = self.client.http.get("/networks", Vec::new()).await?;
        let items = dedupe_by_id(parse_list(&response.data, "networks"));
        Ok(CachedList::new(items, response.source))
    }
}
