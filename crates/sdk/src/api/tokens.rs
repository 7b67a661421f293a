//! Tokens API endpoints.

use crate::client::StakeKitClient;
use crate::error::SdkResult;
use harvest_core::normalize::{dedupe_by_id, parse_list};
use harvest_core::types::{CachedList, Token};

/// Tokens API for listing supported assets.
pub struct TokensApi<'a> {
    client: &'a StakeKitClient,
}

impl<'a> TokensApi<'a> {
    pub(crate) fn new(client: &'a StakeKitClient) -> Self {
        Self { client }
    }

    /// List every token. Entries sharing a symbol across networks are kept.
    pub async fn list(&self) -> SdkResult<CachedList<Token>> {
        let response = self.client.http.get("/tokens", Vec::new()).await?;
        let items = dedupe_by_id(parse_list(&response.data, "tokens"));
        Ok(CachedList::new(items, response.source))
    }
}
