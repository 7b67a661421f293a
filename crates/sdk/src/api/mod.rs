//! Typed wrappers over the StakeKit endpoints.

mod networks;
mod providers;
mod tokens;
mod yields;

pub use networks::NetworksApi;
pub use providers::ProvidersApi;
pub use tokens::TokensApi;
pub use yields::{YieldDetail, YieldListing, YieldQuery, YieldsApi};
