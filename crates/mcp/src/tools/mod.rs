pub mod chains;
mod registry;
pub mod yields;

pub use chains::register_chain_tools;
pub use registry::{
    format_tool_error, json_schema_boolean, json_schema_integer, json_schema_number,
    json_schema_object, json_schema_string, parse_arguments, run_tool, tool_failure,
    tool_success, Tool, ToolRegistry,
};
pub use yields::register_yield_tools;

use harvest_sdk::CatalogService;
use std::sync::Arc;

/// Registry holding every yield, network, token and protocol tool.
pub fn default_registry(catalog: Arc<CatalogService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_yield_tools(&mut registry, catalog.clone());
    register_chain_tools(&mut registry, catalog);
    registry
}
