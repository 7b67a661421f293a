// Core types and functionality for Harvest

pub mod types;
pub mod error;
pub mod cache;
pub mod normalize;
pub mod analytics;

pub use error::{HarvestResult, ToolError, ToolErrorCode};
pub use types::*;
