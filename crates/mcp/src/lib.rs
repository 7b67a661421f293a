//! MCP (Model Context Protocol) server for the StakeKit yield catalog.
//!
//! Tools, resources and prompts are served over JSON-RPC, either on
//! stdio ([`McpServer::serve`]) or as Streamable HTTP sessions managed by
//! the [`SessionRegistry`].

pub mod config;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::{AppConfig, ConfigError};
pub use server::{McpServer, ServerComponents};
pub use session::{SessionConfig, SessionRegistry};
pub use transport::{SessionTransport, StreamableHttpTransport, TransportRequest, TransportResponse};
