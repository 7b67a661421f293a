// MCP server: JSON-RPC dispatch over tools, resources and prompts

use crate::prompts::PromptRegistry;
use crate::protocol::*;
use crate::resources::ResourceRegistry;
use crate::tools::{default_registry, format_tool_error, ToolRegistry};
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use harvest_core::error::{ToolError, ToolErrorCode};
use harvest_sdk::CatalogService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

const INSTRUCTIONS: &str = "Harvest exposes StakeKit yield data. Start with list-supported-chains \
or get-yield-opportunities, then drill into get-yield-details or the yield://{yieldId} resource.";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("MCP server already closed")]
    AlreadyClosed,
}

/// Shared registries every server instance is built from
#[derive(Clone)]
pub struct ServerComponents {
    pub tools: Arc<ToolRegistry>,
    pub resources: Arc<ResourceRegistry>,
    pub prompts: Arc<PromptRegistry>,
}

impl ServerComponents {
    /// Every tool, resource and prompt over one catalog.
    pub fn for_catalog(catalog: Arc<CatalogService>) -> Self {
        Self {
            tools: Arc::new(default_registry(catalog.clone())),
            resources: Arc::new(ResourceRegistry::new(catalog)),
            prompts: Arc::new(PromptRegistry::new()),
        }
    }

    pub fn new_server(&self) -> McpServer {
        McpServer::new(self.clone())
    }
}

/// One MCP server instance; HTTP sessions each get their own.
pub struct McpServer {
    components: ServerComponents,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl McpServer {
    pub fn new(components: ServerComponents) -> Self {
        Self {
            components,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.components.tools
    }

    /// True once the client has sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) -> Result<(), ServerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyClosed);
        }
        debug!("MCP server closed");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC until the reader hits EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new());
        let mut sink = FramedWrite::new(writer, LinesCodec::new());

        info!(tools = self.tools().len(), "MCP server listening on stdio");

        while let Some(line) = lines.next().await {
            let line = line.context("Failed to read JSON-RPC message")?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(reply) = self.handle_message(&line).await {
                sink.send(reply)
                    .await
                    .context("Failed to write JSON-RPC response")?;
            }
            if self.is_closed() {
                break;
            }
        }

        info!("MCP input closed");
        Ok(())
    }

    /// Handle one raw message; `None` when no reply is due.
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(raw) {
            Err(e) => Some(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::parse_error().with_data(json!({ "error": e.to_string() })),
            )),
            Ok(value) => match serde_json::from_value::<JsonRpcRequest>(value) {
                Ok(request) => self.handle_request(request).await,
                Err(_) => Some(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::invalid_request(),
                )),
            },
        };

        response.and_then(|r| serde_json::to_string(&r).ok())
    }

    /// Dispatch a request; notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let span = info_span!(
            "mcp_request",
            method = %request.method,
            request_id = %Uuid::new_v4()
        );

        async move {
            if request.is_notification() {
                self.handle_notification(&request.method);
                return None;
            }

            let id = request.id.clone().unwrap_or(Value::Null);
            if self.is_closed() {
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::internal_error("MCP server is closed"),
                ));
            }

            let outcome = self.dispatch(&request.method, request.params).await;
            Some(match outcome {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(error) => {
                    debug!(code = error.code, message = %error.message, "Request failed");
                    JsonRpcResponse::error(id, error)
                }
            })
        }
        .instrument(span)
        .await
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => {
                self.initialized.store(true, Ordering::Release);
                info!("Client initialized");
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => {
                let params: InitializeParams = parse_params_or_default(params)?;
                self.initialize(params)
            }
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.components.tools.list_schemas(),
            }),
            "tools/call" => {
                let params: CallToolParams = parse_params(params)?;
                self.call_tool(params).await
            }
            "resources/list" => to_result(&ListResourcesResult {
                resources: self.components.resources.list_resources(),
            }),
            "resources/templates/list" => to_result(&ListResourceTemplatesResult {
                resource_templates: self.components.resources.list_templates(),
            }),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(params)?;
                let result = self
                    .components
                    .resources
                    .read(&params.uri)
                    .await
                    .map_err(rpc_error)?;
                to_result(&result)
            }
            "prompts/list" => to_result(&ListPromptsResult {
                prompts: self.components.prompts.list(),
            }),
            "prompts/get" => {
                let params: GetPromptParams = parse_params(params)?;
                let result = self
                    .components
                    .prompts
                    .get(&params.name, params.arguments)
                    .map_err(rpc_error)?;
                to_result(&result)
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: InitializeParams) -> Result<Value, JsonRpcError> {
        let version = negotiate_version(params.protocol_version.as_deref());
        if let Some(client) = &params.client_info {
            info!(client = %client.name, client_version = %client.version, version, "Initializing MCP session");
        }

        let listed = Some(ListChangedCapability {
            list_changed: false,
        });
        to_result(&InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities {
                tools: listed.clone(),
                resources: listed.clone(),
                prompts: listed,
            },
            server_info: ServerInfo::default(),
            instructions: Some(INSTRUCTIONS.to_string()),
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<Value, JsonRpcError> {
        let tool = self
            .components
            .tools
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        info!(tool = %params.name, "Calling tool");
        let result = tool
            .execute(params.arguments)
            .await
            .map_err(|e| JsonRpcError::internal_error(format_tool_error(e).to_string()))?;
        to_result(&result)
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn parse_params_or_default<T: DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, JsonRpcError> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => {
            serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
        }
    }
}

/// Resource and prompt failures as JSON-RPC errors carrying the taxonomy.
fn rpc_error(err: anyhow::Error) -> JsonRpcError {
    let tool_error: ToolError = format_tool_error(err);
    let code = match tool_error.code {
        ToolErrorCode::NotFound | ToolErrorCode::ValidationError => JsonRpcError::INVALID_PARAMS,
        ToolErrorCode::UpstreamError | ToolErrorCode::InternalError => JsonRpcError::INTERNAL_ERROR,
    };
    let mut data = json!({ "code": tool_error.code });
    if let Some(details) = &tool_error.details {
        data["details"] = details.clone();
    }
    JsonRpcError::custom(code, tool_error.to_string()).with_data(data)
}
