//! Session transports.
//!
//! A [`SessionTransport`] carries one MCP session between a client and its
//! [`McpServer`]. Lifecycle changes are reported to a [`TransportObserver`]
//! so the session registry can move the session between its maps.

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Header carrying the session id on Streamable HTTP requests
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport already connected")]
    AlreadyConnected,

    #[error("Transport not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Lifecycle notifications emitted by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The session completed `initialize` and is addressable by this id.
    Initialized(String),
    /// The client asked to end the session.
    SessionClosed(String),
    Error(String),
    /// The transport itself shut down.
    Closed,
}

pub trait TransportObserver: Send + Sync {
    fn notify(&self, event: TransportEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMethod {
    Post,
    Get,
    Delete,
}

/// An HTTP request routed to a session
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: TransportMethod,
    pub session_id: Option<String>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn post(session_id: Option<String>, body: Value) -> Self {
        Self {
            method: TransportMethod::Post,
            session_id,
            body: Some(body),
        }
    }

    pub fn get(session_id: Option<String>) -> Self {
        Self {
            method: TransportMethod::Get,
            session_id,
            body: None,
        }
    }

    pub fn delete(session_id: Option<String>) -> Self {
        Self {
            method: TransportMethod::Delete,
            session_id,
            body: None,
        }
    }
}

/// The transport's answer, ready to be rendered as an HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub session_id: Option<String>,
    pub body: Option<Value>,
}

impl TransportResponse {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            session_id: None,
            body: Some(body),
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            session_id: None,
            body: None,
        }
    }

    fn rpc_error(status: u16, id: Value, error: JsonRpcError) -> TransportResult<Self> {
        Ok(Self::json(
            status,
            serde_json::to_value(JsonRpcResponse::error(id, error))?,
        ))
    }

    fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}

#[async_trait::async_trait]
pub trait SessionTransport: Send + Sync {
    /// Attach the server this transport feeds.
    async fn connect(&self, server: Arc<McpServer>) -> TransportResult<()>;

    async fn handle_request(&self, request: TransportRequest) -> TransportResult<TransportResponse>;

    async fn close(&self) -> TransportResult<()>;
}

/// Streamable HTTP transport answering every POST with a JSON body.
///
/// No SSE stream is offered, so `GET` is rejected with 405.
pub struct StreamableHttpTransport {
    session_id: String,
    observer: Arc<dyn TransportObserver>,
    server: Mutex<Option<Arc<McpServer>>>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    pub fn new(session_id: impl Into<String>, observer: Arc<dyn TransportObserver>) -> Self {
        Self {
            session_id: session_id.into(),
            observer,
            server: Mutex::new(None),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn server(&self) -> TransportResult<Arc<McpServer>> {
        self.server
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    async fn handle_post(&self, request: TransportRequest) -> TransportResult<TransportResponse> {
        let Some(body) = request.body else {
            return TransportResponse::rpc_error(400, Value::Null, JsonRpcError::parse_error());
        };
        let rpc: JsonRpcRequest = match serde_json::from_value(body) {
            Ok(rpc) => rpc,
            Err(_) => {
                return TransportResponse::rpc_error(400, Value::Null, JsonRpcError::invalid_request())
            }
        };
        let id = rpc.id.clone().unwrap_or(Value::Null);
        let is_initialize = rpc.method == "initialize";
        let initialized = self.initialized.load(Ordering::Acquire);

        if is_initialize && initialized {
            return TransportResponse::rpc_error(
                400,
                id,
                JsonRpcError::invalid_request()
                    .with_data(json!({ "reason": "Server already initialized" })),
            );
        }
        if !is_initialize {
            if !initialized {
                return TransportResponse::rpc_error(
                    400,
                    id,
                    JsonRpcError::session_error("Bad Request: Server not initialized"),
                );
            }
            if request.session_id.as_deref() != Some(self.session_id.as_str()) {
                return TransportResponse::rpc_error(
                    404,
                    id,
                    JsonRpcError::custom(-32001, "Session not found"),
                );
            }
        }

        let server = self.server()?;
        let Some(response) = server.handle_request(rpc).await else {
            return Ok(TransportResponse::empty(202).with_session(&self.session_id));
        };

        if is_initialize && response.error.is_none() {
            self.initialized.store(true, Ordering::Release);
            debug!(session_id = %self.session_id, "Session initialized");
            self.observer
                .notify(TransportEvent::Initialized(self.session_id.clone()));
        }

        Ok(TransportResponse::json(200, serde_json::to_value(response)?).with_session(&self.session_id))
    }
}

#[async_trait::async_trait]
impl SessionTransport for StreamableHttpTransport {
    async fn connect(&self, server: Arc<McpServer>) -> TransportResult<()> {
        let mut slot = self.server.lock().unwrap();
        if slot.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        *slot = Some(server);
        Ok(())
    }

    async fn handle_request(&self, request: TransportRequest) -> TransportResult<TransportResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        match request.method {
            TransportMethod::Post => self.handle_post(request).await,
            TransportMethod::Get => Ok(TransportResponse::empty(405)),
            TransportMethod::Delete => {
                self.observer
                    .notify(TransportEvent::SessionClosed(self.session_id.clone()));
                Ok(TransportResponse::empty(200))
            }
        }
    }

    async fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            warn!(session_id = %self.session_id, "Transport closed twice");
            return Err(TransportError::Closed);
        }
        self.server.lock().unwrap().take();
        self.observer.notify(TransportEvent::Closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerComponents;
    use harvest_sdk::{CatalogConfig, CatalogService, RetryConfig, StakeKitClient};

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<TransportEvent>>,
    }

    impl TransportObserver for RecordingObserver {
        fn notify(&self, event: TransportEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn server() -> Arc<McpServer> {
        let client = StakeKitClient::builder()
            .primary_url("http://127.0.0.1:1/v2")
            .api_key("sk-test")
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap();
        let catalog = Arc::new(CatalogService::new(client, CatalogConfig::default()));
        Arc::new(ServerComponents::for_catalog(catalog).new_server())
    }

    fn initialize_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2025-03-26", "capabilities": {}}
        })
    }

    async fn connected(observer: Arc<RecordingObserver>) -> StreamableHttpTransport {
        let transport = StreamableHttpTransport::new("session-1", observer);
        transport.connect(server()).await.unwrap();
        transport
    }

    #[tokio::test]
    async fn test_initialize_emits_event_and_session_id() {
        let observer = Arc::new(RecordingObserver::default());
        let transport = connected(observer.clone()).await;

        let response = transport
            .handle_request(TransportRequest::post(None, initialize_body()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.session_id.as_deref(), Some("session-1"));
        assert_eq!(response.body.unwrap()["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![TransportEvent::Initialized("session-1".to_string())]
        );

        let again = transport
            .handle_request(TransportRequest::post(None, initialize_body()))
            .await
            .unwrap();
        assert_eq!(again.status, 400);
    }

    #[tokio::test]
    async fn test_requests_before_initialize_are_rejected() {
        let observer = Arc::new(RecordingObserver::default());
        let transport = connected(observer).await;

        let response = transport
            .handle_request(TransportRequest::post(
                Some("session-1".to_string()),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body.unwrap()["error"]["code"], -32000);
    }

    #[tokio::test]
    async fn test_post_after_initialize() {
        let observer = Arc::new(RecordingObserver::default());
        let transport = connected(observer).await;
        transport
            .handle_request(TransportRequest::post(None, initialize_body()))
            .await
            .unwrap();

        let notification = transport
            .handle_request(TransportRequest::post(
                Some("session-1".to_string()),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            ))
            .await
            .unwrap();
        assert_eq!(notification.status, 202);
        assert!(notification.body.is_none());

        let listed = transport
            .handle_request(TransportRequest::post(
                Some("session-1".to_string()),
                json!({"jsonrpc": "2.0", "id": 2, "method": "prompts/list"}),
            ))
            .await
            .unwrap();
        assert_eq!(listed.status, 200);
        assert_eq!(listed.body.unwrap()["result"]["prompts"].as_array().unwrap().len(), 5);

        let wrong = transport
            .handle_request(TransportRequest::post(
                Some("other".to_string()),
                json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
            ))
            .await
            .unwrap();
        assert_eq!(wrong.status, 404);
    }

    #[tokio::test]
    async fn test_get_delete_and_close() {
        let observer = Arc::new(RecordingObserver::default());
        let transport = connected(observer.clone()).await;

        let get = transport
            .handle_request(TransportRequest::get(Some("session-1".to_string())))
            .await
            .unwrap();
        assert_eq!(get.status, 405);

        let delete = transport
            .handle_request(TransportRequest::delete(Some("session-1".to_string())))
            .await
            .unwrap();
        assert_eq!(delete.status, 200);

        transport.close().await.unwrap();
        assert!(matches!(transport.close().await, Err(TransportError::Closed)));
        assert!(matches!(
            transport.handle_request(TransportRequest::get(None)).await,
            Err(TransportError::Closed)
        ));
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![
                TransportEvent::SessionClosed("session-1".to_string()),
                TransportEvent::Closed
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let transport = connected(Arc::new(RecordingObserver::default())).await;
        assert!(matches!(
            transport.connect(server()).await,
            Err(TransportError::AlreadyConnected)
        ));
    }
}
