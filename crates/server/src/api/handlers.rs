use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use harvest_mcp::protocol::{JsonRpcError, JsonRpcResponse};
use harvest_mcp::session::SessionState;
use harvest_mcp::transport::{TransportMethod, TransportRequest, TransportResponse, SESSION_HEADER};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

const SESSION_HEADER_NAME: HeaderName = HeaderName::from_static("mcp-session-id");

/// Single entry point for `POST`, `GET` and `DELETE /mcp`.
pub async fn handle_mcp(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("mcp_http", %request_id, %method);
    dispatch(state, method, headers, body).instrument(span).await
}

async fn dispatch(state: Arc<AppState>, method: Method, headers: HeaderMap, body: Bytes) -> Response {
    let started = Instant::now();

    let transport_method = match method {
        Method::POST => TransportMethod::Post,
        Method::GET => TransportMethod::Get,
        Method::DELETE => TransportMethod::Delete,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let body = if transport_method == TransportMethod::Post {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed MCP request body");
                return rpc_error(StatusCode::BAD_REQUEST, JsonRpcError::parse_error());
            }
        }
    } else {
        None
    };

    let registry = &state.registry;
    let (session, created) = match registry.get(session_id.as_deref()) {
        Some(session) => (session, false),
        None if transport_method == TransportMethod::Post => match registry.create_session().await {
            Ok(session) => (session, true),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create MCP session");
                return internal_error();
            }
        },
        None => {
            tracing::warn!(path = "/mcp", "HTTP request missing session identifier");
            return rpc_error(
                StatusCode::BAD_REQUEST,
                JsonRpcError::session_error("Bad Request: missing or unknown MCP session id"),
            );
        }
    };

    registry.touch(&session);
    let result = session
        .transport()
        .handle_request(TransportRequest {
            method: transport_method,
            session_id,
            body,
        })
        .await;

    // A fresh session that did not complete initialize is never addressable again
    if created && session.state() == SessionState::Pending {
        registry.destroy_session(&session).await;
    }

    match result {
        Ok(response) => {
            tracing::info!(
                session_id = %session.id(),
                status = response.status,
                duration_ms = started.elapsed().as_millis() as u64,
                "Handled MCP HTTP request"
            );
            render(response)
        }
        Err(e) => {
            tracing::error!(session_id = %session.id(), error = %e, "Failed to handle MCP HTTP request");
            internal_error()
        }
    }
}

fn render(response: TransportResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut rendered = match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };
    if let Some(value) = response
        .session_id
        .and_then(|id| HeaderValue::from_str(&id).ok())
    {
        rendered.headers_mut().insert(SESSION_HEADER_NAME, value);
    }
    rendered
}

fn rpc_error(status: StatusCode, error: JsonRpcError) -> Response {
    (status, Json(JsonRpcResponse::error(Value::Null, error))).into_response()
}

fn internal_error() -> Response {
    rpc_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        JsonRpcError::internal_error("Internal server error"),
    )
}
