// End-to-end: JSON-RPC over an in-memory stdio pipe against a mocked StakeKit API

use harvest_mcp::config::AppConfig;
use harvest_mcp::server::ServerComponents;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(upstream: &MockServer) -> AppConfig {
    let primary = format!("{}/v2", upstream.uri());
    let fallback = format!("{}/v1", upstream.uri());
    AppConfig::from_lookup("/nonexistent/harvest.toml", move |key| match key {
        "STAKEKIT_API_KEY" => Some("sk-integration".to_string()),
        "STAKEKIT_BASE_URL" => Some(primary.clone()),
        "STAKEKIT_FALLBACK_URL" => Some(fallback.clone()),
        "REQUEST_TIMEOUT_MS" => Some("2000".to_string()),
        _ => None,
    })
    .unwrap()
}

async fn exchange(config: &AppConfig, requests: &[Value]) -> Vec<Value> {
    let catalog = Arc::new(config.catalog_service().unwrap());
    let server = ServerComponents::for_catalog(catalog).new_server();

    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_end);
    let (client_read, mut client_write) = tokio::io::split(client_end);

    let serving = tokio::spawn(async move { server.serve(server_read, server_write).await });

    for request in requests {
        client_write
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .unwrap();
    }
    client_write.shutdown().await.unwrap();
    drop(client_write);

    let mut lines = BufReader::new(client_read).lines();
    let mut replies = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        replies.push(serde_json::from_str(&line).unwrap());
    }

    serving.await.unwrap().unwrap();
    replies
}

#[tokio::test]
async fn test_yield_details_fall_back_to_secondary_host() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/yields/base-usdc-vault"))
        .and(header("X-API-KEY", "sk-integration"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/yields/base-usdc-vault"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "base-usdc-vault",
            "network": "base",
            "apy": 0.061,
            "metadata": {"name": "USDC Vault"},
            "lifecycle": {"supportsExit": false}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let replies = exchange(
        &config_for(&upstream),
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": "2025-06-18", "capabilities": {}}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "get-yield-details",
                              "arguments": {"yieldId": "base-usdc-vault"}}}),
        ],
    )
    .await;

    // The notification gets no reply
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["result"]["protocolVersion"], "2025-06-18");

    let result = &replies[1]["result"];
    assert!(result.get("isError").map_or(true, |v| v == false));
    let overview = &result["structuredContent"]["overview"];
    assert_eq!(overview["id"], "base-usdc-vault");
    assert_eq!(overview["name"], "USDC Vault");
    assert_eq!(overview["network"], "base");
}

#[tokio::test]
async fn test_unknown_yield_is_reported_as_tool_error() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&upstream)
        .await;

    let replies = exchange(
        &config_for(&upstream),
        &[json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call",
                 "params": {"name": "get-yield-details", "arguments": {"yieldId": "nope"}}})],
    )
    .await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["id"], "a");
    let result = &replies[0]["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["code"], "NOT_FOUND");
    assert_eq!(
        result["content"][0]["text"],
        "[NOT_FOUND] Yield nope was not found. Verify the identifier using get-yield-opportunities."
    );
}
