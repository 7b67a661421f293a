//! HTTP transport layer for the Harvest SDK.
//!
//! Every logical request starts on the primary host. A 404 or 204 from the
//! primary moves the request to the fallback host once, without spending
//! retry budget. Retryable statuses and transport failures are retried on
//! whichever host is active with exponential backoff plus jitter. A 401
//! fails immediately.

use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult, CREDENTIALS_MESSAGE, UNREACHABLE_MESSAGE};
use harvest_core::types::Source;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Header carrying the StakeKit API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";
/// Header carrying the caller's correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Decoded upstream answer together with the host that served it.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub data: Value,
    pub source: Source,
    pub status: u16,
}

/// One logical upstream request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub request_id: Option<String>,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
            request_id: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// What went wrong on a single attempt.
#[derive(Debug)]
struct Failure {
    status: Option<u16>,
    code: Option<String>,
    message: String,
    data: Option<Value>,
    unreachable: bool,
}

impl Failure {
    fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let data = if body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(body)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())),
            )
        };
        Self {
            status: Some(status.as_u16()),
            code: None,
            message: format!("Request failed with status code {}", status.as_u16()),
            data,
            unreachable: false,
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        let unreachable = is_network_unreachable(&err);
        let code = if unreachable {
            Some("ENETUNREACH")
        } else if err.is_timeout() {
            Some("TIMEOUT")
        } else if err.is_connect() {
            Some("CONNECT")
        } else if err.is_body() || err.is_decode() {
            Some("BODY")
        } else {
            None
        };
        Self {
            status: err.status().map(|s| s.as_u16()),
            code: code.map(str::to_string),
            message: err.to_string(),
            data: None,
            unreachable,
        }
    }

    fn into_error(self) -> SdkError {
        let details = json!({
            "status": self.status,
            "code": self.code,
            "data": self.data,
            "message": self.message,
        });
        let message = match self.status {
            Some(401 | 403) => CREDENTIALS_MESSAGE.to_string(),
            _ if self.unreachable => UNREACHABLE_MESSAGE.to_string(),
            Some(status) => format!("StakeKit request failed with status {}.", status),
            None => "StakeKit request failed.".to_string(),
        };
        SdkError::Upstream {
            message,
            status: self.status,
            code: self.code,
            details,
        }
    }
}

/// Walk the error chain looking for an unreachable-network socket error.
fn is_network_unreachable(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::NetworkUnreachable {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Percent-encode `segment` so it joins as exactly one path segment.
pub fn encode_path_segment(segment: &str) -> SdkResult<String> {
    if matches!(segment, "" | "." | "..") {
        return Err(SdkError::InvalidArgument(format!(
            "'{}' is not a valid path segment",
            segment
        )));
    }
    let mut scratch = Url::parse("http://segment.invalid/")?;
    scratch
        .path_segments_mut()
        .map_err(|_| SdkError::InvalidArgument(segment.to_string()))?
        .pop_if_empty()
        .push(segment);
    Ok(scratch.path().trim_start_matches('/').to_string())
}

/// Join `path` onto `base`, keeping any path prefix the base carries.
fn join_path(base: &Url, path: &str) -> SdkResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

fn decode_body(status: u16, body: &[u8]) -> SdkResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| SdkError::Upstream {
        message: "StakeKit returned a response that is not valid JSON.".to_string(),
        status: Some(status),
        code: None,
        details: json!({ "status": status, "error": e.to_string() }),
    })
}

/// HTTP transport for the primary and fallback StakeKit hosts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ClientConfig>) -> SdkResult<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::HeaderName::from_static("x-api-key"),
            header::HeaderValue::from_str(&config.api_key)
                .map_err(|_| SdkError::Config("Invalid API key format".to_string()))?,
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Build the URL for `path` on the given host.
    pub fn build_url(&self, source: Source, path: &str) -> SdkResult<Url> {
        match source {
            Source::Primary => join_path(&self.config.primary_url, path),
            Source::Fallback => join_path(&self.config.fallback_url, path),
        }
    }

    /// Execute a GET request with query parameters.
    pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> SdkResult<UpstreamResponse> {
        self.execute(UpstreamRequest::get(path).query(query)).await
    }

    /// Execute a POST request with a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> SdkResult<UpstreamResponse> {
        self.execute(UpstreamRequest::post(path, body)).await
    }

    /// Send one attempt and read its body.
    async fn send_once(
        &self,
        request: &UpstreamRequest,
        url: &Url,
        source: Source,
    ) -> Result<(u16, Vec<u8>), Failure> {
        let mut builder = self.client.request(request.method.clone(), url.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(request_id) = &request.request_id {
            builder = builder.header(REQUEST_ID_HEADER, request_id);
        }

        let response = builder.send().await.map_err(Failure::from_transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(Failure::from_transport)?;

        let retry = &self.config.retry_config;
        if !status.is_success()
            || (source == Source::Primary && retry.should_fallback_status(status.as_u16()))
        {
            return Err(Failure::from_status(status, &body));
        }

        Ok((status.as_u16(), body.to_vec()))
    }

    /// Execute a logical request across retries and the fallback host.
    pub async fn execute(&self, request: UpstreamRequest) -> SdkResult<UpstreamResponse> {
        let retry = &self.config.retry_config;
        let primary = self.build_url(Source::Primary, &request.path)?;
        let fallback = self.build_url(Source::Fallback, &request.path)?;
        let method = request.method.as_str();
        let request_id = request.request_id.as_deref();

        let mut attempt: u32 = 0;
        let mut source = Source::Primary;

        loop {
            let url = match source {
                Source::Primary => &primary,
                Source::Fallback => &fallback,
            };
            let started = Instant::now();
            let outcome = self.send_once(&request, url, source).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok((status, body)) => {
                    info!(
                        method,
                        url = %url,
                        status,
                        attempt,
                        duration_ms,
                        host = %source,
                        request_id,
                        "StakeKit request completed"
                    );
                    let data = decode_body(status, &body)?;
                    return Ok(UpstreamResponse {
                        data,
                        source,
                        status,
                    });
                }
                Err(failure) => failure,
            };

            warn!(
                method,
                url = %url,
                status = failure.status,
                attempt,
                duration_ms,
                host = %source,
                request_id,
                code = failure.code.as_deref(),
                error = %failure.message,
                "StakeKit request failed"
            );

            if failure.status == Some(401) {
                error!(url = %url, "Authentication failed for StakeKit request");
                return Err(failure.into_error());
            }

            if source == Source::Primary
                && failure
                    .status
                    .is_some_and(|status| retry.should_fallback_status(status))
            {
                info!(url = %url, "Retrying StakeKit request via fallback host");
                source = Source::Fallback;
                attempt = 0;
                continue;
            }

            let retryable = failure
                .status
                .map_or(true, |status| retry.should_retry_status(status));
            if attempt < retry.max_retries && retryable {
                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(failure.into_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_config(primary: &str, fallback: &str, retry_config: RetryConfig) -> Arc<ClientConfig> {
        Arc::new(ClientConfig {
            primary_url: Url::parse(primary).unwrap(),
            fallback_url: Url::parse(fallback).unwrap(),
            api_key: "sk-test".to_string(),
            timeout: Duration::from_secs(5),
            retry_config,
        })
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::with_fixed_delay(Duration::from_millis(1))
    }

    async fn servers() -> (MockServer, MockServer, HttpTransport) {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        let config = create_config(
            &format!("{}/v2", primary.uri()),
            &format!("{}/v1", fallback.uri()),
            fast_retry(),
        );
        let transport = HttpTransport::new(config).unwrap();
        (primary, fallback, transport)
    }

    fn upstream_status(err: &SdkError) -> Option<u16> {
        match err {
            SdkError::Upstream { status, .. } => *status,
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_sends_api_key_and_query() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .and(path("/v2/yields"))
            .and(query_param("limit", "200"))
            .and(header("X-API-KEY", "sk-test"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&primary)
            .await;

        let response = transport
            .get("/yields", vec![("limit".to_string(), "200".to_string())])
            .await
            .unwrap();

        assert_eq!(response.source, Source::Primary);
        assert_eq!(response.status, 200);
        assert_eq!(response.data, json!({"data": []}));
    }

    #[tokio::test]
    async fn test_request_id_header() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .and(path("/v2/networks"))
            .and(header("x-request-id", "req-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&primary)
            .await;

        let request = UpstreamRequest::get("/networks").request_id(Some("req-42".to_string()));
        transport.execute(request).await.unwrap();
    }

    #[tokio::test]
    async fn test_primary_404_falls_back() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .and(path("/v2/yields/eth-lido"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/yields/eth-lido"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "eth-lido"})))
            .expect(1)
            .mount(&fallback)
            .await;

        let response = transport.get("/yields/eth-lido", Vec::new()).await.unwrap();
        assert_eq!(response.source, Source::Fallback);
        assert_eq!(response.data["id"], "eth-lido");
    }

    #[tokio::test]
    async fn test_primary_204_falls_back() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "a"}])))
            .expect(1)
            .mount(&fallback)
            .await;

        let response = transport.get("/tokens", Vec::new()).await.unwrap();
        assert_eq!(response.source, Source::Fallback);
    }

    #[tokio::test]
    async fn test_retry_then_success_on_primary() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fallback)
            .await;

        let response = transport.get("/networks", Vec::new()).await.unwrap();
        assert_eq!(response.source, Source::Primary);
        assert_eq!(response.data, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_401_fails_without_retry() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fallback)
            .await;

        let err = transport.get("/networks", Vec::new()).await.unwrap_err();
        assert_eq!(upstream_status(&err), Some(401));
        assert_eq!(err.to_string(), CREDENTIALS_MESSAGE);
    }

    #[tokio::test]
    async fn test_403_gives_credential_guidance() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "forbidden"})))
            .expect(1)
            .mount(&primary)
            .await;

        let err = transport.get("/networks", Vec::new()).await.unwrap_err();
        assert_eq!(upstream_status(&err), Some(403));
        assert_eq!(err.to_string(), CREDENTIALS_MESSAGE);
        match err {
            SdkError::Upstream { details, .. } => {
                assert_eq!(details["data"]["message"], "forbidden");
            }
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4)
            .mount(&primary)
            .await;

        let err = transport.get("/networks", Vec::new()).await.unwrap_err();
        assert_eq!(upstream_status(&err), Some(503));
        assert_eq!(err.to_string(), "StakeKit request failed with status 503.");
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_once() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&primary)
            .await;

        let err = transport.get("/yields", Vec::new()).await.unwrap_err();
        assert_eq!(upstream_status(&err), Some(400));
    }

    #[tokio::test]
    async fn test_fallback_404_is_terminal() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&fallback)
            .await;

        let err = transport.get("/yields/missing", Vec::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_retries_apply_on_fallback_host() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&fallback)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&fallback)
            .await;

        let response = transport.get("/yields", Vec::new()).await.unwrap();
        assert_eq!(response.source, Source::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_host_gets_fresh_retry_budget() {
        let (primary, fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .expect(3)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&fallback)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x"})))
            .expect(1)
            .mount(&fallback)
            .await;

        let response = transport.get("/x", Vec::new()).await.unwrap();
        assert_eq!(response.source, Source::Fallback);
        assert_eq!(response.data["id"], "x");
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("POST"))
            .and(path("/v2/actions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&primary)
            .await;

        let response = transport.post("/actions", json!({"x": 1})).await.unwrap();
        assert_eq!(response.data, Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_json_is_upstream_error() {
        let (primary, _fallback, transport) = servers().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&primary)
            .await;

        let err = transport.get("/networks", Vec::new()).await.unwrap_err();
        assert_eq!(upstream_status(&err), Some(200));
    }

    #[tokio::test]
    async fn test_transport_failure_is_retried() {
        let config = create_config(
            "http://127.0.0.1:1/v2",
            "http://127.0.0.1:1/v1",
            fast_retry(),
        );
        let transport = HttpTransport::new(config).unwrap();

        let err = transport.get("/networks", Vec::new()).await.unwrap_err();
        assert_eq!(upstream_status(&err), None);
        assert_eq!(err.to_string(), "StakeKit request failed.");
    }

    #[tokio::test]
    async fn test_build_url_keeps_base_path() {
        let config = create_config(
            "https://api.stakek.it/v2",
            "https://api.yield.xyz/v1/",
            RetryConfig::no_retry(),
        );
        let transport = HttpTransport::new(config).unwrap();

        let url = transport.build_url(Source::Primary, "/networks").unwrap();
        assert_eq!(url.as_str(), "https://api.stakek.it/v2/networks");

        let url = transport.build_url(Source::Fallback, "yields/eth-lido").unwrap();
        assert_eq!(url.as_str(), "https://api.yield.xyz/v1/yields/eth-lido");
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("eth-lido").unwrap(), "eth-lido");
        assert_eq!(
            encode_path_segment("../networks?x=1#frag").unwrap(),
            "..%2Fnetworks%3Fx=1%23frag"
        );
        assert_eq!(encode_path_segment("100%").unwrap(), "100%25");

        for bad in ["", ".", ".."] {
            assert!(matches!(
                encode_path_segment(bad),
                Err(SdkError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_encoded_segment_stays_under_base() {
        let config = create_config(
            "https://api.stakek.it/v2",
            "https://api.yield.xyz/v1",
            RetryConfig::no_retry(),
        );
        let transport = HttpTransport::new(config).unwrap();

        let path = format!("/yields/{}", encode_path_segment("../networks").unwrap());
        let url = transport.build_url(Source::Primary, &path).unwrap();
        assert_eq!(url.as_str(), "https://api.stakek.it/v2/yields/..%2Fnetworks");
    }
}
