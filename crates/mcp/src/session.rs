//! Session registry for Streamable HTTP.
//!
//! A session starts `Pending` when created for an `initialize` request and
//! becomes `Active` once its transport reports [`TransportEvent::Initialized`].
//! Teardown is guarded by a single compare-and-set on the session state, so a
//! session is closed exactly once no matter how many sweeps, deletes or
//! shutdowns race for it.

use crate::server::{McpServer, ServerComponents};
use crate::transport::{
    SessionTransport, StreamableHttpTransport, TransportError, TransportEvent, TransportObserver,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to connect session transport: {0}")]
    Connect(#[source] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Pending = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Builds a fresh server for each session
pub type ServerFactory = Arc<dyn Fn() -> McpServer + Send + Sync>;

/// Builds the transport for a session id, reporting to the given observer
pub type TransportFactory =
    Arc<dyn Fn(String, Arc<dyn TransportObserver>) -> Arc<dyn SessionTransport> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

pub struct Session {
    id: String,
    server: Arc<McpServer>,
    transport: Arc<dyn SessionTransport>,
    state: AtomicU8,
    last_used: Mutex<Instant>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    pub fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }

    fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Pending as u8,
                SessionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Take the teardown latch. Only one caller ever gets `true`.
    fn claim(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Observer handed to a session's transport
struct SessionObserver {
    registry: Weak<SessionRegistry>,
    session_id: String,
}

impl TransportObserver for SessionObserver {
    fn notify(&self, event: TransportEvent) {
        if let Some(registry) = self.registry.upgrade() {
            registry.handle_event(&self.session_id, event);
        }
    }
}

pub struct SessionRegistry {
    pending: Mutex<HashMap<String, Arc<Session>>>,
    active: Mutex<HashMap<String, Arc<Session>>>,
    server_factory: ServerFactory,
    transport_factory: TransportFactory,
    config: SessionConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(
        server_factory: ServerFactory,
        transport_factory: TransportFactory,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            pending: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            server_factory,
            transport_factory,
            config,
            sweeper: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// Registry serving Streamable HTTP sessions over shared components.
    pub fn streamable_http(components: ServerComponents, config: SessionConfig) -> Arc<Self> {
        Self::new(
            Arc::new(move || components.new_server()),
            Arc::new(|session_id: String, observer: Arc<dyn TransportObserver>| {
                Arc::new(StreamableHttpTransport::new(session_id, observer))
                    as Arc<dyn SessionTransport>
            }),
            config,
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a pending session with a connected transport.
    pub async fn create_session(&self) -> Result<Arc<Session>, SessionError> {
        let id = Uuid::new_v4().to_string();
        let server = Arc::new((self.server_factory)());
        let observer: Arc<dyn TransportObserver> = Arc::new(SessionObserver {
            registry: self.self_ref.clone(),
            session_id: id.clone(),
        });
        let transport = (self.transport_factory)(id.clone(), observer);

        let session = Arc::new(Session {
            id: id.clone(),
            server: server.clone(),
            transport,
            state: AtomicU8::new(SessionState::Pending as u8),
            last_used: Mutex::new(Instant::now()),
        });
        self.pending.lock().unwrap().insert(id.clone(), session.clone());

        if let Err(e) = session.transport.connect(server).await {
            warn!(session_id = %id, error = %e, "Session transport failed to connect");
            self.pending.lock().unwrap().remove(&id);
            self.destroy_session(&session).await;
            return Err(SessionError::Connect(e));
        }

        debug!(session_id = %id, "Session created");
        Ok(session)
    }

    /// Apply a transport lifecycle event to the session it came from.
    pub fn handle_event(&self, session_id: &str, event: TransportEvent) {
        match event {
            TransportEvent::Initialized(id) => {
                let session = self.pending.lock().unwrap().remove(session_id);
                match session {
                    Some(session) if session.activate() => {
                        session.touch();
                        self.active.lock().unwrap().insert(id.clone(), session);
                        info!(session_id = %id, "Session active");
                    }
                    Some(_) => debug!(session_id = %id, "Session closed before activation"),
                    None => warn!(session_id = %id, "Initialized event for unknown session"),
                }
            }
            TransportEvent::SessionClosed(id) => {
                let session = self.find(&id);
                match (session, self.self_ref.upgrade()) {
                    (Some(session), Some(registry)) => {
                        tokio::spawn(async move {
                            registry.destroy_session(&session).await;
                        });
                    }
                    _ => debug!(session_id = %id, "Close requested for unknown session"),
                }
            }
            TransportEvent::Error(message) => {
                warn!(session_id, error = %message, "Session transport error");
            }
            TransportEvent::Closed => {
                self.active.lock().unwrap().remove(session_id);
                debug!(session_id, "Session transport closed");
            }
        }
    }

    fn find(&self, session_id: &str) -> Option<Arc<Session>> {
        let active = self.active.lock().unwrap().get(session_id).cloned();
        active.or_else(|| self.pending.lock().unwrap().get(session_id).cloned())
    }

    /// Active session by id.
    pub fn get(&self, session_id: Option<&str>) -> Option<Arc<Session>> {
        let session_id = session_id?;
        self.active.lock().unwrap().get(session_id).cloned()
    }

    pub fn touch(&self, session: &Session) {
        session.touch();
    }

    /// Tear a session down; returns false when someone else already is.
    pub async fn destroy_session(&self, session: &Arc<Session>) -> bool {
        if !session.claim() {
            return false;
        }
        self.teardown(session).await;
        true
    }

    async fn teardown(&self, session: &Arc<Session>) {
        self.pending.lock().unwrap().remove(&session.id);
        self.active.lock().unwrap().remove(&session.id);

        if let Err(e) = session.transport.close().await {
            warn!(session_id = %session.id, error = %e, "Failed to close session transport");
        }
        if let Err(e) = session.server.close() {
            warn!(session_id = %session.id, error = %e, "Failed to close session server");
        }

        session
            .state
            .store(SessionState::Closed as u8, Ordering::Release);
        info!(session_id = %session.id, "Session closed");
    }

    /// Close every active session idle longer than the idle TTL.
    pub async fn evict_idle_sessions(&self) -> usize {
        let claimed: Vec<Arc<Session>> = {
            let active = self.active.lock().unwrap();
            active
                .values()
                .filter(|s| s.idle_for() > self.config.idle_ttl)
                .filter(|s| s.claim())
                .cloned()
                .collect()
        };

        for session in &claimed {
            debug!(session_id = %session.id, idle_ms = session.idle_for().as_millis() as u64, "Evicting idle session");
            self.teardown(session).await;
        }
        claimed.len()
    }

    /// Sweep idle sessions on an interval until shutdown.
    pub fn start_sweeper(&self) {
        let registry = self.self_ref.clone();
        let period = self.config.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_idle_sessions().await;
                if evicted > 0 {
                    info!(evicted, "Evicted idle sessions");
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the sweeper and close every session.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }

        let mut sessions: Vec<Arc<Session>> =
            self.pending.lock().unwrap().values().cloned().collect();
        sessions.extend(self.active.lock().unwrap().values().cloned());

        let count = sessions.len();
        for session in &sessions {
            self.destroy_session(session).await;
        }
        info!(sessions = count, "Session registry shut down");
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportRequest, TransportResponse, TransportResult};
    use harvest_sdk::{CatalogConfig, CatalogService, RetryConfig, StakeKitClient};
    use std::sync::atomic::AtomicUsize;

    /// Transport that counts closes and can refuse to connect
    struct CountingTransport {
        closes: Arc<AtomicUsize>,
        fail_connect: bool,
    }

    #[async_trait::async_trait]
    impl SessionTransport for CountingTransport {
        async fn connect(&self, _server: Arc<McpServer>) -> TransportResult<()> {
            if self.fail_connect {
                return Err(TransportError::NotConnected);
            }
            Ok(())
        }

        async fn handle_request(&self, _request: TransportRequest) -> TransportResult<TransportResponse> {
            Err(TransportError::NotConnected)
        }

        async fn close(&self) -> TransportResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn components() -> ServerComponents {
        let client = StakeKitClient::builder()
            .primary_url("http://127.0.0.1:1/v2")
            .api_key("sk-test")
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap();
        ServerComponents::for_catalog(Arc::new(CatalogService::new(
            client,
            CatalogConfig::default(),
        )))
    }

    fn counting_registry(
        closes: Arc<AtomicUsize>,
        fail_connect: bool,
        config: SessionConfig,
    ) -> Arc<SessionRegistry> {
        let components = components();
        SessionRegistry::new(
            Arc::new(move || components.new_server()),
            Arc::new(move |_id: String, _observer: Arc<dyn TransportObserver>| {
                Arc::new(CountingTransport {
                    closes: closes.clone(),
                    fail_connect,
                }) as Arc<dyn SessionTransport>
            }),
            config,
        )
    }

    async fn active_session(registry: &SessionRegistry) -> Arc<Session> {
        let session = registry.create_session().await.unwrap();
        registry.handle_event(
            session.id(),
            TransportEvent::Initialized(session.id().to_string()),
        );
        session
    }

    #[tokio::test]
    async fn test_pending_to_active() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes, false, SessionConfig::default());

        let session = registry.create_session().await.unwrap();
        assert_eq!(registry.pending_count(), 1);
        assert!(registry.get(Some(session.id())).is_none());

        registry.handle_event(
            session.id(),
            TransportEvent::Initialized(session.id().to_string()),
        );
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.active_count(), 1);
        assert_eq!(session.state(), SessionState::Active);
        assert!(registry.get(Some(session.id())).is_some());
        assert!(registry.get(None).is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_tears_down() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes.clone(), true, SessionConfig::default());

        let err = registry.create_session().await.err().unwrap();
        assert!(matches!(err, SessionError::Connect(_)));
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes.clone(), false, SessionConfig::default());
        let session = active_session(&registry).await;

        assert!(registry.destroy_session(&session).await);
        assert!(!registry.destroy_session(&session).await);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.server().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_idle_sessions_are_evicted() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes.clone(), false, SessionConfig::default());
        let idle = active_session(&registry).await;
        let busy = active_session(&registry).await;

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        registry.touch(&busy);
        tokio::time::advance(Duration::from_secs(2 * 60)).await;

        assert_eq!(registry.evict_idle_sessions().await, 1);
        assert_eq!(idle.state(), SessionState::Closed);
        assert_eq!(busy.state(), SessionState::Active);
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evictions_tear_down_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(
            closes.clone(),
            false,
            SessionConfig {
                idle_ttl: Duration::from_millis(10),
                ..Default::default()
            },
        );
        active_session(&registry).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let sweeps: Vec<_> = (0..3)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.evict_idle_sessions().await })
            })
            .collect();

        let mut evicted = 0;
        for sweep in sweeps {
            evicted += sweep.await.unwrap();
        }

        assert_eq!(evicted, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_session_closed_event_destroys_session() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes.clone(), false, SessionConfig::default());
        let session = active_session(&registry).await;

        registry.handle_event(
            session.id(),
            TransportEvent::SessionClosed(session.id().to_string()),
        );
        for _ in 0..100 {
            if session.state() == SessionState::Closed {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes.clone(), false, SessionConfig::default());
        active_session(&registry).await;
        registry.create_session().await.unwrap();
        registry.start_sweeper();

        registry.shutdown().await;

        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_interval() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(closes.clone(), false, SessionConfig::default());
        let session = active_session(&registry).await;
        registry.start_sweeper();

        tokio::time::sleep(Duration::from_secs(6 * 60 + 1)).await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_streamable_http_lifecycle() {
        let registry = SessionRegistry::streamable_http(components(), SessionConfig::default());
        let session = registry.create_session().await.unwrap();

        let response = session
            .transport()
            .handle_request(TransportRequest::post(
                None,
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "initialize",
                    "params": {"protocolVersion": "2025-06-18"}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.session_id.as_deref(), Some(session.id()));
        assert_eq!(registry.active_count(), 1);

        registry.destroy_session(&session).await;
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.pending_count(), 0);
    }
}
