use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::messages::{ProxyResponseType, WireMessage};

/// Cadence of server-originated pings on the proxy socket.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
/// How long a ping may go unanswered before the socket is considered dead.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-request rendezvous timeout unless the caller overrides it.
pub const DEFAULT_PROXY_TIMEOUT_MS: u64 = 60_000;
/// How long a frame may sit in the write queue before callers are failed.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent to a socket displaced by a newer connection for the same
/// user. Application range, mirroring HTTP 409.
pub const CLOSE_SUPERSEDED: u16 = 4409;
/// Close code for a handshake whose token does not match the requested user.
pub const CLOSE_UNAUTHORIZED: u16 = 4401;

/// What the socket pump writes out. `Close` asks the pump to terminate the
/// connection with the given code after draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no live extension connection")]
    NotConnected,
    #[error("extension did not answer before the timeout")]
    Timeout,
    #[error("extension write queue is saturated")]
    Backpressure,
    #[error("extension connection closed while the request was in flight")]
    Closed,
    #[error("extension reported: {0}")]
    Extension(String),
}

/// Raw upstream response as relayed by the extension.
#[derive(Debug, Clone)]
pub struct ProxyResponsePayload {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// An HTTP request to run inside the user's browser.
#[derive(Debug, Clone)]
pub struct ProxyRequestSpec {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub response_type: ProxyResponseType,
    pub include_credentials: bool,
    pub timeout_ms: u64,
}

impl ProxyRequestSpec {
    pub fn get_json(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".into(),
            headers: HashMap::new(),
            body: None,
            response_type: ProxyResponseType::Json,
            include_credentials: true,
            timeout_ms: DEFAULT_PROXY_TIMEOUT_MS,
        }
    }
}

type ReplySlot = oneshot::Sender<Result<ProxyResponsePayload, ProxyError>>;

/// One live socket. Writes are serialized through `tx`; the inflight map
/// holds the single-shot rendezvous slot per request id.
pub struct ProxySession {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<OutboundFrame>,
    inflight: DashMap<String, ReplySlot>,
    last_pong_at: RwLock<Option<Instant>>,
}

impl ProxySession {
    pub fn record_pong(&self) {
        if let Ok(mut guard) = self.last_pong_at.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn last_pong(&self) -> Option<Instant> {
        self.last_pong_at.read().ok().and_then(|guard| *guard)
    }

    /// Drop every rendezvous slot; waiting callers observe `Closed`.
    fn fail_inflight(&self) {
        self.inflight.clear();
    }
}

/// Removes the rendezvous slot even when the waiting caller is cancelled
/// mid-await, so a late reply finds nothing and is dropped.
struct SlotGuard<'a> {
    session: &'a ProxySession,
    request_id: &'a str,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.session.inflight.remove(self.request_id);
    }
}

/// Per-user connection table plus the request/response demultiplexer. One
/// session per user: a second connect displaces the first.
pub struct ProxyRouter {
    sessions: DashMap<Uuid, Arc<ProxySession>>,
    write_timeout: Duration,
}

impl ProxyRouter {
    pub fn new() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self { sessions: DashMap::new(), write_timeout }
    }

    /// Register a freshly authenticated socket. Any previous session for the
    /// same user is closed with [`CLOSE_SUPERSEDED`] and its inflight
    /// requests are failed.
    pub fn register(&self, user_id: Uuid, tx: mpsc::Sender<OutboundFrame>) -> Arc<ProxySession> {
        let session = Arc::new(ProxySession {
            user_id,
            session_id: Uuid::new_v4(),
            connected_at: Utc::now(),
            tx,
            inflight: DashMap::new(),
            last_pong_at: RwLock::new(None),
        });

        if let Some(old) = self.sessions.insert(user_id, session.clone()) {
            tracing::info!("superseding proxy session {} for user {}", old.session_id, user_id);
            old.fail_inflight();
            let _ = old.tx.try_send(OutboundFrame::Close {
                code: CLOSE_SUPERSEDED,
                reason: "superseded by a newer connection".into(),
            });
        }

        session
    }

    /// Tear down a session when its socket closes. The session id check
    /// keeps a slow-exiting pump from removing its successor.
    pub fn unregister(&self, user_id: Uuid, session_id: Uuid) {
        if let Some((_, session)) =
            self.sessions.remove_if(&user_id, |_, s| s.session_id == session_id)
        {
            session.fail_inflight();
            tracing::debug!("proxy session {} for user {} closed", session_id, user_id);
        }
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session(&self, user_id: Uuid) -> Option<Arc<ProxySession>> {
        self.sessions.get(&user_id).map(|entry| entry.clone())
    }

    /// Close every session. Used on graceful shutdown.
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.fail_inflight();
            let _ = entry.tx.try_send(OutboundFrame::Close {
                code: 1001,
                reason: "server shutting down".into(),
            });
        }
        self.sessions.clear();
    }

    /// Run one HTTP request through the user's extension and await the
    /// correlated reply.
    pub async fn proxy_http(
        &self,
        user_id: Uuid,
        spec: ProxyRequestSpec,
    ) -> Result<ProxyResponsePayload, ProxyError> {
        let session = self.session(user_id).ok_or(ProxyError::NotConnected)?;

        let request_id = Uuid::new_v4().to_string();
        let (slot, reply) = oneshot::channel();
        session.inflight.insert(request_id.clone(), slot);
        let _guard = SlotGuard { session: &session, request_id: &request_id };

        let timeout_ms = spec.timeout_ms;
        let frame = WireMessage::ProxyHttpRequest {
            request_id: request_id.clone(),
            url: spec.url,
            method: spec.method,
            headers: spec.headers,
            body: spec.body,
            response_type: spec.response_type,
            include_credentials: spec.include_credentials,
            timeout_ms,
        };
        let Ok(text) = serde_json::to_string(&frame) else {
            return Err(ProxyError::Extension("unserializable request frame".into()));
        };

        match session
            .tx
            .send_timeout(OutboundFrame::Text(text), self.write_timeout)
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(ProxyError::Backpressure),
            Err(SendTimeoutError::Closed(_)) => return Err(ProxyError::NotConnected),
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), reply).await {
            Err(_) => Err(ProxyError::Timeout),
            Ok(Err(_)) => Err(ProxyError::Closed),
            Ok(Ok(result)) => result,
        }
    }

    /// Demultiplex one inbound text frame from a user's socket.
    pub fn handle_frame(&self, user_id: Uuid, text: &str) {
        let Some(session) = self.session(user_id) else {
            tracing::warn!("frame from unregistered user {} dropped", user_id);
            return;
        };

        match serde_json::from_str::<WireMessage>(text) {
            Ok(WireMessage::Pong { .. }) => session.record_pong(),
            Ok(WireMessage::Ping { timestamp }) => {
                if let Ok(pong) = serde_json::to_string(&WireMessage::Pong { timestamp }) {
                    let _ = session.tx.try_send(OutboundFrame::Text(pong));
                }
            }
            Ok(WireMessage::ProxyHttpResponse { request_id, status_code, headers, body }) => {
                Self::complete(
                    &session,
                    &request_id,
                    Ok(ProxyResponsePayload { status_code, headers, body }),
                );
            }
            Ok(WireMessage::ProxyHttpError { request_id, error }) => {
                Self::complete(&session, &request_id, Err(ProxyError::Extension(error)));
            }
            Ok(WireMessage::ProxyHttpRequest { request_id, .. }) => {
                tracing::warn!("client-originated proxy_http_request {} ignored", request_id);
            }
            Err(e) => {
                tracing::warn!("unparseable frame from user {}: {}", user_id, e);
            }
        }
    }

    fn complete(
        session: &ProxySession,
        request_id: &str,
        result: Result<ProxyResponsePayload, ProxyError>,
    ) {
        match session.inflight.remove(request_id) {
            Some((_, slot)) => {
                // A cancelled caller has already dropped its receiver.
                let _ = slot.send(result);
            }
            None => {
                tracing::warn!("reply for unknown request_id {} dropped", request_id);
            }
        }
    }
}

impl Default for ProxyRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_frame(request_id: &str, body: &str) -> String {
        serde_json::to_string(&WireMessage::ProxyHttpResponse {
            request_id: request_id.into(),
            status_code: 200,
            headers: HashMap::new(),
            body: body.into(),
        })
        .unwrap()
    }

    async fn next_request_id(rx: &mut mpsc::Receiver<OutboundFrame>) -> String {
        match rx.recv().await.expect("no frame written") {
            OutboundFrame::Text(text) => match serde_json::from_str(&text).unwrap() {
                WireMessage::ProxyHttpRequest { request_id, .. } => request_id,
                other => panic!("unexpected outbound frame: {:?}", other),
            },
            OutboundFrame::Close { .. } => panic!("unexpected close frame"),
        }
    }

    #[tokio::test]
    async fn request_and_reply_correlate() {
        let router = Arc::new(ProxyRouter::new());
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        router.register(user, tx);

        let router_clone = router.clone();
        let responder = tokio::spawn(async move {
            let request_id = next_request_id(&mut rx).await;
            router_clone.handle_frame(user, &response_frame(&request_id, "{\"ok\":true}"));
        });

        let reply = router
            .proxy_http(user, ProxyRequestSpec::get_json("https://www.linkedin.com/x"))
            .await
            .expect("proxy call failed");
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.body, "{\"ok\":true}");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_cross_talk() {
        let router = Arc::new(ProxyRouter::new());
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        router.register(user, tx);

        let router_clone = router.clone();
        let responder = tokio::spawn(async move {
            let first = next_request_id(&mut rx).await;
            let second = next_request_id(&mut rx).await;
            // Answer in reverse order; each caller must still get its own.
            router_clone.handle_frame(user, &response_frame(&second, &format!("id:{}", second)));
            router_clone.handle_frame(user, &response_frame(&first, &format!("id:{}", first)));
        });

        let mut spec_a = ProxyRequestSpec::get_json("https://www.linkedin.com/a");
        spec_a.timeout_ms = 5_000;
        let mut spec_b = ProxyRequestSpec::get_json("https://www.linkedin.com/b");
        spec_b.timeout_ms = 5_000;

        let (a, b) = tokio::join!(router.proxy_http(user, spec_a), router.proxy_http(user, spec_b));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.body, b.body);
        assert!(a.body.starts_with("id:"));
        assert!(b.body.starts_with("id:"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn timeout_removes_slot_and_drops_late_reply() {
        let router = Arc::new(ProxyRouter::new());
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        router.register(user, tx);

        let mut spec = ProxyRequestSpec::get_json("https://www.linkedin.com/slow");
        spec.timeout_ms = 50;

        let result = router.proxy_http(user, spec).await;
        assert!(matches!(result, Err(ProxyError::Timeout)));

        // The late reply hits an empty inflight map and is dropped silently.
        let request_id = next_request_id(&mut rx).await;
        router.handle_frame(user, &response_frame(&request_id, "late"));
        assert!(router.session(user).unwrap().inflight.is_empty());
    }

    #[tokio::test]
    async fn duplicate_replies_deliver_exactly_once() {
        let router = Arc::new(ProxyRouter::new());
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        router.register(user, tx);

        let router_clone = router.clone();
        let responder = tokio::spawn(async move {
            let request_id = next_request_id(&mut rx).await;
            router_clone.handle_frame(user, &response_frame(&request_id, "first"));
            router_clone.handle_frame(user, &response_frame(&request_id, "second"));
        });

        let reply = router
            .proxy_http(user, ProxyRequestSpec::get_json("https://www.linkedin.com/x"))
            .await
            .unwrap();
        assert_eq!(reply.body, "first");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn second_connection_supersedes_first() {
        let router = Arc::new(ProxyRouter::new());
        let user = Uuid::new_v4();

        let (tx1, mut rx1) = mpsc::channel(8);
        let first = router.register(user, tx1);

        let router_clone = router.clone();
        let mut pending_spec = ProxyRequestSpec::get_json("https://www.linkedin.com/pending");
        pending_spec.timeout_ms = 5_000;
        let pending = tokio::spawn(async move { router_clone.proxy_http(user, pending_spec).await });

        // Wait for the request frame to be written before superseding.
        let _ = next_request_id(&mut rx1).await;

        let (tx2, _rx2) = mpsc::channel(8);
        let second = router.register(user, tx2);
        assert_ne!(first.session_id, second.session_id);

        match rx1.recv().await.expect("no close frame") {
            OutboundFrame::Close { code, .. } => assert_eq!(code, CLOSE_SUPERSEDED),
            other => panic!("expected close, got {:?}", other),
        }

        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, Err(ProxyError::Closed)));
        assert_eq!(router.session(user).unwrap().session_id, second.session_id);
    }

    #[tokio::test]
    async fn saturated_writer_fails_with_backpressure() {
        let router = Arc::new(ProxyRouter::with_write_timeout(Duration::from_millis(50)));
        let user = Uuid::new_v4();
        // Capacity one and nobody draining: the first request occupies the
        // queue, the second cannot enqueue.
        let (tx, _rx) = mpsc::channel(1);
        router.register(user, tx);

        let router_clone = router.clone();
        let mut first = ProxyRequestSpec::get_json("https://www.linkedin.com/one");
        first.timeout_ms = 300;
        let occupant = tokio::spawn(async move { router_clone.proxy_http(user, first).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut second = ProxyRequestSpec::get_json("https://www.linkedin.com/two");
        second.timeout_ms = 300;
        let result = router.proxy_http(user, second).await;
        assert!(matches!(result, Err(ProxyError::Backpressure)));

        let _ = occupant.await.unwrap();
    }

    #[tokio::test]
    async fn stale_unregister_keeps_successor() {
        let router = ProxyRouter::new();
        let user = Uuid::new_v4();

        let (tx1, _rx1) = mpsc::channel(8);
        let first = router.register(user, tx1);
        let (tx2, _rx2) = mpsc::channel(8);
        let second = router.register(user, tx2);

        router.unregister(user, first.session_id);
        assert!(router.is_connected(user));
        assert_eq!(router.session(user).unwrap().session_id, second.session_id);

        router.unregister(user, second.session_id);
        assert!(!router.is_connected(user));
    }

    #[tokio::test]
    async fn no_session_fails_fast() {
        let router = ProxyRouter::new();
        let result = router
            .proxy_http(Uuid::new_v4(), ProxyRequestSpec::get_json("https://www.linkedin.com/x"))
            .await;
        assert!(matches!(result, Err(ProxyError::NotConnected)));
    }
}
