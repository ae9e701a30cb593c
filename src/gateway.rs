//! Gateway (WebSocket) transport for the Discord API.
//!
//! Owns the connection lifecycle:
//!   - connect, receive HELLO, send IDENTIFY (or RESUME)
//!   - background heartbeat task
//!   - sequence number and session id tracking
//!   - reconnect with exponential backoff
//!   - send rate limiting (120 events / 60s)
//!
//! The bot consumes a channel of [`GatewayEvent`]s and never touches
//! `tokio_tungstenite` directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::types::GatewayPayload;

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Discord allows at most 120 gateway sends per 60 seconds.
const SEND_BUDGET_MAX: u32 = 120;
const SEND_BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// Consecutive failed reconnects before the driver gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway intent bit for guild events.
pub const INTENT_GUILDS: u32 = 1 << 0;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid gateway payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timed out waiting for HELLO")]
    HelloTimeout,

    #[error("stream ended before HELLO")]
    StreamEnded,

    #[error("unexpected gateway message: {0}")]
    Protocol(String),
}

// ---------------------------------------------------------------------------
// Send rate limiter
// ---------------------------------------------------------------------------

/// Sliding-window limiter for outbound gateway messages.
struct SendRateLimiter {
    timestamps: Vec<Instant>,
    budget: u32,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: u32, window: Duration) -> Self {
        Self {
            timestamps: Vec::with_capacity(budget as usize),
            budget,
            window,
        }
    }

    /// How long to wait before the next send at `now`, if at all.
    fn delay_at(&self, now: Instant) -> Option<Duration> {
        let in_window: Vec<Instant> = self
            .timestamps
            .iter()
            .copied()
            .filter(|&t| now.duration_since(t) < self.window)
            .collect();
        if (in_window.len() as u32) < self.budget {
            return None;
        }
        let oldest = in_window.into_iter().min()?;
        let expires_at = oldest + self.window;
        (expires_at > now).then(|| expires_at - now)
    }

    fn record_at(&mut self, now: Instant) {
        let window = self.window;
        self.timestamps.retain(|&t| now.duration_since(t) < window);
        self.timestamps.push(now);
    }
}

// ---------------------------------------------------------------------------
// Configuration and session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    /// Gateway intents bitmask.
    pub intents: u32,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    sequence: Option<u64>,
}

impl SessionState {
    /// RESUME needs both a session and a sequence number.
    fn resume_params(&self) -> Option<(&str, u64)> {
        Some((self.session_id.as_deref()?, self.sequence?))
    }

    fn forget_session(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

fn identify_payload(config: &GatewayConfig) -> Value {
    json!({
        "op": 2,
        "d": {
            "token": config.token,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "carnage-bot",
                "device": "carnage-bot"
            },
            "intents": config.intents,
        }
    })
}

fn resume_payload(token: &str, session_id: &str, seq: u64) -> Value {
    json!({
        "op": 6,
        "d": { "token": token, "session_id": session_id, "seq": seq }
    })
}

fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": 1, "d": seq })
}

/// Add the version and encoding query to a resume URL that lacks them.
fn gateway_url(resume_url: Option<&str>) -> String {
    let url = resume_url.unwrap_or(DEFAULT_GATEWAY_URL);
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&v=10&encoding=json", url)
    } else {
        format!("{}?v=10&encoding=json", url)
    }
}

/// Exponential backoff with jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jitter = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jitter.min(60_000.0) as u64)
}

// ---------------------------------------------------------------------------
// Disconnect handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    ShouldResume,
    ShouldReidentify,
    Fatal,
    EventChannelClosed,
}

/// What to do after the server closes the socket with `code`.
fn close_code_action(code: u16) -> DisconnectReason {
    match code {
        // Authentication failed, invalid shard, sharding required, invalid
        // API version, invalid or disallowed intents.
        4004 | 4010 | 4011 | 4012 | 4013 | 4014 => DisconnectReason::Fatal,
        // Invalid seq, session timed out.
        4007 | 4009 => DisconnectReason::ShouldReidentify,
        _ => DisconnectReason::ShouldResume,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

type WsConnection =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsConnection, WsMessage>;
type WsStream = futures_util::stream::SplitStream<WsConnection>;

/// Receiving end of a running gateway connection.
pub struct GatewayHandle {
    pub events: mpsc::Receiver<GatewayEvent>,
    pub driver: tokio::task::JoinHandle<()>,
}

/// Spawn the gateway driver and return the event receiver.
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (event_tx, events) = mpsc::channel::<GatewayEvent>(256);
    let driver = tokio::spawn(gateway_driver(config, event_tx));
    GatewayHandle { events, driver }
}

struct Connection {
    write: Arc<Mutex<WsSink>>,
    limiter: Arc<Mutex<SendRateLimiter>>,
}

impl Connection {
    /// Send a payload once the rate limiter allows it.
    async fn send(&self, payload: &Value) -> Result<(), GatewayError> {
        loop {
            let delay = self.limiter.lock().await.delay_at(Instant::now());
            match delay {
                Some(d) => {
                    debug!(delay_ms = d.as_millis() as u64, "gateway send rate-limited, waiting");
                    tokio::time::sleep(d).await;
                }
                None => break,
            }
        }
        self.limiter.lock().await.record_at(Instant::now());

        let text = serde_json::to_string(payload)?;
        self.write.lock().await.send(WsMessage::Text(text)).await?;
        Ok(())
    }
}

async fn gateway_driver(config: GatewayConfig, event_tx: mpsc::Sender<GatewayEvent>) {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut attempts: u32 = 0;

    loop {
        if attempts > MAX_RECONNECT_ATTEMPTS {
            error!(attempts, "exceeded max reconnect attempts, giving up");
            return;
        }
        if attempts > 0 {
            let backoff = backoff_delay(attempts);
            warn!(delay_ms = backoff.as_millis() as u64, attempt = attempts, "reconnecting after backoff");
            tokio::time::sleep(backoff).await;
        }

        let url = gateway_url(session.lock().await.resume_gateway_url.as_deref());
        info!(url = %url, "connecting to Discord gateway");

        let ws = match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                error!(error = %e, "failed to connect to gateway");
                attempts += 1;
                continue;
            }
        };
        let (write, mut read) = ws.split();
        let conn = Arc::new(Connection {
            write: Arc::new(Mutex::new(write)),
            limiter: Arc::new(Mutex::new(SendRateLimiter::new(SEND_BUDGET_MAX, SEND_BUDGET_WINDOW))),
        });

        let heartbeat_interval = match read_hello(&mut read).await {
            Ok(interval) => interval,
            Err(e) => {
                error!(error = %e, "failed to read HELLO from gateway");
                attempts += 1;
                continue;
            }
        };
        info!(interval_ms = heartbeat_interval, "received HELLO");

        let handshake = {
            let s = session.lock().await;
            match s.resume_params() {
                Some((session_id, seq)) => ("RESUME", resume_payload(&config.token, session_id, seq)),
                None => ("IDENTIFY", identify_payload(&config)),
            }
        };
        if let Err(e) = conn.send(&handshake.1).await {
            error!(error = %e, op = handshake.0, "failed to send handshake");
            attempts += 1;
            continue;
        }
        info!(op = handshake.0, "handshake sent");
        attempts = 0;

        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&conn),
            Arc::clone(&session),
            heartbeat_interval,
        ));
        let reason = read_loop(&mut read, &conn, &event_tx, &session).await;
        heartbeat.abort();
        let _ = conn.write.lock().await.send(WsMessage::Close(None)).await;

        match reason {
            DisconnectReason::ShouldResume => info!("will attempt RESUME"),
            DisconnectReason::ShouldReidentify => {
                info!("session invalidated, will re-IDENTIFY");
                session.lock().await.forget_session();
            }
            DisconnectReason::Fatal => {
                error!("fatal gateway error, shutting down");
                return;
            }
            DisconnectReason::EventChannelClosed => {
                info!("event channel closed, shutting down gateway driver");
                return;
            }
        }
        attempts += 1;
    }
}

async fn heartbeat_loop(conn: Arc<Connection>, session: Arc<Mutex<SessionState>>, interval_ms: u64) {
    // First beat after `interval * jitter`, jitter in [0, 1).
    let first = Duration::from_millis((interval_ms as f64 * rand::random::<f64>()) as u64);
    tokio::time::sleep(first).await;

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        interval.tick().await;
        let seq = session.lock().await.sequence;
        if let Err(e) = conn.send(&heartbeat_payload(seq)).await {
            warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
            return;
        }
        debug!(seq, "sent heartbeat");
    }
}

async fn read_loop(
    read: &mut WsStream,
    conn: &Connection,
    event_tx: &mpsc::Sender<GatewayEvent>,
    session: &Mutex<SessionState>,
) -> DisconnectReason {
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(frame)) => {
                let code = frame.as_ref().map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return code.map_or(DisconnectReason::ShouldResume, close_code_action);
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                return DisconnectReason::ShouldResume;
            }
        };

        let payload: GatewayPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse gateway payload");
                continue;
            }
        };
        if let Some(s) = payload.s {
            session.lock().await.sequence = Some(s);
        }

        let event = GatewayEvent::from_payload(payload);
        match &event {
            GatewayEvent::Ready(ready) => {
                let mut s = session.lock().await;
                s.session_id = Some(ready.session_id.clone());
                s.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                info!(session_id = %ready.session_id, user = %ready.user.username, "gateway READY");
            }
            GatewayEvent::HeartbeatRequest => {
                let seq = session.lock().await.sequence;
                if let Err(e) = conn.send(&heartbeat_payload(seq)).await {
                    warn!(error = %e, "failed to send requested heartbeat");
                }
                continue;
            }
            GatewayEvent::HeartbeatAck => {
                debug!("heartbeat acknowledged");
                continue;
            }
            GatewayEvent::Reconnect => {
                info!("gateway requested reconnect (op 7)");
                return DisconnectReason::ShouldResume;
            }
            GatewayEvent::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated (op 9)");
                tokio::time::sleep(Duration::from_secs(2)).await;
                return if *resumable {
                    DisconnectReason::ShouldResume
                } else {
                    DisconnectReason::ShouldReidentify
                };
            }
            _ => {}
        }

        if event_tx.send(event).await.is_err() {
            return DisconnectReason::EventChannelClosed;
        }
    }
    info!("WebSocket stream ended");
    DisconnectReason::ShouldResume
}

/// Read the HELLO payload and return its heartbeat interval in ms.
async fn read_hello(stream: &mut WsStream) -> Result<u64, GatewayError> {
    let msg = tokio::time::timeout(HELLO_TIMEOUT, stream.next())
        .await
        .map_err(|_| GatewayError::HelloTimeout)?
        .ok_or(GatewayError::StreamEnded)??;

    let WsMessage::Text(text) = msg else {
        return Err(GatewayError::Protocol(format!("expected text HELLO, got {:?}", msg)));
    };
    parse_hello(&text)
}

fn parse_hello(text: &str) -> Result<u64, GatewayError> {
    let payload: GatewayPayload = serde_json::from_str(text)?;
    if payload.op != 10 {
        return Err(GatewayError::Protocol(format!("expected op 10 (HELLO), got op {}", payload.op)));
    }
    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(Value::as_u64)
        .ok_or_else(|| GatewayError::Protocol("HELLO missing heartbeat_interval".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_until_budget_spent() {
        let mut limiter = SendRateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.delay_at(t0), None);
            limiter.record_at(t0);
        }
        let wait = limiter.delay_at(t0).unwrap();
        assert_eq!(wait, Duration::from_secs(60));
        let later = t0 + Duration::from_secs(45);
        assert_eq!(limiter.delay_at(later), Some(Duration::from_secs(15)));
    }

    #[test]
    fn limiter_frees_budget_after_window() {
        let mut limiter = SendRateLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        limiter.record_at(t0);
        assert!(limiter.delay_at(t0).is_some());
        assert_eq!(limiter.delay_at(t0 + Duration::from_secs(10)), None);
        limiter.record_at(t0 + Duration::from_secs(10));
        assert_eq!(limiter.timestamps.len(), 1);
    }

    #[test]
    fn identify_carries_token_and_intents() {
        let config = GatewayConfig {
            token: "secret".into(),
            intents: INTENT_GUILDS,
        };
        let payload = identify_payload(&config);
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "secret");
        assert_eq!(payload["d"]["intents"], 1);
    }

    #[test]
    fn resume_requires_session_and_sequence() {
        let mut s = SessionState::default();
        assert!(s.resume_params().is_none());
        s.session_id = Some("abc".into());
        assert!(s.resume_params().is_none());
        s.sequence = Some(42);
        assert_eq!(s.resume_params(), Some(("abc", 42)));
        let payload = resume_payload("tok", "abc", 42);
        assert_eq!(payload["op"], 6);
        assert_eq!(payload["d"]["seq"], 42);
        s.forget_session();
        assert!(s.resume_params().is_none());
    }

    #[test]
    fn heartbeat_sends_null_before_first_sequence() {
        assert_eq!(heartbeat_payload(None), json!({ "op": 1, "d": null }));
        assert_eq!(heartbeat_payload(Some(7))["d"], 7);
    }

    #[test]
    fn resume_url_gets_query() {
        assert_eq!(gateway_url(None), DEFAULT_GATEWAY_URL);
        assert_eq!(
            gateway_url(Some("wss://resume.discord.gg")),
            "wss://resume.discord.gg?v=10&encoding=json"
        );
        assert_eq!(
            gateway_url(Some("wss://resume.discord.gg/?x=1")),
            "wss://resume.discord.gg/?x=1&v=10&encoding=json"
        );
    }

    #[test]
    fn close_codes_classified() {
        assert_eq!(close_code_action(4004), DisconnectReason::Fatal);
        assert_eq!(close_code_action(4014), DisconnectReason::Fatal);
        assert_eq!(close_code_action(4009), DisconnectReason::ShouldReidentify);
        assert_eq!(close_code_action(1006), DisconnectReason::ShouldResume);
        assert_eq!(close_code_action(4000), DisconnectReason::ShouldResume);
    }

    #[test]
    fn hello_parsing() {
        assert_eq!(
            parse_hello(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#).unwrap(),
            41250
        );
        assert!(matches!(
            parse_hello(r#"{"op":0,"d":{},"s":1,"t":"READY"}"#),
            Err(GatewayError::Protocol(_))
        ));
        assert!(matches!(parse_hello("nope"), Err(GatewayError::Json(_))));
    }

    #[test]
    fn backoff_is_capped() {
        for attempt in 0..20 {
            assert!(backoff_delay(attempt) <= Duration::from_secs(60));
        }
    }
}
