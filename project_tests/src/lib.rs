//! Wire-level test client for driving sessions without a socket.
//!
//! A [`WireClient`] owns one [`Session`] and the receiving end of its
//! outbound channel. It writes request documents as text frames and reads
//! replies back, reassembling the count frame and its chunks.

use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use lib_rtdb::core::Session;
use lib_rtdb::error::FrameError;
use lib_rtdb::RtdbServer;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long a reply may take before a test fails.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WireClient {
    session: Session,
    inbound: mpsc::UnboundedReceiver<String>,
    next_request: u64,
}

impl WireClient {
    /// Opens a session on `server`. The handshake is left unread.
    pub fn connect(server: &RtdbServer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = server.connections().accept(tx);
        Self {
            session,
            inbound: rx,
            next_request: 1,
        }
    }

    /// Opens a session and consumes the handshake.
    pub async fn connect_ready(server: &RtdbServer) -> Self {
        let mut client = Self::connect(server);
        let handshake = client.next_message().await;
        assert_eq!(handshake["t"], "c", "expected a handshake, got {handshake}");
        client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn send_raw(&mut self, frame: &str) -> Result<(), FrameError> {
        self.session.receive(frame)
    }

    pub fn send(&mut self, document: &Value) -> Result<(), FrameError> {
        self.send_raw(&document.to_string())
    }

    /// Sends `document` split into pieces of at most `piece` characters.
    pub fn send_fragmented(&mut self, document: &Value, piece: usize) -> Result<(), FrameError> {
        let text: Vec<char> = document.to_string().chars().collect();
        for chunk in text.chunks(piece.max(1)) {
            let frame: String = chunk.iter().collect();
            self.send_raw(&frame)?;
        }
        Ok(())
    }

    /// Sends a data request and returns its request id.
    pub fn request(&mut self, action: &str, body: Value) -> u64 {
        let r = self.next_request;
        self.next_request += 1;
        let frame = json!({"t": "d", "d": {"r": r, "a": action, "b": body}});
        self.send(&frame).expect("request frame fits the buffer");
        r
    }

    /// Next complete outbound message. Panics after [`REPLY_TIMEOUT`].
    pub async fn next_message(&mut self) -> Value {
        match self.try_next_message(REPLY_TIMEOUT).await {
            Some(message) => message,
            None => panic!("no message within {REPLY_TIMEOUT:?}"),
        }
    }

    /// Next complete outbound message, or `None` if nothing arrives in `wait`.
    pub async fn try_next_message(&mut self, wait: Duration) -> Option<Value> {
        let count = self.next_frame(wait).await?;
        let count: usize = count
            .parse()
            .unwrap_or_else(|_| panic!("expected a count frame, got {count:?}"));
        let mut payload = String::new();
        for _ in 0..count {
            payload.push_str(&self.next_frame(REPLY_TIMEOUT).await.expect("chunk follows its count frame"));
        }
        Some(serde_json::from_str(&payload).expect("outbound payload is JSON"))
    }

    /// Raw outbound frames, in order, until `wait` passes without one.
    pub async fn drain_frames(&mut self, wait: Duration) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame(wait).await {
            frames.push(frame);
        }
        frames
    }

    async fn next_frame(&mut self, wait: Duration) -> Option<String> {
        timeout(wait, self.inbound.recv()).await.ok().flatten()
    }

    /// Reads messages until the reply to request `r`, returning the pushes
    /// seen before it and the reply body.
    pub async fn reply_to(&mut self, r: u64) -> (Vec<Value>, Value) {
        let mut pushes = Vec::new();
        loop {
            let message = self.next_message().await;
            if message["d"]["r"] == json!(r) {
                return (pushes, message["d"]["b"].clone());
            }
            pushes.push(message);
        }
    }

    pub async fn close(&self) {
        self.session.close().await;
    }
}

/// Request body for `l`/`q`/`n`.
pub fn listen_body(path: &str, query: Option<Value>) -> Value {
    match query {
        Some(q) => json!({"p": path, "h": "", "q": q}),
        None => json!({"p": path, "h": ""}),
    }
}

/// Push body `{"p", "d"}` if `message` is a data push.
pub fn push_body(message: &Value) -> Option<&Value> {
    (message["d"]["a"] == "d").then(|| &message["d"]["b"])
}

/// HS256 token over `claims`.
pub fn make_token(secret: &str, claims: &Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encodes")
}

/// Legacy token claims valid from `iat` (seconds) with user data `d`.
pub fn legacy_claims(iat: i64, d: Value) -> Value {
    json!({"v": 0, "iat": iat, "d": d})
}
