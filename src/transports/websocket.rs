//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries battle envelopes over a WebSocket
//! connection (`ws://` and `wss://` both work; TLS is handled transparently
//! via [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream)).
//! [`WebSocketConnector`] builds the token-addressed endpoint URL and opens
//! fresh connections for the reconnection loop.
//!
//! # Close status classification
//!
//! WebSocket close status `1000` is reserved to mean normal/intentional
//! closure. `recv` maps a `1000` close frame (or a frameless end of stream)
//! to `None`, and any other close status to a
//! [`TransportReceive`](BattleClientError::TransportReceive) error so the
//! session loop treats it as an abnormal close and applies its bounded
//! reconnection policy.
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (enabled by default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::BattleClientError;
use crate::token::BattleToken;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ── Endpoint ────────────────────────────────────────────────────────

/// Address of a battle server, parameterized by scheme and host; the issued
/// token is appended as a query credential when connecting.
///
/// ```
/// use kotoba_battle_client::transports::websocket::BattleEndpoint;
/// use kotoba_battle_client::BattleToken;
///
/// let endpoint = BattleEndpoint::new("wss", "battle.kotoba.app");
/// let url = endpoint.url(&BattleToken::new("tok123"));
/// assert_eq!(url, "wss://battle.kotoba.app/battle?token=tok123");
/// ```
#[derive(Debug, Clone)]
pub struct BattleEndpoint {
    scheme: String,
    host: String,
    path: String,
}

impl BattleEndpoint {
    /// Create an endpoint with the default `/battle` path.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path: "/battle".into(),
        }
    }

    /// Override the URL path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the connection URL for the given token. Tokens are assumed to be
    /// URL-safe opaque strings (the issuing service guarantees this).
    pub fn url(&self, token: &BattleToken) -> String {
        format!(
            "{}://{}{}?token={}",
            self.scheme,
            self.host,
            self.path,
            token.as_str()
        )
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// A [`Connector`] that opens [`WebSocketTransport`]s against a
/// [`BattleEndpoint`].
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: BattleEndpoint,
    connect_timeout: Option<std::time::Duration>,
}

impl WebSocketConnector {
    pub fn new(endpoint: BattleEndpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: None,
        }
    }

    /// Bound each connection attempt; [`BattleClientError::Timeout`] on expiry.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&mut self, token: &BattleToken) -> Result<WebSocketTransport, BattleClientError> {
        let url = self.endpoint.url(token);
        match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(&url, timeout).await,
            None => WebSocketTransport::connect(&url).await,
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// Translates between battle protocol text envelopes and WebSocket frames.
/// Non-text frames are handled internally (ping/pong by tungstenite, binary
/// frames skipped with a warning).
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe; dropping its future before
/// completion does not lose messages, so it is safe inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::Io`] if the URL is invalid or the
    /// connection cannot be established. Underlying I/O errors keep their
    /// [`ErrorKind`](std::io::ErrorKind); other handshake errors map to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, BattleClientError> {
        tracing::debug!(url = %url, "connecting to battle server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            BattleClientError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "battle connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Wrap an already-established WebSocket stream (custom TLS, proxy
    /// headers, or any setup [`connect`](Self::connect) does not expose).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect) but fails with
    /// [`BattleClientError::Timeout`] if the connection is not established
    /// within `timeout`.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, BattleClientError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| BattleClientError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), BattleClientError> {
        if self.closed {
            return Err(BattleClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| BattleClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, BattleClientError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(BattleClientError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    // Status 1000 (or no frame at all) is a normal closure and
                    // must never trigger reconnection; anything else is an
                    // abnormal close surfaced as a receive error.
                    return match frame {
                        None => None,
                        Some(f) if f.code == CloseCode::Normal => {
                            tracing::debug!(reason = %f.reason, "received normal close frame");
                            None
                        }
                        Some(f) => {
                            tracing::warn!(code = %f.code, reason = %f.reason, "abnormal close frame");
                            Some(Err(BattleClientError::TransportReceive(format!(
                                "abnormal close (code {}): {}",
                                f.code, f.reason
                            ))))
                        }
                    };
                }
                Message::Ping(_) => {
                    // tungstenite auto-queues the Pong reply.
                    tracing::debug!("received WebSocket ping");
                }
                Message::Pong(_) => {
                    tracing::debug!("received WebSocket pong (ignored)");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), BattleClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // close(None) sends status 1000, the reserved normal-closure code.
        self.stream
            .close(None)
            .await
            .map_err(|e| BattleClientError::TransportSend(e.to_string()))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn endpoint_builds_token_addressed_url() {
        let endpoint = BattleEndpoint::new("ws", "localhost:8080");
        let url = endpoint.url(&BattleToken::new("abc"));
        assert_eq!(url, "ws://localhost:8080/battle?token=abc");
    }

    #[test]
    fn endpoint_path_override() {
        let endpoint = BattleEndpoint::new("wss", "battle.kotoba.app").with_path("/v2/battle");
        let url = endpoint.url(&BattleToken::new("t"));
        assert_eq!(url, "wss://battle.kotoba.app/v2/battle?token=t");
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = WebSocketTransport::connect("not-a-valid-url").await;
        let err = result.unwrap_err();
        assert!(matches!(err, BattleClientError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        let err = result.unwrap_err();
        assert!(matches!(err, BattleClientError::Io(_)));
    }

    // ── Mock-server helpers ─────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    // ── Mock-server tests ───────────────────────────────────────────

    #[tokio::test]
    async fn recv_receives_text_messages() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"QUEUE_JOINED"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"QUEUE_JOINED"}"#);
    }

    #[tokio::test]
    async fn normal_close_frame_maps_to_none() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn abnormal_close_frame_maps_to_receive_error() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: CloseCode::Library(4001),
                reason: "session evicted".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let err = transport.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, BattleClientError::TransportReceive(_)));
        assert!(err.to_string().contains("4001"), "got: {err}");
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, BattleClientError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // A listener that never accepts: the TCP connect completes into the
        // backlog but the websocket handshake response never arrives, so the
        // connect stalls until the deadline.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let result = WebSocketTransport::connect_with_timeout(
            &url,
            std::time::Duration::from_millis(50),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, BattleClientError::Timeout));
        drop(listener);
    }

    #[tokio::test]
    async fn connector_uses_token_in_url() {
        // The mock server captures the request path during the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (path_tx, path_rx) = tokio::sync::oneshot::channel::<String>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                            resp| {
                let _ = path_tx.send(req.uri().to_string());
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let endpoint = BattleEndpoint::new("ws", addr.to_string());
        let mut connector = WebSocketConnector::new(endpoint);
        let _transport = connector.connect(&BattleToken::new("tok42")).await.unwrap();

        let path = path_rx.await.unwrap();
        assert_eq!(path, "/battle?token=tok42");
    }

    #[tokio::test]
    async fn from_stream_constructor_works() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("from_stream_msg".into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(ws_stream);

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "from_stream_msg");
    }

    #[tokio::test]
    async fn send_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send("ping_echo".to_string()).await.unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "ping_echo");
    }
}
