//! Async client handle for the Kotoba Battle protocol.
//!
//! [`BattleClient`] is a thin handle over a background session loop task (see
//! [`connection`](crate::connection)). User intents are queued over an
//! unbounded MPSC channel; typed [`BattleEvent`]s come back on the bounded
//! channel returned from [`BattleClient::connect`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new(BattleEndpoint::new("wss", "battle.kotoba.app"));
//! let supplier = MyTokenSupplier::new(login_credential);
//! let (mut client, mut events) =
//!     BattleClient::connect(connector, supplier, BattleConfig::new()).await?;
//!
//! client.join_queue("N3")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         BattleEvent::MatchFound { .. } => client.ready()?,
//!         BattleEvent::QuestionPosed { .. } => client.submit_answer(0)?,
//!         BattleEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::connection::{self, Command, ReconnectPolicy, SessionParams};
use crate::error::{BattleClientError, Result};
use crate::event::BattleEvent;
use crate::phase::GamePhase;
use crate::protocol::GameResult;
use crate::session::MatchInfo;
use crate::token::TokenSupplier;
use crate::transport::Connector;

/// Default per-question countdown ceiling, seconds.
const DEFAULT_QUESTION_SECS: u8 = 10;

/// Default token refresh cadence. Battle tokens are valid for around 30
/// minutes; refreshing at 25 leaves headroom for a slow round-trip.
const DEFAULT_TOKEN_REFRESH_PERIOD: Duration = Duration::from_secs(25 * 60);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful disconnect.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`BattleClient`] session.
///
/// All fields have sensible defaults.
///
/// # Example
///
/// ```
/// use kotoba_battle_client::client::BattleConfig;
/// use std::time::Duration;
///
/// let config = BattleConfig::new()
///     .with_question_secs(15)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.question_secs, 15);
/// ```
#[derive(Debug, Clone)]
pub struct BattleConfig {
    /// Per-question countdown ceiling, in seconds.
    pub question_secs: u8,
    /// Bounded retry policy for connection establishment and reconnection.
    pub reconnect: ReconnectPolicy,
    /// How often a fresh battle token is fetched and sent in-band.
    pub token_refresh_period: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) to avoid blocking the session loop. The final `Disconnected`
    /// event is always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful disconnect. When it expires the session loop
    /// task is aborted. A zero timeout aborts immediately.
    pub shutdown_timeout: Duration,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            question_secs: DEFAULT_QUESTION_SECS,
            reconnect: ReconnectPolicy::default(),
            token_refresh_period: DEFAULT_TOKEN_REFRESH_PERIOD,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl BattleConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-question countdown ceiling.
    #[must_use]
    pub fn with_question_secs(mut self, secs: u8) -> Self {
        self.question_secs = secs;
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the token refresh cadence.
    #[must_use]
    pub fn with_token_refresh_period(mut self, period: Duration) -> Self {
        self.token_refresh_period = period;
        self
    }

    /// Set the capacity of the bounded event channel. Clamped to at least 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful disconnect.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Observable snapshot shared between the handle and the session loop. The
/// loop writes, the handle reads.
pub(crate) struct SharedState {
    pub connected: AtomicBool,
    pub phase: Mutex<GamePhase>,
    pub match_info: Mutex<Option<MatchInfo>>,
    /// `(local, opponent)` scores.
    pub scores: Mutex<(u32, u32)>,
    pub final_result: Mutex<Option<GameResult>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            phase: Mutex::new(GamePhase::Idle),
            match_info: Mutex::new(None),
            scores: Mutex::new((0, 0)),
            final_result: Mutex::new(None),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one battle session.
///
/// Created via [`BattleClient::connect`], which issues the first battle
/// token, opens the connection (with bounded retry) and spawns the session
/// loop. The handle *is* the connection: one live connection per handle, by
/// construction.
///
/// All intent methods queue a command to the session loop and return
/// immediately (no round-trip await). The loop sends the protocol message
/// first and advances the game phase only once the send succeeded. Commands
/// that arrive while the connection is down (mid-reconnect) are dropped with
/// a warning, never held for replay.
pub struct BattleClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl BattleClient {
    /// Issue a battle token, open the connection and start the session loop.
    ///
    /// Returns the handle plus the event receiver. The receiver yields
    /// [`BattleEvent`]s until the session ends; `Disconnected` is always the
    /// final event.
    ///
    /// # Errors
    ///
    /// - [`BattleClientError::TokenFetch`] if the supplier cannot issue the
    ///   initial token (credential failure, not retried).
    /// - [`BattleClientError::ConnectionFailed`] if the connection cannot be
    ///   opened within the retry policy.
    #[must_use = "the event receiver must be used to receive events"]
    pub async fn connect<C, S>(
        mut connector: C,
        supplier: S,
        config: BattleConfig,
    ) -> Result<(Self, mpsc::Receiver<BattleEvent>)>
    where
        C: Connector,
        S: TokenSupplier,
    {
        let supplier = Arc::new(supplier);
        let token = supplier.issue().await?;
        let transport = connection::establish(&mut connector, &token, &config.reconnect).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<BattleEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(SharedState::new());
        let params = SessionParams {
            question_secs: config.question_secs,
            reconnect: config.reconnect.clone(),
            token_refresh_period: config.token_refresh_period,
        };

        let task = tokio::spawn(connection::session_loop(
            connector,
            supplier,
            transport,
            token,
            params,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        Ok((client, event_rx))
    }

    // ── Matchmaking actions ─────────────────────────────────────────

    /// Enter the matchmaking queue at the given level (e.g. `"N3"`).
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::NotConnected`] if the session has ended.
    pub fn join_queue(&self, level: impl Into<String>) -> Result<()> {
        self.send(Command::JoinQueue {
            level: level.into(),
        })
    }

    /// Leave the matchmaking queue.
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::NotConnected`] if the session has ended.
    pub fn leave_queue(&self) -> Result<()> {
        self.send(Command::LeaveQueue)
    }

    /// Signal readiness for the found match. Sent at most once per match.
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::NotConnected`] if the session has ended.
    pub fn ready(&self) -> Result<()> {
        self.send(Command::Ready)
    }

    // ── In-battle actions ───────────────────────────────────────────

    /// Submit an answer for the live question. At most one submission per
    /// question is sent; later calls for the same question are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::NotConnected`] if the session has ended.
    pub fn submit_answer(&self, answer_index: u32) -> Result<()> {
        self.send(Command::SubmitAnswer { answer_index })
    }

    /// Return to idle after a finished battle, resetting all session data.
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::NotConnected`] if the session has ended.
    pub fn play_again(&self) -> Result<()> {
        self.send(Command::PlayAgain)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Disconnect intentionally, closing the connection with the normal
    /// status and stopping the session loop.
    ///
    /// This is the single cancellation point: the loop stops both timers and
    /// closes the transport, and no reconnect attempt can follow. After this
    /// method returns, the event receiver yields the final `Disconnected`
    /// event and then `None`.
    pub async fn disconnect(&mut self) {
        debug!("BattleClient: disconnect requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout; abort so the task cannot detach and
        // keep timers alive indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the connection is believed to be open (false
    /// during reconnection attempts and after the session ends).
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The current game phase.
    pub async fn phase(&self) -> GamePhase {
        *self.state.phase.lock().await
    }

    /// Details of the current match, if one has been found.
    pub async fn match_info(&self) -> Option<MatchInfo> {
        self.state.match_info.lock().await.clone()
    }

    /// `(local, opponent)` scores as last reported by the server.
    pub async fn scores(&self) -> (u32, u32) {
        *self.state.scores.lock().await
    }

    /// The final result, once the battle has ended.
    pub async fn final_result(&self) -> Option<GameResult> {
        self.state.final_result.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    // Commands queue to the session loop as long as it is alive; the loop
    // drops (with a warning) anything that arrives while the connection is
    // down, so a reconnected session never acts on stale intent.
    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| BattleClientError::NotConnected)
    }
}

impl std::fmt::Debug for BattleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for BattleClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so a graceful shutdown cannot be awaited.
        // Aborting the task drops the session loop future immediately, which
        // also drops both timers. The shutdown oneshot is intentionally not
        // sent: the graceful path awaits `transport.close()` and there is no
        // executor context to drive it here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
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
    use crate::error::BattleClientError;
    use crate::token::BattleToken;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, BattleClientError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, BattleClientError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Scripted input exhausted — hang so the loop stays alive
                // until disconnect.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct MockConnector {
        scripts: VecDeque<Option<Vec<Option<std::result::Result<String, BattleClientError>>>>>,
        attempts: Arc<AtomicU32>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockConnector {
        /// Each entry scripts one `connect` call: `Some(incoming)` succeeds
        /// with a transport yielding those messages, `None` fails.
        fn new(
            scripts: Vec<Option<Vec<Option<std::result::Result<String, BattleClientError>>>>>,
        ) -> (Self, Arc<AtomicU32>, Arc<StdMutex<Vec<String>>>) {
            let attempts = Arc::new(AtomicU32::new(0));
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let connector = Self {
                scripts: VecDeque::from(scripts),
                attempts: Arc::clone(&attempts),
                sent: Arc::clone(&sent),
                closed: Arc::new(AtomicBool::new(false)),
            };
            (connector, attempts, sent)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self, _token: &BattleToken) -> Result<MockTransport> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.scripts.pop_front() {
                Some(Some(incoming)) => Ok(MockTransport {
                    incoming: VecDeque::from(incoming),
                    sent: Arc::clone(&self.sent),
                    closed: Arc::clone(&self.closed),
                }),
                // Scripted failure, or script exhausted.
                _ => Err(BattleClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "scripted connect failure",
                ))),
            }
        }
    }

    struct StaticSupplier;

    #[async_trait]
    impl TokenSupplier for StaticSupplier {
        async fn issue(&self) -> Result<BattleToken> {
            Ok(BattleToken::new("tok"))
        }
    }

    struct FailingSupplier;

    #[async_trait]
    impl TokenSupplier for FailingSupplier {
        async fn issue(&self) -> Result<BattleToken> {
            Err(BattleClientError::TokenFetch("credential expired".into()))
        }
    }

    // ── Config tests ────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = BattleConfig::new();
        assert_eq!(config.question_secs, 10);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
        assert_eq!(config.token_refresh_period, Duration::from_secs(25 * 60));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = BattleConfig::new()
            .with_question_secs(20)
            .with_token_refresh_period(Duration::from_secs(60))
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.question_secs, 20);
        assert_eq!(config.token_refresh_period, Duration::from_secs(60));
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = BattleConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    // ── Lifecycle tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn connect_emits_connected_first() {
        let (connector, attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let (mut client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, BattleEvent::Connected));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(client.is_connected());
        assert_eq!(client.phase().await, GamePhase::Idle);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn initial_token_failure_propagates() {
        let (connector, attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let err = BattleClient::connect(connector, FailingSupplier, BattleConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BattleClientError::TokenFetch(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0, "no connect without a token");
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_retries_then_fails() {
        // First attempt plus three retries, all scripted to fail.
        let (connector, attempts, _sent) = MockConnector::new(vec![None, None, None, None]);
        let err = BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BattleClientError::ConnectionFailed { attempts: 3 }
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_retry_succeeds() {
        let (connector, attempts, _sent) = MockConnector::new(vec![None, Some(vec![])]);
        let (mut client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let first = events.recv().await.unwrap();
        assert!(matches!(first, BattleEvent::Connected));

        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_emits_final_disconnected() {
        let (connector, _attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let (mut client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        let _ = events.recv().await; // Connected
        client.disconnect().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, BattleEvent::Disconnected { .. }));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn not_connected_error_after_disconnect() {
        let (connector, _attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let (mut client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        let _ = events.recv().await; // Connected
        client.disconnect().await;

        assert!(matches!(
            client.join_queue("N3"),
            Err(BattleClientError::NotConnected)
        ));
        assert!(matches!(
            client.submit_answer(0),
            Err(BattleClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn double_disconnect_does_not_panic() {
        let (connector, _attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let (mut client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        let _ = events.recv().await; // Connected
        client.disconnect().await;
        client.disconnect().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_disconnect() {
        let (connector, _attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let (client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        let _ = events.recv().await; // Connected
        drop(client);

        // The loop is aborted; the channel closes. Just verify no hang.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (connector, _attempts, _sent) = MockConnector::new(vec![Some(vec![])]);
        let (mut client, mut events) =
            BattleClient::connect(connector, StaticSupplier, BattleConfig::new())
                .await
                .unwrap();

        let _ = events.recv().await; // Connected
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("BattleClient"));
        assert!(debug_str.contains("connected"));

        client.disconnect().await;
    }
}
