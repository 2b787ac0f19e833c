//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] and [`Connector`] traits with a
//! simple in-process loopback channel. This is useful for:
//!
//! - **Testing** — drive your battle UI logic without a real server
//! - **Custom backends** — adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use async_trait::async_trait;
use kotoba_battle_client::protocol::{GameResult, Question, ServerMessage};
use kotoba_battle_client::{
    BattleClient, BattleClientError, BattleConfig, BattleEvent, BattleToken, Connector,
    TokenSupplier, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// A loopback transport that shuttles messages through in-process channels.
///
/// Two halves:
/// - The **client half** (`LoopbackTransport`) implements [`Transport`] and
///   is produced by the [`LoopbackConnector`].
/// - The **server half** (`LoopbackServer`) lets you inject responses and
///   read what the client sent.
pub struct LoopbackTransport {
    /// Messages the client sends go here (server reads from the other end).
    tx: mpsc::UnboundedSender<String>,
    /// Messages the server sends arrive here (client reads them).
    rx: mpsc::UnboundedReceiver<String>,
}

/// The "server side" of the loopback — use this to drive the conversation.
pub struct LoopbackServer {
    /// Read what the client sent.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Send messages to the client (as if they came from a server).
    pub tx: mpsc::UnboundedSender<String>,
}

/// Create a connected `(transport, server)` pair.
fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    // Client → Server channel
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    // Server → Client channel
    let (server_tx, client_rx) = mpsc::unbounded_channel();

    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
    };
    let server = LoopbackServer {
        rx: server_rx,
        tx: server_tx,
    };

    (transport, server)
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    /// Send a JSON message to the "server" side of the loopback.
    async fn send(&mut self, message: String) -> Result<(), BattleClientError> {
        self.tx
            .send(message)
            .map_err(|e| BattleClientError::TransportSend(e.to_string()))
    }

    /// Receive the next message from the "server" side. Returning `None`
    /// signals a clean close (the client will not reconnect).
    async fn recv(&mut self) -> Option<Result<String, BattleClientError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), BattleClientError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Implement the Connector trait
// ─────────────────────────────────────────────────────────────────────

/// Produces loopback transports and hands the server halves to a driver
/// task. Called again by the client whenever it needs to reconnect, with the
/// most recently issued token.
struct LoopbackConnector {
    server_tx: mpsc::UnboundedSender<LoopbackServer>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(
        &mut self,
        token: &BattleToken,
    ) -> Result<LoopbackTransport, BattleClientError> {
        tracing::info!("Loopback connect with token {token:?}");
        let (transport, server) = loopback_pair();
        self.server_tx
            .send(server)
            .map_err(|e| BattleClientError::TransportSend(e.to_string()))?;
        Ok(transport)
    }
}

struct StaticSupplier;

#[async_trait]
impl TokenSupplier for StaticSupplier {
    async fn issue(&self) -> Result<BattleToken, BattleClientError> {
        Ok(BattleToken::new("loopback-token"))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Script a tiny battle from the "server" side
// ─────────────────────────────────────────────────────────────────────

fn send(server: &LoopbackServer, msg: &ServerMessage) {
    let json = serde_json::to_string(msg).expect("serialize server message");
    let _ = server.tx.send(json);
}

async fn run_fake_server(mut server_rx: mpsc::UnboundedReceiver<LoopbackServer>) {
    let Some(mut server) = server_rx.recv().await else {
        return;
    };

    // JOIN_QUEUE
    let _ = server.rx.recv().await;
    send(&server, &ServerMessage::QueueJoined);
    send(
        &server,
        &ServerMessage::MatchFound {
            opponent_name: "Yuki".into(),
            level: "N3".into(),
            number_of_questions: 1,
        },
    );

    // READY
    let _ = server.rx.recv().await;
    let question = Question {
        prompt: "「水」の読み方は？".into(),
        options: vec!["みず".into(), "ひ".into(), "き".into(), "つち".into()],
    };
    send(
        &server,
        &ServerMessage::GameStart {
            questions: vec![question.clone()],
        },
    );
    send(
        &server,
        &ServerMessage::Question {
            question,
            question_index: 0,
            start_time: 0,
        },
    );

    // ANSWER_QUESTION
    let _ = server.rx.recv().await;
    send(
        &server,
        &ServerMessage::AnswerResult {
            correct: true,
            score_gained: 100,
            total_score: 100,
            correct_answer_index: 0,
            timeout: false,
        },
    );
    send(
        &server,
        &ServerMessage::GameEnd(GameResult {
            player1_name: "You".into(),
            player1_score: 100,
            player2_name: "Yuki".into(),
            player2_score: 0,
            winner_id: Some("player-1".into()),
            reason: None,
        }),
    );
}

// ─────────────────────────────────────────────────────────────────────
// Step 5: Run the client against it
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (server_tx, server_rx) = mpsc::unbounded_channel();
    let server_task = tokio::spawn(run_fake_server(server_rx));

    let connector = LoopbackConnector { server_tx };
    let (mut client, mut event_rx) =
        BattleClient::connect(connector, StaticSupplier, BattleConfig::new()).await?;

    client.join_queue("N3")?;

    while let Some(event) = event_rx.recv().await {
        match event {
            BattleEvent::MatchFound { opponent_name, .. } => {
                tracing::info!("Matched against {opponent_name}");
                client.ready()?;
            }
            BattleEvent::QuestionPosed { question, .. } => {
                tracing::info!("Question: {}", question.prompt);
                client.submit_answer(0)?;
            }
            BattleEvent::AnswerJudged { correct, total_score, .. } => {
                tracing::info!("Correct: {correct}, score: {total_score}");
            }
            BattleEvent::GameEnded { result } => {
                tracing::info!("Winner: {:?}", result.winner_id);
                break;
            }
            other => tracing::debug!("{other:?}"),
        }
    }

    client.disconnect().await;
    server_task.abort();
    Ok(())
}
