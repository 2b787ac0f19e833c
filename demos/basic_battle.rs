//! # Basic Battle Example
//!
//! Demonstrates a complete Kotoba Battle client lifecycle:
//!
//! 1. Connect to a battle server via WebSocket (with a token supplier)
//! 2. Join the matchmaking queue at a level
//! 3. Ready up when a match is found
//! 4. Answer every question (naively: always option 0) while watching the
//!    countdown and the opponent's score
//! 5. Shut down gracefully on Ctrl+C, game end or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a battle server on localhost:3820, then:
//! KOTOBA_BATTLE_TOKEN=my-token cargo run --example basic_battle
//!
//! # Override the server host:
//! KOTOBA_BATTLE_HOST=battle.example.com:3820 cargo run --example basic_battle
//! ```

use async_trait::async_trait;
use kotoba_battle_client::transports::{BattleEndpoint, WebSocketConnector};
use kotoba_battle_client::{
    BattleClient, BattleClientError, BattleConfig, BattleEvent, BattleToken, TokenSupplier,
};

/// Default server host when `KOTOBA_BATTLE_HOST` is not set.
const DEFAULT_HOST: &str = "localhost:3820";

/// Supplier that reads a pre-issued token from the environment.
///
/// A real application would call its auth backend here and return a freshly
/// issued short-lived token on every call — the client re-invokes the
/// supplier both for periodic in-band refresh and before reconnecting.
struct EnvTokenSupplier;

#[async_trait]
impl TokenSupplier for EnvTokenSupplier {
    async fn issue(&self) -> Result<BattleToken, BattleClientError> {
        std::env::var("KOTOBA_BATTLE_TOKEN")
            .map(BattleToken::new)
            .map_err(|_| {
                BattleClientError::TokenFetch("KOTOBA_BATTLE_TOKEN is not set".to_string())
            })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let host = std::env::var("KOTOBA_BATTLE_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    tracing::info!("Connecting to {host}");

    let connector = WebSocketConnector::new(BattleEndpoint::new("ws", host));

    // ── Connect ─────────────────────────────────────────────────────
    // Issues the first token, opens the connection (with bounded retry) and
    // spawns the background session loop.
    let (mut client, mut event_rx) =
        BattleClient::connect(connector, EnvTokenSupplier, BattleConfig::new()).await?;

    // Queue up right away.
    client.join_queue("N3")?;

    // ── Event loop ──────────────────────────────────────────────────
    // Use `tokio::select!` to listen for both battle events and Ctrl+C.
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    BattleEvent::Connected => {
                        tracing::info!("Connected, waiting in queue…");
                    }
                    BattleEvent::Reconnecting { attempt } => {
                        tracing::warn!("Connection lost, reconnect attempt {attempt}…");
                    }
                    BattleEvent::QueueJoined => {
                        tracing::info!("In queue, waiting for an opponent");
                    }
                    BattleEvent::MatchFound { opponent_name, level, number_of_questions } => {
                        tracing::info!(
                            "Matched against {opponent_name} ({level}, {number_of_questions} questions) — readying up"
                        );
                        client.ready()?;
                    }
                    BattleEvent::GameStarted { number_of_questions } => {
                        tracing::info!("Battle started: {number_of_questions} questions");
                    }
                    BattleEvent::QuestionPosed { question, question_index, countdown } => {
                        tracing::info!(
                            "Q{}: {} ({} options, {countdown}s)",
                            question_index + 1,
                            question.prompt,
                            question.options.len()
                        );
                        // Not a winning strategy.
                        client.submit_answer(0)?;
                    }
                    BattleEvent::CountdownTick { remaining } => {
                        tracing::debug!("{remaining}s remaining");
                    }
                    BattleEvent::AnswerJudged { correct, total_score, correct_answer_index, timeout, .. } => {
                        if timeout {
                            tracing::info!("Too slow! Correct answer was {correct_answer_index}");
                        } else if correct {
                            tracing::info!("Correct! Score: {total_score}");
                        } else {
                            tracing::info!("Wrong — answer was {correct_answer_index}. Score: {total_score}");
                        }
                    }
                    BattleEvent::OpponentAnswered { opponent_score } => {
                        tracing::info!("Opponent answered, their score: {opponent_score}");
                    }
                    BattleEvent::PhaseChanged { from, to } => {
                        tracing::debug!("Phase: {from:?} → {to:?}");
                    }
                    BattleEvent::GameEnded { result } => {
                        if result.is_draw() {
                            tracing::info!(
                                "Draw! {} {} : {} {}",
                                result.player1_name, result.player1_score,
                                result.player2_score, result.player2_name,
                            );
                        } else {
                            tracing::info!(
                                "Game over! {} {} : {} {} (winner: {:?})",
                                result.player1_name, result.player1_score,
                                result.player2_score, result.player2_name,
                                result.winner_id,
                            );
                        }
                        break;
                    }
                    BattleEvent::ServerError { message } => {
                        tracing::warn!("Server error: {message}");
                    }
                    BattleEvent::Disconnected { reason } => {
                        tracing::info!("Disconnected: {reason:?}");
                        return Ok(());
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, disconnecting");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
