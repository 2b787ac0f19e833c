#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
#![allow(dead_code)]
//! Shared test utilities for Kotoba Battle Client integration tests.
//!
//! Provides a scripted [`MockConnector`] / [`MockTransport`] pair and helper
//! functions for constructing common server message JSON strings.
//!
//! Scripted incoming messages carry a *gate*: the number of client messages
//! that must have been sent before the scripted message is released. This
//! makes command/response interleavings deterministic — e.g. `QUEUE_JOINED`
//! gated at 1 is only delivered after the client's `JOIN_QUEUE` went out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use kotoba_battle_client::protocol::{GameResult, Question, ServerMessage};
use kotoba_battle_client::token::BattleToken;
use kotoba_battle_client::{BattleClientError, Connector, TokenSupplier, Transport};

/// One scripted item: released once `gate` client messages have been sent.
/// `item` follows the `Transport::recv` contract (`None` = clean close).
pub type Scripted = (usize, Option<Result<String, BattleClientError>>);

/// Script entry released immediately.
pub fn msg(json: String) -> Scripted {
    (0, Some(Ok(json)))
}

/// Script entry released after `gate` sent messages.
pub fn msg_after(gate: usize, json: String) -> Scripted {
    (gate, Some(Ok(json)))
}

/// Scripted abnormal receive failure.
pub fn recv_error(reason: &str) -> Scripted {
    (0, Some(Err(BattleClientError::TransportReceive(reason.into()))))
}

/// Scripted clean close (server sent the normal status).
pub fn clean_close() -> Scripted {
    (0, None)
}

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport. Incoming items are consumed in order by
/// `recv()`, each held back until its gate is met; all outgoing messages are
/// recorded in `sent` (shared across reconnections by [`MockConnector`]).
pub struct MockTransport {
    incoming: VecDeque<Scripted>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicU32>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), BattleClientError> {
        // Scripted send failures burn down a shared counter; failed messages
        // never reach the wire record.
        if self.fail_sends.load(Ordering::SeqCst) > 0 {
            self.fail_sends.fetch_sub(1, Ordering::SeqCst);
            return Err(BattleClientError::TransportSend(
                "scripted send failure".into(),
            ));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, BattleClientError>> {
        loop {
            // Peek the gate without popping so cancellation never loses an
            // item (recv must be cancel-safe).
            match self.incoming.front() {
                Some((gate, _)) => {
                    if self.sent.lock().unwrap().len() >= *gate {
                        let (_, item) = self.incoming.pop_front().unwrap();
                        return item;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                // Script exhausted — hang so the session loop stays alive
                // until shutdown.
                None => std::future::pending().await,
            }
        }
    }

    async fn close(&mut self) -> Result<(), BattleClientError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Scripted connector: each entry describes one `connect` call, in order.
/// `Some(script)` yields a [`MockTransport`] with that incoming script,
/// `None` fails the attempt. Exhausting the script also fails.
pub struct MockConnector {
    scripts: VecDeque<Option<Vec<Scripted>>>,
    pub attempts: Arc<AtomicU32>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicU32>,
}

impl MockConnector {
    #[allow(clippy::type_complexity)]
    pub fn new(
        scripts: Vec<Option<Vec<Scripted>>>,
    ) -> (Self, Arc<AtomicU32>, Arc<StdMutex<Vec<String>>>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let connector = Self {
            scripts: VecDeque::from(scripts),
            attempts: Arc::clone(&attempts),
            sent: Arc::clone(&sent),
            closed: Arc::new(AtomicBool::new(false)),
            fail_sends: Arc::new(AtomicU32::new(0)),
        };
        (connector, attempts, sent)
    }

    /// Counter of upcoming send failures, shared with every transport this
    /// connector produces. Store `n` to make the next `n` sends fail.
    pub fn fail_sends(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.fail_sends)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self, _token: &BattleToken) -> Result<MockTransport, BattleClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.scripts.pop_front() {
            Some(Some(incoming)) => Ok(MockTransport {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
                fail_sends: Arc::clone(&self.fail_sends),
            }),
            _ => Err(BattleClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted connect failure",
            ))),
        }
    }
}

// ── Token suppliers ─────────────────────────────────────────────────

/// Supplier that always issues the same token.
pub struct StaticSupplier;

#[async_trait]
impl TokenSupplier for StaticSupplier {
    async fn issue(&self) -> Result<BattleToken, BattleClientError> {
        Ok(BattleToken::new("test-token"))
    }
}

/// Supplier that issues `token-1`, `token-2`, … and counts calls.
pub struct CountingSupplier {
    pub issued: Arc<AtomicU32>,
}

impl CountingSupplier {
    pub fn new() -> (Self, Arc<AtomicU32>) {
        let issued = Arc::new(AtomicU32::new(0));
        (
            Self {
                issued: Arc::clone(&issued),
            },
            issued,
        )
    }
}

#[async_trait]
impl TokenSupplier for CountingSupplier {
    async fn issue(&self) -> Result<BattleToken, BattleClientError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BattleToken::new(format!("token-{n}")))
    }
}

/// Supplier whose first `allow` issue calls succeed and all later ones fail,
/// as a credential that expires server-side would.
pub struct ExpiringSupplier {
    allow: u32,
    pub issued: Arc<AtomicU32>,
}

impl ExpiringSupplier {
    pub fn new(allow: u32) -> (Self, Arc<AtomicU32>) {
        let issued = Arc::new(AtomicU32::new(0));
        (
            Self {
                allow,
                issued: Arc::clone(&issued),
            },
            issued,
        )
    }
}

#[async_trait]
impl TokenSupplier for ExpiringSupplier {
    async fn issue(&self) -> Result<BattleToken, BattleClientError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.allow {
            Ok(BattleToken::new(format!("token-{n}")))
        } else {
            Err(BattleClientError::TokenFetch("credential expired".into()))
        }
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON string for a `QUEUE_JOINED` server message.
pub fn queue_joined_json() -> String {
    serde_json::to_string(&ServerMessage::QueueJoined).expect("queue_joined_json serialization")
}

/// Returns the JSON string for a `MATCH_FOUND` server message.
pub fn match_found_json(opponent_name: &str, level: &str, number_of_questions: u32) -> String {
    serde_json::to_string(&ServerMessage::MatchFound {
        opponent_name: opponent_name.into(),
        level: level.into(),
        number_of_questions,
    })
    .expect("match_found_json serialization")
}

/// Returns the JSON string for a `GAME_START` server message carrying
/// `count` placeholder questions.
pub fn game_start_json(count: usize) -> String {
    let questions = (0..count)
        .map(|i| Question {
            prompt: format!("question {i}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        })
        .collect();
    serde_json::to_string(&ServerMessage::GameStart { questions })
        .expect("game_start_json serialization")
}

/// Returns the JSON string for a `QUESTION` server message.
pub fn question_json(question_index: u32, start_time: u64) -> String {
    serde_json::to_string(&ServerMessage::Question {
        question: Question {
            prompt: format!("question {question_index}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        },
        question_index,
        start_time,
    })
    .expect("question_json serialization")
}

/// Returns the JSON string for an `ANSWER_RESULT` server message.
pub fn answer_result_json(correct: bool, score_gained: u32, total_score: u32) -> String {
    serde_json::to_string(&ServerMessage::AnswerResult {
        correct,
        score_gained,
        total_score,
        correct_answer_index: 2,
        timeout: false,
    })
    .expect("answer_result_json serialization")
}

/// Returns the JSON string for an `OPPONENT_ANSWERED` server message.
pub fn opponent_answered_json(opponent_score: u32) -> String {
    serde_json::to_string(&ServerMessage::OpponentAnswered { opponent_score })
        .expect("opponent_answered_json serialization")
}

/// Returns the JSON string for a `GAME_END` server message.
pub fn game_end_json(player1_score: u32, player2_score: u32, winner_id: Option<&str>) -> String {
    serde_json::to_string(&ServerMessage::GameEnd(GameResult {
        player1_name: "Hikari".into(),
        player1_score,
        player2_name: "Yuki".into(),
        player2_score,
        winner_id: winner_id.map(Into::into),
        reason: None,
    }))
    .expect("game_end_json serialization")
}

/// Returns the JSON string for a server `ERROR` message.
pub fn error_json(error: &str) -> String {
    serde_json::to_string(&ServerMessage::Error {
        error: error.into(),
    })
    .expect("error_json serialization")
}
