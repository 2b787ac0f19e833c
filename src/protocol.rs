//! Wire types for the Kotoba Battle protocol.
//!
//! Every message travels inside the uniform envelope `{ "type": …, "payload": … }`,
//! expressed here as adjacently tagged enums. Message type names are
//! `SCREAMING_SNAKE_CASE` on the wire and payload fields are `camelCase`,
//! matching the server exactly.

use serde::{Deserialize, Serialize};

// ── Supporting types ────────────────────────────────────────────────

/// A single multiple-choice question.
///
/// The correct answer index is withheld by the server until the
/// [`AnswerResult`](ServerMessage::AnswerResult) for this question arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// The question prompt. Serialized as `question` on the wire.
    #[serde(rename = "question")]
    pub prompt: String,
    /// Ordered answer options.
    pub options: Vec<String>,
}

/// Final outcome of a battle, sent by the server with `GAME_END`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub player1_name: String,
    pub player1_score: u32,
    pub player2_name: String,
    pub player2_score: u32,
    /// Identity of the winner. `None` indicates a draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    /// Optional termination reason (e.g. opponent disconnected).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GameResult {
    /// Returns `true` if neither player won.
    pub fn is_draw(&self) -> bool {
        self.winner_id.is_none()
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
///
/// Payload-less variants (`LEAVE_QUEUE`, `READY`) serialize without a
/// `payload` key. The server treats an absent key and an explicit
/// `"payload": null` the same, and deserialization accepts both forms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Enter the matchmaking queue at the given level (e.g. `"N3"`).
    JoinQueue { level: String },
    /// Leave the matchmaking queue.
    LeaveQueue,
    /// Signal readiness after a match has been found. Sent at most once per
    /// match; the server emits `GAME_START` once both players are ready.
    Ready,
    /// Submit an answer for the current question. Sent at most once per
    /// question (enforced locally by the session's answer lock).
    #[serde(rename_all = "camelCase")]
    AnswerQuestion {
        question_index: u32,
        answer_index: u32,
        /// Elapsed milliseconds since the server-declared question start.
        answer_time: u64,
    },
    /// Deliver a freshly issued battle token in-band so the server can extend
    /// the session without dropping the connection. Payload is the bare token
    /// string.
    RefreshToken(String),
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Acknowledgement that the client entered the matchmaking queue.
    QueueJoined,
    /// An opponent has been found.
    #[serde(rename_all = "camelCase")]
    MatchFound {
        opponent_name: String,
        level: String,
        number_of_questions: u32,
    },
    /// Both players are ready; the battle begins.
    GameStart { questions: Vec<Question> },
    /// The next question. Replaces any previously live question.
    #[serde(rename_all = "camelCase")]
    Question {
        question: Question,
        question_index: u32,
        /// Server-declared question start, epoch milliseconds.
        start_time: u64,
    },
    /// Server-authoritative judgement of the local player's answer.
    #[serde(rename_all = "camelCase")]
    AnswerResult {
        correct: bool,
        score_gained: u32,
        /// Running total; overwrites the local score, never added to it.
        total_score: u32,
        correct_answer_index: u32,
        /// Set when the question expired before an answer was submitted.
        #[serde(default)]
        timeout: bool,
    },
    /// The opponent answered the current question.
    #[serde(rename_all = "camelCase")]
    OpponentAnswered { opponent_score: u32 },
    /// The battle is over.
    GameEnd(GameResult),
    /// Protocol-level error. Does not by itself change the game phase.
    Error { error: String },
}
