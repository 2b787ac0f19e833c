//! Typed events emitted by the battle client.
//!
//! Events arrive on the bounded channel returned from
//! [`BattleClient::connect`](crate::BattleClient::connect). When the consumer
//! cannot keep up, events are dropped with a warning rather than blocking the
//! session loop — except [`Disconnected`](BattleEvent::Disconnected), which is
//! always the final event on the channel and is always delivered.

use crate::phase::GamePhase;
use crate::protocol::{GameResult, Question};

/// Events emitted by the battle session.
#[derive(Debug, Clone, PartialEq)]
pub enum BattleEvent {
    /// The connection is open (emitted on initial connect and again after a
    /// successful reconnection).
    Connected,
    /// An abnormal close occurred and a reconnection attempt is about to be
    /// made. `attempt` counts from 1.
    Reconnecting { attempt: u32 },
    /// The server acknowledged queue membership.
    QueueJoined,
    /// An opponent was found; the client sends `READY` and waits for the
    /// server's `GAME_START`.
    MatchFound {
        opponent_name: String,
        level: String,
        number_of_questions: u32,
    },
    /// Both players were ready; the battle is underway.
    GameStarted { number_of_questions: u32 },
    /// A new question is live; its countdown starts at `countdown` seconds.
    QuestionPosed {
        question: Question,
        question_index: u32,
        countdown: u8,
    },
    /// One second elapsed on the live question's countdown.
    CountdownTick { remaining: u8 },
    /// The server judged the local player's answer. `total_score` already
    /// reflects the gain.
    AnswerJudged {
        correct: bool,
        score_gained: u32,
        total_score: u32,
        correct_answer_index: u32,
        timeout: bool,
    },
    /// The opponent answered; their displayed score is now `opponent_score`.
    OpponentAnswered { opponent_score: u32 },
    /// The game phase changed (user action or inbound message).
    PhaseChanged { from: GamePhase, to: GamePhase },
    /// The battle finished.
    GameEnded { result: GameResult },
    /// Protocol-level error from the server. Transient notice only; the game
    /// phase is unaffected.
    ServerError { message: String },
    /// The session is over: intentional disconnect, clean server close, or
    /// terminal connection failure (`reason` carries the distinction).
    Disconnected { reason: Option<String> },
}
