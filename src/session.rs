//! Per-battle session state: the live question, its countdown, the answer
//! lock, and both players' scores.
//!
//! [`GameSessionController`] is deliberately synchronous and timer-free — the
//! session loop in [`connection`](crate::connection) owns the actual clocks
//! and calls [`tick`](GameSessionController::tick) once per second. That keeps
//! every scoring and idempotence rule unit-testable without a runtime.
//!
//! Score is only ever *overwritten* with server-authoritative values from
//! `ANSWER_RESULT` / `OPPONENT_ANSWERED`; it is never advanced speculatively
//! on submission.

use crate::protocol::{ClientMessage, GameResult, Question};

/// Details of the current match, created on `MATCH_FOUND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub opponent_name: String,
    pub level: String,
    pub number_of_questions: u32,
}

/// The server's judgement of the most recent local answer, kept for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub score_gained: u32,
    pub correct_answer_index: u32,
    pub timeout: bool,
}

/// The question currently on screen. One live at a time.
#[derive(Debug, Clone)]
struct LiveQuestion {
    question: Question,
    index: u32,
    /// Server-declared start, epoch milliseconds.
    start_time: u64,
    /// The answer lock: flipped on first submission, refused afterwards.
    answered: bool,
}

/// Tracks one battle session's mutable state.
#[derive(Debug)]
pub struct GameSessionController {
    /// Fixed per-question countdown ceiling, in seconds.
    question_secs: u8,
    match_info: Option<MatchInfo>,
    live: Option<LiveQuestion>,
    countdown: u8,
    my_score: u32,
    opponent_score: u32,
    last_outcome: Option<AnswerOutcome>,
    final_result: Option<GameResult>,
}

impl GameSessionController {
    pub fn new(question_secs: u8) -> Self {
        Self {
            question_secs,
            match_info: None,
            live: None,
            countdown: 0,
            my_score: 0,
            opponent_score: 0,
            last_outcome: None,
            final_result: None,
        }
    }

    // ── Inbound updates ─────────────────────────────────────────────

    /// Record the opponent found by the matchmaker.
    pub fn match_found(&mut self, opponent_name: String, level: String, number_of_questions: u32) {
        self.match_info = Some(MatchInfo {
            opponent_name,
            level,
            number_of_questions,
        });
    }

    /// Replace the live question and restart the countdown from the ceiling.
    pub fn begin_question(&mut self, question: Question, index: u32, start_time: u64) {
        self.live = Some(LiveQuestion {
            question,
            index,
            start_time,
            answered: false,
        });
        self.countdown = self.question_secs;
        self.last_outcome = None;
    }

    /// Merge a server-authoritative `ANSWER_RESULT`. The total overwrites the
    /// local score.
    pub fn apply_answer_result(
        &mut self,
        correct: bool,
        score_gained: u32,
        total_score: u32,
        correct_answer_index: u32,
        timeout: bool,
    ) {
        self.my_score = total_score;
        self.last_outcome = Some(AnswerOutcome {
            correct,
            score_gained,
            correct_answer_index,
            timeout,
        });
    }

    /// Overwrite the opponent's displayed score. Does not touch the local
    /// answer lock.
    pub fn apply_opponent_answered(&mut self, opponent_score: u32) {
        self.opponent_score = opponent_score;
    }

    /// Store the final result and stop the countdown.
    pub fn finish(&mut self, result: GameResult) {
        self.live = None;
        self.final_result = Some(result);
    }

    // ── User actions ────────────────────────────────────────────────

    /// Attempt to submit an answer for the live question.
    ///
    /// Returns the `ANSWER_QUESTION` message to send, or `None` when there is
    /// no live question or an answer was already submitted for it (the
    /// idempotence guard against double clicks). `now_ms` is wall-clock epoch
    /// milliseconds; elapsed time saturates at zero against clock skew.
    pub fn submit(&mut self, answer_index: u32, now_ms: u64) -> Option<ClientMessage> {
        let live = self.live.as_mut()?;
        if live.answered {
            return None;
        }
        live.answered = true;
        Some(ClientMessage::AnswerQuestion {
            question_index: live.index,
            answer_index,
            answer_time: now_ms.saturating_sub(live.start_time),
        })
    }

    // ── Countdown ───────────────────────────────────────────────────

    /// Advance the countdown by one second.
    ///
    /// Returns the remaining seconds after the tick, or `None` when no
    /// question is live or the countdown already reached zero. The countdown
    /// is *not* stopped by the local answer — it keeps running so the player
    /// can watch the opponent's remaining time.
    pub fn tick(&mut self) -> Option<u8> {
        if self.live.is_none() || self.countdown == 0 {
            return None;
        }
        self.countdown -= 1;
        Some(self.countdown)
    }

    /// Whether the per-question countdown is currently running.
    pub fn countdown_running(&self) -> bool {
        self.live.is_some() && self.countdown > 0
    }

    // ── Resets (phase side effects) ─────────────────────────────────

    /// Entering `Waiting`: clear prior opponent, score and result state.
    pub fn clear_scores(&mut self) {
        self.match_info = None;
        self.my_score = 0;
        self.opponent_score = 0;
        self.last_outcome = None;
        self.final_result = None;
    }

    /// Entering `Matched`: clear prior question state.
    pub fn clear_question(&mut self) {
        self.live = None;
        self.countdown = 0;
        self.last_outcome = None;
    }

    /// Entering `Idle`: reset the whole session.
    pub fn reset(&mut self) {
        self.clear_scores();
        self.clear_question();
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn countdown(&self) -> u8 {
        self.countdown
    }

    /// `(local, opponent)` scores.
    pub fn scores(&self) -> (u32, u32) {
        (self.my_score, self.opponent_score)
    }

    pub fn match_info(&self) -> Option<&MatchInfo> {
        self.match_info.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&AnswerOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn final_result(&self) -> Option<&GameResult> {
        self.final_result.as_ref()
    }

    /// Index of the live question, if any.
    pub fn current_question_index(&self) -> Option<u32> {
        self.live.as_ref().map(|l| l.index)
    }

    /// The live question, if any.
    pub fn current_question(&self) -> Option<&Question> {
        self.live.as_ref().map(|l| &l.question)
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

    fn question() -> Question {
        Question {
            prompt: "日本語で「猫」は何ですか".into(),
            options: vec!["cat".into(), "dog".into(), "bird".into(), "fish".into()],
        }
    }

    fn session_with_question(start_time: u64) -> GameSessionController {
        let mut s = GameSessionController::new(10);
        s.begin_question(question(), 0, start_time);
        s
    }

    #[test]
    fn submit_sends_exactly_once_per_question() {
        let mut s = session_with_question(1_000);

        let first = s.submit(2, 4_000).unwrap();
        assert_eq!(
            first,
            ClientMessage::AnswerQuestion {
                question_index: 0,
                answer_index: 2,
                answer_time: 3_000,
            }
        );

        // Double click: refused.
        assert!(s.submit(1, 5_000).is_none());
        assert!(s.submit(2, 5_000).is_none());
    }

    #[test]
    fn submit_without_live_question_is_refused() {
        let mut s = GameSessionController::new(10);
        assert!(s.submit(0, 1_000).is_none());
    }

    #[test]
    fn answer_lock_resets_on_next_question() {
        let mut s = session_with_question(1_000);
        assert!(s.submit(0, 2_000).is_some());

        s.begin_question(question(), 1, 20_000);
        let msg = s.submit(3, 26_500).unwrap();
        assert_eq!(
            msg,
            ClientMessage::AnswerQuestion {
                question_index: 1,
                answer_index: 3,
                answer_time: 6_500,
            }
        );
    }

    #[test]
    fn answer_time_saturates_at_zero() {
        // Local clock behind the server-declared start.
        let mut s = session_with_question(10_000);
        let msg = s.submit(0, 9_000).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::AnswerQuestion { answer_time: 0, .. }
        ));
    }

    #[test]
    fn countdown_reaches_zero_after_ten_ticks_and_clamps() {
        let mut s = session_with_question(0);
        assert_eq!(s.countdown(), 10);

        for expected in (0..10).rev() {
            assert_eq!(s.tick(), Some(expected));
        }
        assert_eq!(s.countdown(), 0);

        // Exhausted: further ticks are refused, value never goes negative.
        assert_eq!(s.tick(), None);
        assert_eq!(s.countdown(), 0);
    }

    #[test]
    fn countdown_keeps_running_after_local_answer() {
        let mut s = session_with_question(0);
        s.tick();
        assert!(s.submit(1, 1_000).is_some());

        // Answering must not pause the clock — the opponent is still on it.
        assert!(s.countdown_running());
        assert_eq!(s.tick(), Some(8));
    }

    #[test]
    fn scores_are_overwritten_never_accumulated() {
        let mut s = session_with_question(0);

        s.apply_answer_result(true, 100, 100, 0, false);
        assert_eq!(s.scores(), (100, 0));

        // The server total is authoritative; 100 + 250 is wrong, 250 is right.
        s.apply_answer_result(true, 150, 250, 1, false);
        assert_eq!(s.scores(), (250, 0));

        s.apply_opponent_answered(180);
        assert_eq!(s.scores(), (250, 180));
    }

    #[test]
    fn opponent_answered_does_not_release_answer_lock() {
        let mut s = session_with_question(0);
        assert!(s.submit(0, 100).is_some());
        s.apply_opponent_answered(50);
        assert!(s.submit(1, 200).is_none());
    }

    #[test]
    fn timeout_result_is_recorded_as_sent() {
        let mut s = session_with_question(0);
        s.apply_answer_result(false, 0, 0, 2, true);
        let outcome = s.last_outcome().unwrap();
        assert!(outcome.timeout);
        assert!(!outcome.correct);
        assert_eq!(outcome.correct_answer_index, 2);
    }

    #[test]
    fn finish_stops_countdown_and_freezes_result() {
        let mut s = session_with_question(0);
        s.apply_answer_result(true, 100, 100, 0, false);

        let result = GameResult {
            player1_name: "aki".into(),
            player1_score: 100,
            player2_name: "yuki".into(),
            player2_score: 80,
            winner_id: Some("aki".into()),
            reason: None,
        };
        s.finish(result.clone());

        assert!(!s.countdown_running());
        assert_eq!(s.tick(), None);
        assert_eq!(s.final_result(), Some(&result));
        assert_eq!(s.scores(), (100, 0), "score frozen at the last total");
    }

    #[test]
    fn clear_scores_wipes_opponent_and_result_state() {
        let mut s = session_with_question(0);
        s.match_found("yuki".into(), "N3".into(), 5);
        s.apply_answer_result(true, 100, 100, 0, false);
        s.apply_opponent_answered(80);

        s.clear_scores();
        assert_eq!(s.scores(), (0, 0));
        assert!(s.match_info().is_none());
        assert!(s.last_outcome().is_none());
        assert!(s.final_result().is_none());
    }

    #[test]
    fn clear_question_keeps_scores() {
        let mut s = session_with_question(0);
        s.apply_answer_result(true, 100, 100, 0, false);

        s.clear_question();
        assert!(s.current_question_index().is_none());
        assert_eq!(s.countdown(), 0);
        assert_eq!(s.scores(), (100, 0));
    }
}
