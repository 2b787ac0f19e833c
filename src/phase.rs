//! The battle phase state machine.
//!
//! [`GamePhase`] is the single authoritative stage of a battle session.
//! [`BattleStateMachine::apply`] is a *total* function over
//! `(phase, input)`: any pair not in the transition table leaves the phase
//! unchanged and returns `None`. Out-of-order server messages and stray user
//! actions are therefore no-ops, never errors.

/// The authoritative stage of a battle session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    /// Not in a queue or battle.
    #[default]
    Idle,
    /// In the matchmaking queue, waiting for an opponent.
    Waiting,
    /// Matched with an opponent, waiting for both sides to be ready.
    Matched,
    /// Battle in progress.
    Playing,
    /// Battle finished; final result available.
    Ended,
}

/// Inputs that can drive a phase transition — user intents and the subset of
/// inbound message types the state machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInput {
    /// User intent: enter the matchmaking queue.
    JoinQueue,
    /// User intent: leave the matchmaking queue.
    LeaveQueue,
    /// Inbound `MATCH_FOUND`.
    MatchFound,
    /// Inbound `GAME_START`.
    GameStart,
    /// Inbound `GAME_END`.
    GameEnd,
    /// User intent: return to idle after a finished battle.
    PlayAgain,
}

/// A transition that actually occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: GamePhase,
    pub to: GamePhase,
}

/// Holds the current [`GamePhase`] and the once-per-match ready latch.
#[derive(Debug, Default)]
pub struct BattleStateMachine {
    phase: GamePhase,
    ready_sent: bool,
}

impl BattleStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Apply an input. Returns the transition if the input is legal for the
    /// current phase, or `None` (phase unchanged) otherwise.
    pub fn apply(&mut self, input: PhaseInput) -> Option<PhaseChange> {
        use GamePhase::*;
        use PhaseInput::*;

        let next = match (self.phase, input) {
            (Idle, JoinQueue) => Waiting,
            (Waiting, LeaveQueue) => Idle,
            (Waiting, MatchFound) => Matched,
            (Matched, GameStart) => Playing,
            (Playing, GameEnd) => Ended,
            (Ended, PlayAgain) => Idle,
            _ => return None,
        };

        // A new match always starts unready.
        if next == Matched {
            self.ready_sent = false;
        }

        let change = PhaseChange {
            from: self.phase,
            to: next,
        };
        self.phase = next;
        Some(change)
    }

    /// Whether a `READY` is still owed for the current match: in
    /// [`GamePhase::Matched`] with the latch unclaimed.
    pub fn ready_pending(&self) -> bool {
        self.phase == GamePhase::Matched && !self.ready_sent
    }

    /// Claim the ready latch. Returns `true` exactly once per match, and only
    /// while in [`GamePhase::Matched`]. Callers claim it only after the
    /// `READY` message is actually on the wire, so a failed send leaves the
    /// latch available for a retry.
    pub fn mark_ready(&mut self) -> bool {
        if self.ready_pending() {
            self.ready_sent = true;
            true
        } else {
            false
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

    const ALL_PHASES: [GamePhase; 5] = [
        GamePhase::Idle,
        GamePhase::Waiting,
        GamePhase::Matched,
        GamePhase::Playing,
        GamePhase::Ended,
    ];

    const ALL_INPUTS: [PhaseInput; 6] = [
        PhaseInput::JoinQueue,
        PhaseInput::LeaveQueue,
        PhaseInput::MatchFound,
        PhaseInput::GameStart,
        PhaseInput::GameEnd,
        PhaseInput::PlayAgain,
    ];

    /// The legal transition table, used to derive the expected outcome for
    /// every (phase, input) pair.
    fn expected(phase: GamePhase, input: PhaseInput) -> Option<GamePhase> {
        use GamePhase::*;
        use PhaseInput::*;
        match (phase, input) {
            (Idle, JoinQueue) => Some(Waiting),
            (Waiting, LeaveQueue) => Some(Idle),
            (Waiting, MatchFound) => Some(Matched),
            (Matched, GameStart) => Some(Playing),
            (Playing, GameEnd) => Some(Ended),
            (Ended, PlayAgain) => Some(Idle),
            _ => None,
        }
    }

    fn machine_in(phase: GamePhase) -> BattleStateMachine {
        let mut sm = BattleStateMachine::new();
        // Walk the happy path until the requested phase is reached.
        let path = [
            PhaseInput::JoinQueue,
            PhaseInput::MatchFound,
            PhaseInput::GameStart,
            PhaseInput::GameEnd,
        ];
        for input in path {
            if sm.phase() == phase {
                break;
            }
            sm.apply(input);
        }
        assert_eq!(sm.phase(), phase, "failed to drive machine to {phase:?}");
        sm
    }

    #[test]
    fn every_legal_transition_fires() {
        for phase in ALL_PHASES {
            for input in ALL_INPUTS {
                if let Some(to) = expected(phase, input) {
                    let mut sm = machine_in(phase);
                    let change = sm.apply(input).unwrap();
                    assert_eq!(change.from, phase);
                    assert_eq!(change.to, to);
                    assert_eq!(sm.phase(), to);
                }
            }
        }
    }

    #[test]
    fn every_illegal_input_is_a_no_op() {
        for phase in ALL_PHASES {
            for input in ALL_INPUTS {
                if expected(phase, input).is_none() {
                    let mut sm = machine_in(phase);
                    assert_eq!(sm.apply(input), None, "{phase:?} + {input:?}");
                    assert_eq!(sm.phase(), phase, "{phase:?} + {input:?} moved the phase");
                }
            }
        }
    }

    #[test]
    fn starts_idle() {
        assert_eq!(BattleStateMachine::new().phase(), GamePhase::Idle);
    }

    #[test]
    fn ready_latch_fires_once_while_matched() {
        let mut sm = machine_in(GamePhase::Matched);
        assert!(sm.mark_ready());
        assert!(!sm.mark_ready(), "second mark_ready must be refused");
    }

    #[test]
    fn ready_stays_pending_until_claimed() {
        let mut sm = machine_in(GamePhase::Matched);
        // Checking does not consume: a caller whose send failed can retry.
        assert!(sm.ready_pending());
        assert!(sm.ready_pending());
        assert!(sm.mark_ready());
        assert!(!sm.ready_pending());
    }

    #[test]
    fn ready_latch_refused_outside_matched() {
        for phase in [GamePhase::Idle, GamePhase::Waiting, GamePhase::Playing] {
            let mut sm = machine_in(phase);
            assert!(!sm.mark_ready(), "ready accepted in {phase:?}");
        }
    }

    #[test]
    fn reentering_matched_resets_ready_latch() {
        let mut sm = machine_in(GamePhase::Matched);
        assert!(sm.mark_ready());

        // Finish the battle and queue up again.
        sm.apply(PhaseInput::GameStart);
        sm.apply(PhaseInput::GameEnd);
        sm.apply(PhaseInput::PlayAgain);
        sm.apply(PhaseInput::JoinQueue);
        sm.apply(PhaseInput::MatchFound);

        assert_eq!(sm.phase(), GamePhase::Matched);
        assert!(sm.mark_ready(), "new match must start unready");
    }

    #[test]
    fn match_found_after_leaving_queue_is_ignored() {
        let mut sm = BattleStateMachine::new();
        sm.apply(PhaseInput::JoinQueue);
        sm.apply(PhaseInput::LeaveQueue);
        // A straggler MATCH_FOUND must not resurrect the session.
        assert_eq!(sm.apply(PhaseInput::MatchFound), None);
        assert_eq!(sm.phase(), GamePhase::Idle);
    }
}
