//! Connection and session management for the battle protocol.
//!
//! [`session_loop`] is the single event-driven task that owns the live
//! transport, the phase state machine, the session state and both timers
//! (per-question countdown and token refresh), multiplexed with
//! `tokio::select!`. All mutation happens on this task, so no locking is
//! needed beyond the shared read-only snapshot the handle exposes.
//!
//! Failure handling follows a strict taxonomy:
//!
//! - **Abnormal close** (receive error, send error, non-normal close status):
//!   both timers stop, then the bounded reconnection loop runs — up to
//!   [`ReconnectPolicy::max_attempts`] attempts, each preceded by the fixed
//!   delay, connecting with the most recently issued token. Exhaustion is a
//!   terminal, user-visible failure.
//! - **Credential failure** (token refresh fails): session-fatal, never
//!   retried; the loop closes the connection and exits.
//! - **Clean close** (server closed with the normal status): no reconnect.
//! - **Intentional close** (shutdown signal): wins over any concurrently
//!   observed failure — once the signal fires no reconnect attempt can be
//!   scheduled.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::SharedState;
use crate::error::{BattleClientError, Result};
use crate::event::BattleEvent;
use crate::phase::{BattleStateMachine, GamePhase, PhaseChange, PhaseInput};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::GameSessionController;
use crate::token::{BattleToken, TokenSupplier};
use crate::transport::{Connector, Transport};

/// Default number of reconnection attempts after an abnormal close.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Default spacing between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Bounded retry policy for establishing and re-establishing the connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts made before surfacing a terminal connection failure.
    pub max_attempts: u32,
    /// Fixed delay before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Loop parameters carved out of the public config.
pub(crate) struct SessionParams {
    pub question_secs: u8,
    pub reconnect: ReconnectPolicy,
    pub token_refresh_period: Duration,
}

/// User intents queued from the [`BattleClient`](crate::BattleClient) handle.
#[derive(Debug)]
pub(crate) enum Command {
    JoinQueue { level: String },
    LeaveQueue,
    Ready,
    SubmitAnswer { answer_index: u32 },
    PlayAgain,
}

/// Outcome of one select-arm iteration.
enum Step {
    Continue,
    /// End the session without reconnecting (clean close / shutdown).
    Close(Option<String>),
    /// Abnormal connection loss; run the reconnection loop.
    Abnormal(String),
}

/// Outcome of the bounded reconnection loop.
enum Reopen<T> {
    Connected(T),
    /// The shutdown signal fired (or the handle was dropped) mid-retry.
    Shutdown,
    Failed(BattleClientError),
}

// ── Connection establishment ────────────────────────────────────────

/// Open the initial connection, retrying under `policy` on failure.
pub(crate) async fn establish<C: Connector>(
    connector: &mut C,
    token: &BattleToken,
    policy: &ReconnectPolicy,
) -> Result<C::Transport> {
    match connector.connect(token).await {
        Ok(transport) => return Ok(transport),
        Err(e) => warn!("initial connection attempt failed: {e}"),
    }
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.delay).await;
        debug!(attempt, "retrying connection");
        match connector.connect(token).await {
            Ok(transport) => return Ok(transport),
            Err(e) => warn!(attempt, "connection attempt failed: {e}"),
        }
    }
    Err(BattleClientError::ConnectionFailed {
        attempts: policy.max_attempts,
    })
}

// ── Timers ──────────────────────────────────────────────────────────

/// Refresh timer: first tick one full period after the connection opened.
fn new_refresh_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Countdown timer: ticks once per second, first tick one second from now.
/// Recreated whenever a new question goes live.
fn new_countdown_timer() -> Interval {
    let mut timer = interval_at(
        Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

// ── Session loop ────────────────────────────────────────────────────

/// Background task driving one battle session.
///
/// Exits when: the shutdown signal fires, the handle is dropped (command
/// channel closes), the server closes the connection normally, token refresh
/// fails, or the reconnection policy is exhausted.
pub(crate) async fn session_loop<C, S>(
    mut connector: C,
    supplier: Arc<S>,
    mut transport: C::Transport,
    mut token: BattleToken,
    params: SessionParams,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<BattleEvent>,
    shared: Arc<SharedState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    C: Connector,
    S: TokenSupplier,
{
    debug!("session loop started");

    let mut machine = BattleStateMachine::new();
    let mut session = GameSessionController::new(params.question_secs);

    emit_event(&event_tx, BattleEvent::Connected).await;

    let mut refresh = new_refresh_timer(params.token_refresh_period);
    let mut countdown = new_countdown_timer();

    loop {
        let step = tokio::select! {
            // Branch 1: user intent from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        handle_command(
                            cmd,
                            &mut transport,
                            &mut machine,
                            &mut session,
                            &shared,
                            &event_tx,
                        )
                        .await
                    }
                    // Command channel closed — handle dropped.
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        Step::Close(Some("client shut down".into()))
                    }
                }
            }

            // Branch 2: intentional disconnect
            _ = &mut shutdown_rx => {
                debug!("disconnect requested");
                Step::Close(Some("client disconnected".into()))
            }

            // Branch 3: periodic token refresh
            _ = refresh.tick() => {
                match supplier.issue().await {
                    Ok(new_token) => {
                        debug!("battle token refreshed");
                        token = new_token;
                        let msg = ClientMessage::RefreshToken(token.as_str().to_owned());
                        match send_message(&mut transport, &msg).await {
                            Ok(()) => Step::Continue,
                            Err(BattleClientError::Serialization(e)) => {
                                error!("failed to serialize REFRESH_TOKEN: {e}");
                                Step::Continue
                            }
                            Err(e) => Step::Abnormal(format!("transport send error: {e}")),
                        }
                    }
                    // Credential failure is session-fatal: disconnect and
                    // force re-authentication, never retry internally.
                    Err(e) => {
                        error!("token refresh failed: {e}");
                        Step::Close(Some(format!("token refresh failed: {e}")))
                    }
                }
            }

            // Branch 4: per-question countdown, while a question is live
            _ = countdown.tick(), if session.countdown_running() => {
                if let Some(remaining) = session.tick() {
                    emit_event(&event_tx, BattleEvent::CountdownTick { remaining }).await;
                }
                Step::Continue
            }

            // Branch 5: inbound message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                // A newly live question restarts the 1 Hz
                                // countdown clock from its own start.
                                if machine.phase() == GamePhase::Playing
                                    && matches!(msg, ServerMessage::Question { .. })
                                {
                                    countdown = new_countdown_timer();
                                }
                                handle_server_message(
                                    msg,
                                    &mut machine,
                                    &mut session,
                                    &shared,
                                    &event_tx,
                                )
                                .await;
                            }
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                        Step::Continue
                    }
                    Some(Err(e)) => Step::Abnormal(format!("transport receive error: {e}")),
                    // Server closed with the normal status — never reconnect.
                    None => {
                        debug!("connection closed by server");
                        Step::Close(None)
                    }
                }
            }
        };

        match step {
            Step::Continue => {}
            Step::Close(reason) => {
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &shared, reason).await;
                break;
            }
            Step::Abnormal(reason) => {
                warn!(%reason, "abnormal connection loss");
                // Timers stop first: neither can fire again before a
                // reconnect attempt is scheduled, because only this task
                // polls them.
                shared.connected.store(false, Ordering::Release);
                match reopen(
                    &mut connector,
                    &token,
                    &params.reconnect,
                    &event_tx,
                    &mut cmd_rx,
                    &mut shutdown_rx,
                )
                .await
                {
                    Reopen::Connected(t) => {
                        transport = t;
                        shared.connected.store(true, Ordering::Release);
                        // A fresh connection restarts the refresh cadence.
                        refresh = new_refresh_timer(params.token_refresh_period);
                        countdown = new_countdown_timer();
                        emit_event(&event_tx, BattleEvent::Connected).await;
                    }
                    Reopen::Shutdown => {
                        emit_disconnected(&event_tx, &shared, Some("client disconnected".into()))
                            .await;
                        break;
                    }
                    Reopen::Failed(e) => {
                        emit_disconnected(&event_tx, &shared, Some(e.to_string())).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("session loop exited");
}

/// Bounded reconnection: up to `policy.max_attempts` attempts, each preceded
/// by `policy.delay`. The shutdown signal aborts immediately; commands
/// arriving while disconnected are dropped, never queued.
async fn reopen<C: Connector>(
    connector: &mut C,
    token: &BattleToken,
    policy: &ReconnectPolicy,
    event_tx: &mpsc::Sender<BattleEvent>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Reopen<C::Transport> {
    for attempt in 1..=policy.max_attempts {
        let delay = tokio::time::sleep(policy.delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                _ = &mut *shutdown_rx => return Reopen::Shutdown,
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => warn!(?cmd, "dropping command while disconnected"),
                        None => return Reopen::Shutdown,
                    }
                }
            }
        }

        emit_event(event_tx, BattleEvent::Reconnecting { attempt }).await;
        match connector.connect(token).await {
            Ok(transport) => {
                info!(attempt, "reconnected");
                return Reopen::Connected(transport);
            }
            Err(e) => warn!(attempt, "reconnection attempt failed: {e}"),
        }
    }
    Reopen::Failed(BattleClientError::ConnectionFailed {
        attempts: policy.max_attempts,
    })
}

// ── Command handling ────────────────────────────────────────────────

async fn handle_command<T: Transport>(
    cmd: Command,
    transport: &mut T,
    machine: &mut BattleStateMachine,
    session: &mut GameSessionController,
    shared: &SharedState,
    event_tx: &mpsc::Sender<BattleEvent>,
) -> Step {
    match cmd {
        Command::JoinQueue { level } => {
            if machine.phase() != GamePhase::Idle {
                debug!(phase = ?machine.phase(), "ignoring join_queue");
                return Step::Continue;
            }
            let msg = ClientMessage::JoinQueue { level };
            // Send first; the phase only advances once the send succeeded.
            match send_message(transport, &msg).await {
                Ok(()) => {
                    if let Some(change) = machine.apply(PhaseInput::JoinQueue) {
                        apply_phase_change(change, session, shared, event_tx).await;
                    }
                    Step::Continue
                }
                Err(BattleClientError::Serialization(e)) => {
                    error!("failed to serialize JOIN_QUEUE: {e}");
                    Step::Continue
                }
                Err(e) => Step::Abnormal(format!("transport send error: {e}")),
            }
        }
        Command::LeaveQueue => {
            if machine.phase() != GamePhase::Waiting {
                debug!(phase = ?machine.phase(), "ignoring leave_queue");
                return Step::Continue;
            }
            match send_message(transport, &ClientMessage::LeaveQueue).await {
                Ok(()) => {
                    if let Some(change) = machine.apply(PhaseInput::LeaveQueue) {
                        apply_phase_change(change, session, shared, event_tx).await;
                    }
                    Step::Continue
                }
                Err(BattleClientError::Serialization(e)) => {
                    error!("failed to serialize LEAVE_QUEUE: {e}");
                    Step::Continue
                }
                Err(e) => Step::Abnormal(format!("transport send error: {e}")),
            }
        }
        Command::Ready => {
            // The latch guarantees one READY per match; the server emits
            // GAME_START once both players have sent theirs.
            if !machine.ready_pending() {
                debug!(phase = ?machine.phase(), "ignoring ready");
                return Step::Continue;
            }
            // Send first; the latch is claimed only once the READY is on the
            // wire, so a failed send can be retried after reconnecting.
            match send_message(transport, &ClientMessage::Ready).await {
                Ok(()) => {
                    machine.mark_ready();
                    Step::Continue
                }
                Err(BattleClientError::Serialization(e)) => {
                    error!("failed to serialize READY: {e}");
                    Step::Continue
                }
                Err(e) => Step::Abnormal(format!("transport send error: {e}")),
            }
        }
        Command::SubmitAnswer { answer_index } => {
            if machine.phase() != GamePhase::Playing {
                debug!(phase = ?machine.phase(), "ignoring submit_answer");
                return Step::Continue;
            }
            // The session's answer lock absorbs double clicks.
            let Some(msg) = session.submit(answer_index, now_ms()) else {
                debug!("answer already submitted for current question");
                return Step::Continue;
            };
            match send_message(transport, &msg).await {
                Ok(()) => Step::Continue,
                Err(BattleClientError::Serialization(e)) => {
                    error!("failed to serialize ANSWER_QUESTION: {e}");
                    Step::Continue
                }
                Err(e) => Step::Abnormal(format!("transport send error: {e}")),
            }
        }
        // Purely local: no outbound message.
        Command::PlayAgain => {
            if let Some(change) = machine.apply(PhaseInput::PlayAgain) {
                apply_phase_change(change, session, shared, event_tx).await;
            } else {
                debug!(phase = ?machine.phase(), "ignoring play_again");
            }
            Step::Continue
        }
    }
}

// ── Inbound message handling ────────────────────────────────────────

/// Route a decoded server message. Messages that are not legal for the
/// current phase are ignored (logged at debug), per the total-function rule.
async fn handle_server_message(
    msg: ServerMessage,
    machine: &mut BattleStateMachine,
    session: &mut GameSessionController,
    shared: &SharedState,
    event_tx: &mpsc::Sender<BattleEvent>,
) {
    match msg {
        ServerMessage::QueueJoined => {
            emit_event(event_tx, BattleEvent::QueueJoined).await;
        }
        ServerMessage::MatchFound {
            opponent_name,
            level,
            number_of_questions,
        } => {
            let Some(change) = machine.apply(PhaseInput::MatchFound) else {
                debug!(phase = ?machine.phase(), "ignoring MATCH_FOUND");
                return;
            };
            apply_phase_change(change, session, shared, event_tx).await;
            session.match_found(opponent_name.clone(), level.clone(), number_of_questions);
            sync_shared(shared, session).await;
            emit_event(
                event_tx,
                BattleEvent::MatchFound {
                    opponent_name,
                    level,
                    number_of_questions,
                },
            )
            .await;
        }
        ServerMessage::GameStart { questions } => {
            let Some(change) = machine.apply(PhaseInput::GameStart) else {
                debug!(phase = ?machine.phase(), "ignoring GAME_START");
                return;
            };
            apply_phase_change(change, session, shared, event_tx).await;
            emit_event(
                event_tx,
                BattleEvent::GameStarted {
                    number_of_questions: questions.len() as u32,
                },
            )
            .await;
        }
        ServerMessage::Question {
            question,
            question_index,
            start_time,
        } => {
            if machine.phase() != GamePhase::Playing {
                debug!(phase = ?machine.phase(), "ignoring QUESTION");
                return;
            }
            session.begin_question(question.clone(), question_index, start_time);
            emit_event(
                event_tx,
                BattleEvent::QuestionPosed {
                    question,
                    question_index,
                    countdown: session.countdown(),
                },
            )
            .await;
        }
        ServerMessage::AnswerResult {
            correct,
            score_gained,
            total_score,
            correct_answer_index,
            timeout,
        } => {
            if machine.phase() != GamePhase::Playing {
                debug!(phase = ?machine.phase(), "ignoring ANSWER_RESULT");
                return;
            }
            session.apply_answer_result(
                correct,
                score_gained,
                total_score,
                correct_answer_index,
                timeout,
            );
            sync_shared(shared, session).await;
            emit_event(
                event_tx,
                BattleEvent::AnswerJudged {
                    correct,
                    score_gained,
                    total_score,
                    correct_answer_index,
                    timeout,
                },
            )
            .await;
        }
        ServerMessage::OpponentAnswered { opponent_score } => {
            if machine.phase() != GamePhase::Playing {
                debug!(phase = ?machine.phase(), "ignoring OPPONENT_ANSWERED");
                return;
            }
            session.apply_opponent_answered(opponent_score);
            sync_shared(shared, session).await;
            emit_event(event_tx, BattleEvent::OpponentAnswered { opponent_score }).await;
        }
        ServerMessage::GameEnd(result) => {
            let Some(change) = machine.apply(PhaseInput::GameEnd) else {
                debug!(phase = ?machine.phase(), "ignoring GAME_END");
                return;
            };
            session.finish(result.clone());
            apply_phase_change(change, session, shared, event_tx).await;
            sync_shared(shared, session).await;
            emit_event(event_tx, BattleEvent::GameEnded { result }).await;
        }
        // Transient notice only; the phase is never changed by ERROR.
        ServerMessage::Error { error } => {
            warn!("server error: {error}");
            emit_event(event_tx, BattleEvent::ServerError { message: error }).await;
        }
    }
}

// ── Shared-state plumbing ───────────────────────────────────────────

/// Run the side effects of a phase transition, publish the new phase, and
/// emit [`BattleEvent::PhaseChanged`].
async fn apply_phase_change(
    change: PhaseChange,
    session: &mut GameSessionController,
    shared: &SharedState,
    event_tx: &mpsc::Sender<BattleEvent>,
) {
    match change.to {
        GamePhase::Waiting => session.clear_scores(),
        GamePhase::Matched => session.clear_question(),
        GamePhase::Idle => session.reset(),
        // Playing has no reset; Ended freezes via `finish`.
        GamePhase::Playing | GamePhase::Ended => {}
    }
    *shared.phase.lock().await = change.to;
    sync_shared(shared, session).await;
    emit_event(
        event_tx,
        BattleEvent::PhaseChanged {
            from: change.from,
            to: change.to,
        },
    )
    .await;
}

/// Copy the session's observable snapshot into the shared state.
async fn sync_shared(shared: &SharedState, session: &GameSessionController) {
    *shared.match_info.lock().await = session.match_info().cloned();
    *shared.scores.lock().await = session.scores();
    *shared.final_result.lock().await = session.final_result().cloned();
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn send_message<T: Transport>(transport: &mut T, msg: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    debug!("sending client message: {:?}", std::mem::discriminant(msg));
    transport.send(json).await
}

/// Wall-clock epoch milliseconds, used against the server-declared question
/// start time.
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Emit an event. If the channel is full, log and drop rather than blocking
/// the session loop.
async fn emit_event(event_tx: &mpsc::Sender<BattleEvent>, event: BattleEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit the final [`Disconnected`](BattleEvent::Disconnected) event and flip
/// the connected flag. Uses a blocking `send` because this event must never
/// be dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<BattleEvent>,
    shared: &SharedState,
    reason: Option<String>,
) {
    shared.connected.store(false, Ordering::Release);
    if event_tx
        .send(BattleEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}
