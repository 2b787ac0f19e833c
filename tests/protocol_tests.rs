//! Wire-format tests for the Kotoba Battle protocol types.
//!
//! Asserts exact JSON golden strings for outgoing messages (the server parses
//! these byte-for-byte shapes) and parses representative server payloads,
//! including defaulted and absent optional fields.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

use kotoba_battle_client::protocol::{ClientMessage, GameResult, Question, ServerMessage};

// ════════════════════════════════════════════════════════════════════
// Client → server goldens
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_queue_golden() {
    let msg = ClientMessage::JoinQueue { level: "N3".into() };
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"JOIN_QUEUE","payload":{"level":"N3"}}"#
    );
}

#[test]
fn leave_queue_golden() {
    // Unit variants carry no payload field at all.
    assert_eq!(
        serde_json::to_string(&ClientMessage::LeaveQueue).unwrap(),
        r#"{"type":"LEAVE_QUEUE"}"#
    );
}

#[test]
fn unit_payload_accepts_explicit_null() {
    // Servers that always write the payload key send it as null; both the
    // absent-key and null forms must parse to the same variant.
    let msg: ClientMessage = serde_json::from_str(r#"{"type":"LEAVE_QUEUE","payload":null}"#).unwrap();
    assert_eq!(msg, ClientMessage::LeaveQueue);

    let msg: ServerMessage = serde_json::from_str(r#"{"type":"QUEUE_JOINED","payload":null}"#).unwrap();
    assert_eq!(msg, ServerMessage::QueueJoined);
}

#[test]
fn ready_golden() {
    assert_eq!(
        serde_json::to_string(&ClientMessage::Ready).unwrap(),
        r#"{"type":"READY"}"#
    );
}

#[test]
fn answer_question_golden() {
    let msg = ClientMessage::AnswerQuestion {
        question_index: 3,
        answer_index: 1,
        answer_time: 4_250,
    };
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"ANSWER_QUESTION","payload":{"questionIndex":3,"answerIndex":1,"answerTime":4250}}"#
    );
}

#[test]
fn refresh_token_golden() {
    // The payload is the bare token string.
    let msg = ClientMessage::RefreshToken("tok-abc123".into());
    assert_eq!(
        serde_json::to_string(&msg).unwrap(),
        r#"{"type":"REFRESH_TOKEN","payload":"tok-abc123"}"#
    );
}

// ════════════════════════════════════════════════════════════════════
// Server → client parsing
// ════════════════════════════════════════════════════════════════════

#[test]
fn parse_queue_joined() {
    let msg: ServerMessage = serde_json::from_str(r#"{"type":"QUEUE_JOINED"}"#).unwrap();
    assert_eq!(msg, ServerMessage::QueueJoined);
}

#[test]
fn parse_match_found() {
    let json = r#"{"type":"MATCH_FOUND","payload":{"opponentName":"Yuki","level":"N3","numberOfQuestions":10}}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg,
        ServerMessage::MatchFound {
            opponent_name: "Yuki".into(),
            level: "N3".into(),
            number_of_questions: 10,
        }
    );
}

#[test]
fn parse_game_start_with_questions() {
    let json = r#"{"type":"GAME_START","payload":{"questions":[
        {"question":"「犬」の読み方は？","options":["いぬ","ねこ","とり","さかな"]}
    ]}}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    let ServerMessage::GameStart { questions } = msg else {
        panic!("expected GameStart, got {msg:?}");
    };
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].prompt, "「犬」の読み方は？");
    assert_eq!(questions[0].options[0], "いぬ");
}

#[test]
fn parse_question_with_start_time() {
    let json = r#"{"type":"QUESTION","payload":{
        "question":{"question":"q","options":["a","b"]},
        "questionIndex":4,
        "startTime":1756500000000
    }}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg,
        ServerMessage::Question {
            question: Question {
                prompt: "q".into(),
                options: vec!["a".into(), "b".into()],
            },
            question_index: 4,
            start_time: 1_756_500_000_000,
        }
    );
}

#[test]
fn parse_answer_result_with_timeout() {
    let json = r#"{"type":"ANSWER_RESULT","payload":{
        "correct":false,"scoreGained":0,"totalScore":150,
        "correctAnswerIndex":2,"timeout":true
    }}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg,
        ServerMessage::AnswerResult {
            correct: false,
            score_gained: 0,
            total_score: 150,
            correct_answer_index: 2,
            timeout: true,
        }
    );
}

#[test]
fn answer_result_timeout_defaults_to_false_when_absent() {
    let json = r#"{"type":"ANSWER_RESULT","payload":{
        "correct":true,"scoreGained":100,"totalScore":100,"correctAnswerIndex":0
    }}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert!(matches!(
        msg,
        ServerMessage::AnswerResult { timeout: false, .. }
    ));
}

#[test]
fn parse_opponent_answered() {
    let json = r#"{"type":"OPPONENT_ANSWERED","payload":{"opponentScore":220}}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg,
        ServerMessage::OpponentAnswered { opponent_score: 220 }
    );
}

#[test]
fn parse_game_end_with_winner() {
    let json = r#"{"type":"GAME_END","payload":{
        "player1Name":"Hikari","player1Score":300,
        "player2Name":"Yuki","player2Score":250,
        "winnerId":"player-1"
    }}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    let ServerMessage::GameEnd(result) = msg else {
        panic!("expected GameEnd, got {msg:?}");
    };
    assert_eq!(result.winner_id.as_deref(), Some("player-1"));
    assert!(!result.is_draw());
    assert!(result.reason.is_none());
}

#[test]
fn game_end_without_winner_is_a_draw() {
    // winnerId absent entirely.
    let json = r#"{"type":"GAME_END","payload":{
        "player1Name":"Hikari","player1Score":200,
        "player2Name":"Yuki","player2Score":200
    }}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    let ServerMessage::GameEnd(result) = msg else {
        panic!("expected GameEnd, got {msg:?}");
    };
    assert!(result.is_draw());

    // winnerId explicitly null.
    let json = r#"{"type":"GAME_END","payload":{
        "player1Name":"Hikari","player1Score":200,
        "player2Name":"Yuki","player2Score":200,
        "winnerId":null,"reason":"time expired"
    }}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    let ServerMessage::GameEnd(result) = msg else {
        panic!("expected GameEnd, got {msg:?}");
    };
    assert!(result.is_draw());
    assert_eq!(result.reason.as_deref(), Some("time expired"));
}

#[test]
fn parse_server_error() {
    let json = r#"{"type":"ERROR","payload":{"error":"invalid level"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg,
        ServerMessage::Error {
            error: "invalid level".into(),
        }
    );
}

#[test]
fn unknown_message_type_fails_to_parse() {
    let result = serde_json::from_str::<ServerMessage>(r#"{"type":"NO_SUCH_TYPE"}"#);
    assert!(result.is_err());
}

#[test]
fn game_result_draw_is_not_serialized_with_null_fields() {
    // Optional fields are skipped when None so round-trips stay canonical.
    let result = GameResult {
        player1_name: "a".into(),
        player1_score: 1,
        player2_name: "b".into(),
        player2_score: 1,
        winner_id: None,
        reason: None,
    };
    let json = serde_json::to_string(&result).unwrap();
    assert_eq!(
        json,
        r#"{"player1Name":"a","player1Score":1,"player2Name":"b","player2Score":1}"#
    );
}

#[test]
fn client_message_round_trip() {
    let original = ClientMessage::AnswerQuestion {
        question_index: 2,
        answer_index: 0,
        answer_time: 1_234,
    };
    let json = serde_json::to_string(&original).unwrap();
    let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, original);
}
