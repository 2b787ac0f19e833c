//! # Kotoba Battle Client
//!
//! Transport-agnostic Rust client for the Kotoba real-time vocabulary battle
//! protocol: 1v1 quiz matches with matchmaking, per-question countdowns and
//! live score updates, over JSON text messages on any bidirectional transport.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any backend
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   [`WebSocketConnector`](transports::WebSocketConnector)
//! - **Event-driven** — receive typed [`BattleEvent`]s via a channel
//! - **Resilient** — in-band token refresh and bounded automatic reconnection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kotoba_battle_client::{BattleClient, BattleConfig, BattleEvent};
//! use kotoba_battle_client::transports::{BattleEndpoint, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new(BattleEndpoint::new("wss", "battle.kotoba.app"));
//! let (mut client, mut events) =
//!     BattleClient::connect(connector, my_token_supplier, BattleConfig::new()).await?;
//!
//! client.join_queue("N3")?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

#[cfg(feature = "tokio-runtime")]
pub mod client;
#[cfg(feature = "tokio-runtime")]
pub mod connection;
pub mod error;
pub mod event;
pub mod phase;
pub mod protocol;
pub mod session;
pub mod token;
pub mod transport;

#[cfg(feature = "transport-websocket")]
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::{BattleClient, BattleConfig};
#[cfg(feature = "tokio-runtime")]
pub use connection::ReconnectPolicy;
pub use error::BattleClientError;
pub use event::BattleEvent;
pub use phase::GamePhase;
pub use protocol::{ClientMessage, GameResult, Question, ServerMessage};
pub use session::{AnswerOutcome, MatchInfo};
pub use token::{BattleToken, GuardedSupplier, TokenSupplier};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{BattleEndpoint, WebSocketConnector, WebSocketTransport};
