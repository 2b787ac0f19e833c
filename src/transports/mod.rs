//! Transport implementations for the battle protocol.
//!
//! Concrete [`Transport`](crate::Transport) implementations live here behind
//! feature gates:
//!
//! | Feature                | Types                                        |
//! |------------------------|----------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), kotoba_battle_client::BattleClientError> {
//! use kotoba_battle_client::transports::websocket::BattleEndpoint;
//! use kotoba_battle_client::WebSocketConnector;
//!
//! let connector = WebSocketConnector::new(BattleEndpoint::new("wss", "battle.kotoba.app"));
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{BattleEndpoint, WebSocketConnector, WebSocketTransport};
