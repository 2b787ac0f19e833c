//! Transport abstraction for the battle protocol.
//!
//! The battle protocol runs over any persistent bidirectional text channel.
//! Two seams are defined here:
//!
//! - [`Transport`] — one live connection shuttling serialized JSON envelopes.
//! - [`Connector`] — opens a *fresh* connection addressed with a battle
//!   token. The bounded reconnection loop re-invokes this seam after an
//!   abnormal close, so connection setup is deliberately separate from the
//!   live-connection trait.
//!
//! # Close classification
//!
//! The distinction between intentional and abnormal closure is carried in the
//! [`recv`](Transport::recv) return value: `None` means the connection ended
//! normally (close status 1000, or a clean end of stream) and must never
//! trigger reconnection; `Some(Err(_))` means an abnormal end and is what the
//! client retries on.
//!
//! # Implementing a custom transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use kotoba_battle_client::error::BattleClientError;
//! use kotoba_battle_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), BattleClientError> {
//!         // Send one JSON envelope over your channel
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, BattleClientError>> {
//!         // Receive the next envelope; None on normal closure
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), BattleClientError> {
//!         // Close with the normal status code
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::BattleClientError;
use crate::token::BattleToken;

/// A live bidirectional text channel carrying battle protocol envelopes.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data. Channel-backed
/// implementations are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one serialized JSON envelope to the server.
    ///
    /// # Errors
    ///
    /// Returns [`BattleClientError::TransportSend`] if the message could not
    /// be transmitted (connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), BattleClientError>;

    /// Receive the next JSON envelope from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete envelope was received
    /// - `Some(Err(e))` — an abnormal transport failure (retried by the client)
    /// - `None` — the connection closed normally (never retried)
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, BattleClientError>>;

    /// Close the connection gracefully with the normal closure status.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails; implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), BattleClientError>;
}

/// Opens a new [`Transport`] addressed with a battle token.
///
/// The client calls this once on [`connect`](crate::BattleClient::connect)
/// and again for every reconnection attempt, always with the most recently
/// issued token (refreshes replace the stored credential).
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Open a fresh connection authorized by `token`.
    ///
    /// # Errors
    ///
    /// Returns any connection-establishment error; the caller decides whether
    /// to retry under its [`ReconnectPolicy`](crate::connection::ReconnectPolicy).
    async fn connect(&mut self, token: &BattleToken) -> Result<Self::Transport, BattleClientError>;
}
