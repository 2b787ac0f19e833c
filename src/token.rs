//! Battle token acquisition.
//!
//! A battle token is a short-lived credential, separate from the long-lived
//! login credential, that authorizes the bidirectional battle connection. The
//! session owns exactly one at a time and replaces it (never mutates it) on
//! refresh.
//!
//! [`TokenSupplier`] is the seam to the external issuing service — REST in
//! production, scripted in tests. The client never inspects the token; it is
//! an opaque string handed to the [`Connector`](crate::transport::Connector)
//! and re-sent in-band on refresh.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// An opaque short-lived battle credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BattleToken(String);

impl BattleToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw credential string, for embedding in a connection address or a
    /// `REFRESH_TOKEN` payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for BattleToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BattleToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// Credentials must not leak into logs.
impl fmt::Debug for BattleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BattleToken(…{} bytes)", self.0.len())
    }
}

/// Issues and revokes battle tokens.
///
/// Implementations call out to the token service. [`issue`](Self::issue)
/// failures are treated as session-fatal by the client (credential failure is
/// never retried internally); map service errors to
/// [`BattleClientError::TokenFetch`](crate::BattleClientError::TokenFetch).
#[async_trait]
pub trait TokenSupplier: Send + Sync + 'static {
    /// Request a fresh battle token.
    async fn issue(&self) -> Result<BattleToken>;

    /// Revoke a token that is no longer needed. Best-effort; the default
    /// implementation is a no-op for services that expire tokens passively.
    async fn revoke(&self, _token: &BattleToken) -> Result<()> {
        Ok(())
    }
}

/// Decorator that permits a single in-flight [`issue`](TokenSupplier::issue)
/// request at a time.
///
/// When several components want a token concurrently (initial connect racing
/// a refresh tick, say), the requests are funneled through one async mutex so
/// the issuing service sees them strictly in sequence rather than as a burst
/// of duplicates.
pub struct GuardedSupplier<S> {
    inner: Arc<S>,
    in_flight: tokio::sync::Mutex<()>,
}

impl<S: TokenSupplier> GuardedSupplier<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl<S: TokenSupplier> TokenSupplier for GuardedSupplier<S> {
    async fn issue(&self) -> Result<BattleToken> {
        let _guard = self.in_flight.lock().await;
        self.inner.issue().await
    }

    async fn revoke(&self, token: &BattleToken) -> Result<()> {
        self.inner.revoke(token).await
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
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSupplier {
        issued: AtomicU32,
        concurrent: AtomicU32,
        max_concurrent: AtomicU32,
    }

    impl CountingSupplier {
        fn new() -> Self {
            Self {
                issued: AtomicU32::new(0),
                concurrent: AtomicU32::new(0),
                max_concurrent: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenSupplier for CountingSupplier {
        async fn issue(&self) -> Result<BattleToken> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(BattleToken::new(format!("tok-{n}")))
        }
    }

    #[test]
    fn debug_redacts_the_credential() {
        let token = BattleToken::new("super-secret-value");
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("BattleToken"));
    }

    #[test]
    fn as_str_exposes_the_raw_value() {
        let token = BattleToken::from("abc123");
        assert_eq!(token.as_str(), "abc123");
        assert_eq!(token.into_string(), "abc123");
    }

    #[tokio::test]
    async fn guarded_supplier_serializes_issue_requests() {
        let supplier = Arc::new(GuardedSupplier::new(CountingSupplier::new()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = Arc::clone(&supplier);
            handles.push(tokio::spawn(async move { s.issue().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(supplier.inner.issued.load(Ordering::SeqCst), 8);
        assert_eq!(
            supplier.inner.max_concurrent.load(Ordering::SeqCst),
            1,
            "issue requests overlapped despite the guard"
        );
    }

    #[tokio::test]
    async fn default_revoke_is_a_no_op() {
        let supplier = CountingSupplier::new();
        let token = supplier.issue().await.unwrap();
        supplier.revoke(&token).await.unwrap();
    }
}
