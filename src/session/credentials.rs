//! Bearer token capability.

use tokio::sync::watch;

/// Provides the current bearer token and notifies about token changes.
///
/// `None` means no authenticated session.
pub trait CredentialsProvider: Send + Sync {
    /// The token to use right now.
    fn current_token(&self) -> Option<String>;

    /// Receiver that observes every login, logout and token rotation.
    fn subscribe(&self) -> watch::Receiver<Option<String>>;
}

/// In-process token holder fed by whatever performs authentication.
pub struct TokenSource {
    tx: watch::Sender<Option<String>>,
}

impl TokenSource {
    pub fn new(initial: Option<String>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Set or rotate the token.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(token.as_str()) {
                false
            } else {
                *current = Some(token);
                true
            }
        });
    }

    /// Drop the token (logout).
    pub fn clear(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CredentialsProvider for TokenSource {
    fn current_token(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}
