//! Signed-in user state.
//!
//! Session issuance is external; this only holds who is signed in and lets
//! consumers react to sign-in and sign-out.

use tokio::sync::watch;

use taskboard_proto::profile::UserId;

/// Current authenticated user plus a change stream.
#[derive(Debug)]
pub struct Auth {
    tx: watch::Sender<Option<UserId>>,
}

impl Default for Auth {
    fn default() -> Self {
        Self::new()
    }
}

impl Auth {
    /// Starts signed out.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Signs `user` in, replacing any current user.
    pub fn sign_in(&self, user: UserId) {
        tracing::info!(user = %user, "signed in");
        self.tx.send_replace(Some(user));
    }

    /// Signs out. No-op when already signed out.
    pub fn sign_out(&self) {
        if let Some(user) = self.tx.send_replace(None) {
            tracing::info!(user = %user, "signed out");
        }
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    /// Stream of sign-in state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
