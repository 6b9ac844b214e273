//! Auth state change stream for the backend facade.

use crate::types::Session;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Kind of session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl std::fmt::Display for AuthChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthChangeEvent::InitialSession => "INITIAL_SESSION",
            AuthChangeEvent::SignedIn => "SIGNED_IN",
            AuthChangeEvent::SignedOut => "SIGNED_OUT",
            AuthChangeEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthChangeEvent::UserUpdated => "USER_UPDATED",
            AuthChangeEvent::PasswordRecovery => "PASSWORD_RECOVERY",
        };
        f.write_str(s)
    }
}

/// One delivered transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Handle returned by `on_auth_state_change`.
///
/// Events published before the subscription was taken are not replayed.
/// Dropping the handle unsubscribes.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthStateChange>,
}

impl AuthSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<AuthStateChange>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the publishing service is gone.
    ///
    /// A subscriber that falls behind skips what it missed.
    pub async fn recv(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Auth subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}
}

/// What the UI should show for a given session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthView {
    pub event: AuthChangeEvent,
    pub signed_in: bool,
    /// Elements marked auth-required are visible.
    pub show_auth_required: bool,
    /// Elements marked auth-hidden are visible.
    pub show_auth_hidden: bool,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl AuthView {
    /// Reconcile visibility and user fields against `session`.
    pub fn for_session(event: AuthChangeEvent, session: Option<&Session>) -> Self {
        let Some(session) = session else {
            return Self {
                event,
                signed_in: false,
                show_auth_required: false,
                show_auth_hidden: true,
                display_name: None,
                email: None,
                avatar_url: None,
            };
        };

        let user = &session.user;
        let display_name = user.user_metadata.full_name.clone().or_else(|| {
            user.email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .map(str::to_string)
        });

        Self {
            event,
            signed_in: true,
            show_auth_required: true,
            show_auth_hidden: false,
            display_name,
            email: user.email.clone(),
            avatar_url: user.user_metadata.avatar_url.clone(),
        }
    }
}
