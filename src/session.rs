//! Read-only view of the signed-in user, injected into the scan pipeline.
//!
//! Authentication and token refresh live outside this crate. The pipeline
//! only reads the current identity to tag image analyses and to authorize
//! backend calls; it never mutates the session.

use std::sync::RwLock;

/// Narrow session interface consumed by the scan pipeline.
pub trait SessionContext: Send + Sync {
    /// Identifier of the signed-in user, if any.
    fn current_user(&self) -> Option<String>;

    /// Bearer token for backend calls, if any.
    fn current_token(&self) -> Option<String>;
}

/// Session backed by values set by the host application.
///
/// The host updates it on sign-in/sign-out; the pipeline only reads it.
#[derive(Default)]
pub struct StaticSession {
    inner: RwLock<SessionValues>,
}

#[derive(Default, Clone)]
struct SessionValues {
    user_id: Option<String>,
    token: Option<String>,
}

impl StaticSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(SessionValues {
                user_id: Some(user_id.into()),
                token: Some(token.into()),
            }),
        }
    }

    /// No user signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>, token: impl Into<String>) {
        if let Ok(mut values) = self.inner.write() {
            values.user_id = Some(user_id.into());
            values.token = Some(token.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut values) = self.inner.write() {
            *values = SessionValues::default();
        }
    }
}

impl SessionContext for StaticSession {
    fn current_user(&self) -> Option<String> {
        self.inner.read().ok()?.user_id.clone()
    }

    fn current_token(&self) -> Option<String> {
        self.inner.read().ok()?.token.clone()
    }
}
