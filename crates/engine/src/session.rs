//! Session seam: supplies the bearer credential when one exists.

use std::sync::Mutex;

/// Source of the current access token. Absence of a token forces the
/// local-only path everywhere.
pub trait SessionProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Token holder with explicit sign-in/sign-out, for tests and headless
/// tools. Real apps bridge their auth layer to `SessionProvider` instead.
#[derive(Default)]
pub struct StaticSession {
    token: Mutex<Option<String>>,
}

impl StaticSession {
    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.lock().unwrap() = Some(token.into());
    }

    pub fn sign_out(&self) {
        *self.token.lock().unwrap() = None;
    }
}

impl SessionProvider for StaticSession {
    fn access_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}
