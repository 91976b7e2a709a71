use crate::schemas::{UserId, UserSession};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-user conversation state, created lazily on the first message.
///
/// Each user gets their own lock. Holding it for a whole transition keeps two
/// messages from the same user from interleaving, while other users carry on.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Arc<Mutex<UserSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, user_id: &str) -> Arc<Mutex<UserSession>> {
        let mut sessions = lock(&self.sessions);
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id, "creating session");
                Arc::new(Mutex::new(UserSession::default()))
            })
            .clone()
    }

    // Whole-session access for callers outside a transition; the engine
    // itself works through handle()
    #[allow(dead_code)]
    pub fn get(&self, user_id: &str) -> UserSession {
        let handle = self.handle(user_id);
        let session = lock(&handle);
        session.clone()
    }

    #[allow(dead_code)]
    pub fn set(&self, user_id: &str, session: UserSession) {
        let handle = self.handle(user_id);
        *lock(&handle) = session;
    }

    #[allow(dead_code)]
    pub fn reset(&self, user_id: &str) {
        let handle = self.handle(user_id);
        lock(&handle).enter_idle();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }
}

// A panic mid-transition leaves plain data behind, so keep using it
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
