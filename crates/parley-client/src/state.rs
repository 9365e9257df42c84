//! Session context shared by every client component.
//!
//! A single [`SessionContext`] is created per [`crate::Client`] and handed to
//! each component behind an `Arc`. It owns the authenticated session, the
//! active view, the poll timer slot, the persistence handle and the event
//! bus. Every lock is short and never held across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use parley_shared::types::{ChatId, ChatKindTag, Profile};
use parley_store::{Database, PersistedSession, StoreError};
use tokio::task::JoinHandle;

use crate::events::{ClientEvent, EventBus, Severity};

/// An authenticated session. Token and user only exist together.
#[derive(Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: Profile,
    /// Generation number; each new session gets a fresh one.
    pub epoch: u64,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user.username)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// The chat currently shown by the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChat {
    pub id: ChatId,
    pub kind: ChatKindTag,
}

pub struct SessionContext {
    session: Mutex<Option<AuthSession>>,
    next_epoch: AtomicU64,
    active: Mutex<Option<ActiveChat>>,
    poll_timer: Mutex<Option<JoinHandle<()>>>,
    database: Mutex<Database>,
    events: EventBus,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionContext {
    pub fn new(database: Database, events: EventBus) -> Self {
        Self {
            session: Mutex::new(None),
            next_epoch: AtomicU64::new(1),
            active: Mutex::new(None),
            poll_timer: Mutex::new(None),
            database: Mutex::new(database),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -- Session --

    /// Token and epoch of the current session, read together.
    pub fn credentials(&self) -> Option<(String, u64)> {
        lock(&self.session)
            .as_ref()
            .map(|s| (s.token.clone(), s.epoch))
    }

    pub fn current_user(&self) -> Option<Profile> {
        lock(&self.session).as_ref().map(|s| s.user.clone())
    }

    pub fn epoch(&self) -> Option<u64> {
        lock(&self.session).as_ref().map(|s| s.epoch)
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.session).is_some()
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == Some(epoch)
    }

    /// The signed-in user, provided the session is still the one that
    /// started at `epoch`.
    pub fn user_if_current(&self, epoch: u64) -> Option<Profile> {
        lock(&self.session)
            .as_ref()
            .filter(|s| s.epoch == epoch)
            .map(|s| s.user.clone())
    }

    /// Install a new session, persist it and announce it. Any previous
    /// session is replaced, along with its timer and active view.
    pub fn begin_session(&self, token: String, user: Profile) -> u64 {
        let epoch = {
            // Lock order: session, then database/active/timer.
            let mut guard = lock(&self.session);
            self.persist(&PersistedSession {
                token: token.clone(),
                user: user.clone(),
            });

            let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
            let replaced = guard
                .replace(AuthSession {
                    token,
                    user: user.clone(),
                    epoch,
                })
                .is_some();

            if replaced {
                self.disarm_poll_timer();
                *lock(&self.active) = None;
            }
            epoch
        };

        tracing::info!(user = %user.username, epoch, "Session started");
        self.events
            .emit(ClientEvent::AuthChanged { user: Some(user) });
        epoch
    }

    /// End the current session.
    ///
    /// With `Some(epoch)` this only acts if that epoch is still current, so
    /// several callers reacting to the same expired token log out once.
    /// Returns whether a session was actually ended.
    pub fn end_session(&self, expected: Option<u64>) -> bool {
        let ended = {
            let mut guard = lock(&self.session);
            let ended = match (guard.as_ref(), expected) {
                (Some(current), Some(epoch)) if current.epoch != epoch => None,
                (Some(_), _) => guard.take(),
                (None, _) => None,
            };
            // Cleared under the guard so a concurrent login is never wiped.
            if ended.is_some() {
                *lock(&self.active) = None;
                self.disarm_poll_timer();
                self.clear_persisted();
            }
            ended
        };

        let Some(ended) = ended else {
            return false;
        };

        tracing::info!(
            user = %ended.user.username,
            epoch = ended.epoch,
            expired = expected.is_some(),
            "Session ended"
        );
        self.events.emit(ClientEvent::AuthChanged { user: None });
        if expected.is_some() {
            self.events
                .notify("Session expired, please log in again", Severity::Warning);
        }
        true
    }

    /// Swap in a fresher profile for the session started at `epoch`.
    pub fn replace_profile(&self, epoch: u64, user: Profile) -> bool {
        {
            let mut guard = lock(&self.session);
            let token = match guard.as_mut() {
                Some(session) if session.epoch == epoch => {
                    session.user = user.clone();
                    session.token.clone()
                }
                _ => return false,
            };
            self.persist(&PersistedSession {
                token,
                user: user.clone(),
            });
        }

        self.events
            .emit(ClientEvent::AuthChanged { user: Some(user) });
        true
    }

    // -- Persistence --

    pub fn load_persisted(&self) -> Result<Option<PersistedSession>, StoreError> {
        lock(&self.database).load_session()
    }

    pub fn clear_persisted(&self) {
        if let Err(e) = lock(&self.database).clear_session() {
            tracing::error!(error = %e, "Failed to clear persisted session");
        }
    }

    fn persist(&self, session: &PersistedSession) {
        if let Err(e) = lock(&self.database).save_session(session) {
            tracing::error!(error = %e, "Failed to persist session");
        }
    }

    // -- Active view --

    pub fn active_chat(&self) -> Option<ActiveChat> {
        *lock(&self.active)
    }

    pub fn set_active_chat(&self, chat: Option<ActiveChat>) {
        *lock(&self.active) = chat;
    }

    pub fn is_active(&self, chat_id: ChatId) -> bool {
        self.active_chat().is_some_and(|a| a.id == chat_id)
    }

    // -- Poll timer slot --

    /// Store the timer task, aborting whichever one was there before.
    pub fn install_poll_timer(&self, handle: JoinHandle<()>) {
        if let Some(previous) = lock(&self.poll_timer).replace(handle) {
            previous.abort();
        }
    }

    /// Returns whether a timer was running.
    pub fn disarm_poll_timer(&self) -> bool {
        match lock(&self.poll_timer).take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("Poll scheduler disarmed");
                true
            }
            None => false,
        }
    }

    pub fn poll_timer_armed(&self) -> bool {
        lock(&self.poll_timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
