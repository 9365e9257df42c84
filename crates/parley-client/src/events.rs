//! Events pushed to the view layer.
//!
//! Components publish on a shared [`EventBus`]; any number of view layers
//! may subscribe. Nothing blocks on a slow subscriber: a lagging receiver
//! just skips ahead.

use parley_shared::types::{ChatId, Profile};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::directory::ChatView;
use crate::error::ClientError;
use crate::grouping::DayGroup;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Logged in (`Some`) or logged out (`None`).
    AuthChanged { user: Option<Profile> },
    ChatsUpdated { chats: Vec<ChatView> },
    MessagesUpdated { chat_id: ChatId, groups: Vec<DayGroup> },
    Notify { message: String, severity: Severity },
    /// Registration went through; the view may prefill the login form.
    RegisterSucceeded { username: String },
    /// Results of the latest debounced user search.
    SearchResults { query: String, users: Vec<Profile> },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for client event");
        }
    }

    pub fn notify(&self, message: impl Into<String>, severity: Severity) {
        self.emit(ClientEvent::Notify {
            message: message.into(),
            severity,
        });
    }

    /// Surface a failure to the user. Unauthorized is skipped: the forced
    /// logout already produced its own notice.
    pub fn report(&self, error: &ClientError) {
        if error.is_unauthorized() {
            return;
        }
        tracing::warn!(error = %error, "Operation failed");
        self.notify(error.user_message(), error.severity());
    }

    /// Pass `result` through, reporting it on the way if it failed.
    pub fn reported<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
