//! Message stream for the active chat.
//!
//! Holds exactly one chat's messages. Selecting another chat discards the
//! collection and invalidates every load still in flight; a load is applied
//! only if its chat is still active, its session still current and nothing
//! newer has landed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use parley_shared::constants::{DECRYPTION_SENTINEL, MAX_MESSAGE_LIMIT};
use parley_shared::types::{ChatId, Message, MessageId, UserId};
use parley_shared::MessageCipher;
use serde::Serialize;

use crate::api::MessagePage;
use crate::directory::ChatDirectory;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::grouping::{group_by_day, DayGroup};
use crate::state::{ActiveChat, SessionContext};
use crate::transport::{Authed, Transport};

/// A message with its body decrypted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    /// `false` when `text` is the placeholder for an unreadable body.
    pub decrypted: bool,
    pub created_at: DateTime<Utc>,
    pub file_ref: Option<String>,
    pub file_type: Option<String>,
    pub is_own: bool,
    pub is_read: bool,
}

impl MessageView {
    pub fn from_message(message: &Message, me: UserId, cipher: &MessageCipher) -> Self {
        let (text, decrypted) = if !message.has_text() {
            (String::new(), true)
        } else {
            match cipher.try_decrypt(&message.content) {
                Ok(text) => (text, true),
                Err(e) => {
                    tracing::warn!(message_id = %message.id, error = %e, "Message could not be decrypted");
                    (DECRYPTION_SENTINEL.to_string(), false)
                }
            }
        };

        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            sender_name: message.sender.username.clone(),
            text,
            decrypted,
            created_at: message.created_at,
            file_ref: message.file_ref.clone(),
            file_type: message.file_type.clone(),
            is_own: message.sender_id == me,
            is_read: message.is_read,
        }
    }
}

#[derive(Default)]
struct StreamState {
    chat: Option<ChatId>,
    epoch: Option<u64>,
    applied_seq: u64,
    messages: Vec<MessageView>,
}

pub struct MessageStream {
    transport: Transport,
    directory: Arc<ChatDirectory>,
    cipher: MessageCipher,
    limit: u32,
    issued: AtomicU64,
    state: Mutex<StreamState>,
}

impl MessageStream {
    pub fn new(
        transport: Transport,
        directory: Arc<ChatDirectory>,
        cipher: MessageCipher,
        limit: u32,
    ) -> Self {
        Self {
            transport,
            directory,
            cipher,
            limit: limit.clamp(1, MAX_MESSAGE_LIMIT),
            issued: AtomicU64::new(0),
            state: Mutex::new(StreamState::default()),
        }
    }

    fn ctx(&self) -> &Arc<SessionContext> {
        self.transport.context()
    }

    fn events(&self) -> &EventBus {
        self.ctx().events()
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Make `chat_id` the active chat and load it. Only chats present in the
    /// last synced directory can be selected.
    pub async fn select(&self, chat_id: ChatId) -> Result<Vec<MessageView>> {
        let Some(chat) = self.directory.get(chat_id) else {
            return self.events().reported(Err(ClientError::UnknownChat(chat_id)));
        };

        self.ctx().set_active_chat(Some(ActiveChat {
            id: chat.id,
            kind: chat.kind.tag(),
        }));
        {
            let mut state = self.state();
            state.chat = Some(chat.id);
            state.epoch = self.ctx().epoch();
            state.messages.clear();
            // Anything issued before this point belongs to the previous selection.
            state.applied_seq = self.issued.load(Ordering::SeqCst);
        }
        tracing::debug!(chat_id = %chat_id, "Chat selected");
        self.events().emit(ClientEvent::MessagesUpdated {
            chat_id,
            groups: Vec::new(),
        });

        self.load(chat_id, self.limit).await
    }

    /// Fetch the latest `limit` messages of `chat_id`. Returns what is on
    /// display afterwards, which is the previous collection when the
    /// response turned out to be stale.
    pub async fn load(&self, chat_id: ChatId, limit: u32) -> Result<Vec<MessageView>> {
        let page = MessagePage {
            limit: limit.clamp(1, MAX_MESSAGE_LIMIT),
            skip: 0,
        };
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self
            .transport
            .chat_messages(chat_id, page)
            .await
            .map_err(ClientError::from);
        let Authed {
            epoch,
            value: mut fetched,
        } = self.events().reported(result)?;

        let Some(me) = self.ctx().user_if_current(epoch) else {
            tracing::debug!(chat_id = %chat_id, seq, "Dropping messages from an ended session");
            return Ok(self.snapshot());
        };

        // Stable: equal timestamps keep server order.
        fetched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let views: Vec<MessageView> = fetched
            .iter()
            .map(|m| MessageView::from_message(m, me.id, &self.cipher))
            .collect();

        let applied = {
            let mut state = self.state();
            let fresh = seq > state.applied_seq
                && state.chat == Some(chat_id)
                && self.ctx().is_active(chat_id)
                && self.ctx().is_current(epoch);
            if fresh {
                state.applied_seq = seq;
                state.epoch = Some(epoch);
                state.messages = views.clone();
            }
            fresh
        };

        if !applied {
            tracing::debug!(chat_id = %chat_id, seq, "Dropping stale message page");
            return Ok(self.snapshot());
        }

        self.events().emit(ClientEvent::MessagesUpdated {
            chat_id,
            groups: group_by_day(&views, Utc::now(), &Local),
        });
        Ok(views)
    }

    /// Reload the active chat, if any.
    pub async fn reload_active(&self) -> Option<Result<Vec<MessageView>>> {
        let chat_id = self.current()?;
        Some(self.load(chat_id, self.limit).await)
    }

    pub fn deselect(&self) {
        self.ctx().set_active_chat(None);
        let mut state = self.state();
        state.chat = None;
        state.epoch = None;
        state.messages.clear();
        state.applied_seq = self.issued.load(Ordering::SeqCst);
    }

    pub fn current(&self) -> Option<ChatId> {
        self.ctx().active_chat().map(|active| active.id)
    }

    /// Messages of the active chat, empty when nothing is selected or the
    /// session that loaded them has ended.
    pub fn snapshot(&self) -> Vec<MessageView> {
        let state = self.state();
        match (state.chat, state.epoch) {
            (Some(chat), Some(epoch))
                if self.ctx().is_active(chat) && self.ctx().is_current(epoch) =>
            {
                state.messages.clone()
            }
            _ => Vec::new(),
        }
    }

    pub fn groups(&self) -> Vec<DayGroup> {
        group_by_day(&self.snapshot(), Utc::now(), &Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{cipher, drain, logged_in_with_chats, message, profile, Call};

    #[test]
    fn test_view_decrypts_or_uses_sentinel() {
        let c = cipher();
        let bob = profile(2, "bob");

        let ok = MessageView::from_message(
            &message(1, 10, &bob, &c.encrypt("hi").unwrap(), 0),
            UserId(1),
            &c,
        );
        assert_eq!(ok.text, "hi");
        assert!(ok.decrypted);
        assert!(!ok.is_own);

        let bad = MessageView::from_message(&message(2, 10, &bob, "garbage", 0), UserId(2), &c);
        assert_eq!(bad.text, DECRYPTION_SENTINEL);
        assert!(!bad.decrypted);
        assert!(bad.is_own);
    }

    #[tokio::test]
    async fn test_select_unknown_chat_changes_nothing() {
        let h = logged_in_with_chats().await;
        h.client.messages().select(ChatId(10)).await.unwrap();
        h.backend.reset_calls();
        let before = h.client.messages().snapshot();

        let err = h.client.messages().select(ChatId(999)).await.unwrap_err();

        assert!(matches!(err, ClientError::UnknownChat(ChatId(999))));
        assert_eq!(h.client.messages().current(), Some(ChatId(10)));
        assert_eq!(h.client.messages().snapshot(), before);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_messages_ascending_for_any_server_order() {
        let h = logged_in_with_chats().await;
        let c = cipher();
        let bob = profile(2, "bob");
        let mut batch = vec![
            message(1, 10, &bob, &c.encrypt("first").unwrap(), 0),
            message(2, 10, &bob, &c.encrypt("second").unwrap(), 1),
            message(3, 10, &bob, &c.encrypt("tie-a").unwrap(), 2),
            message(4, 10, &bob, &c.encrypt("tie-b").unwrap(), 2),
            message(5, 10, &bob, &c.encrypt("last").unwrap(), 3),
        ];
        batch.swap(0, 4);
        batch.swap(1, 2);
        h.backend.set_messages(ChatId(10), batch);

        let views = h.client.messages().select(ChatId(10)).await.unwrap();

        assert!(views.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        let texts: Vec<&str> = views.iter().map(|v| v.text.as_str()).collect();
        assert_eq!(texts.first(), Some(&"first"));
        assert_eq!(texts.last(), Some(&"last"));
        let tie: Vec<MessageId> = views
            .iter()
            .filter(|v| v.text.starts_with("tie"))
            .map(|v| v.id)
            .collect();
        assert_eq!(tie, vec![MessageId(3), MessageId(4)]);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let h = logged_in_with_chats().await;
        h.client.messages().select(ChatId(10)).await.unwrap();
        h.backend.reset_calls();

        h.client.messages().load(ChatId(10), 0).await.unwrap();
        h.client.messages().load(ChatId(10), 5_000).await.unwrap();

        assert_eq!(
            h.backend.calls(),
            vec![
                Call::ChatMessages(ChatId(10), 1),
                Call::ChatMessages(ChatId(10), MAX_MESSAGE_LIMIT)
            ]
        );
    }

    #[tokio::test]
    async fn test_switching_chat_discards_in_flight_load() {
        let h = logged_in_with_chats().await;
        let c = cipher();
        let bob = profile(2, "bob");
        h.backend.set_messages(
            ChatId(10),
            vec![message(1, 10, &bob, &c.encrypt("from ten").unwrap(), 0)],
        );
        h.backend.set_messages(
            ChatId(20),
            vec![message(2, 20, &bob, &c.encrypt("from twenty").unwrap(), 0)],
        );
        h.client.messages().select(ChatId(10)).await.unwrap();

        let gate = h.backend.gate_chat_messages();
        let messages = h.client.messages();
        let slow = messages.load(ChatId(10), 50);
        let switch = async {
            tokio::task::yield_now().await;
            gate.send(()).unwrap();
            // The released load is not polled again before this select
            // has invalidated it.
            messages.select(ChatId(20)).await
        };
        let (slow, switched) = futures::join!(slow, switch);

        assert_eq!(switched.unwrap()[0].text, "from twenty");
        assert!(slow.unwrap().iter().all(|v| v.chat_id == ChatId(20)));
        assert_eq!(messages.current(), Some(ChatId(20)));
        assert_eq!(messages.snapshot()[0].text, "from twenty");
    }

    #[tokio::test]
    async fn test_load_failure_keeps_messages() {
        let h = logged_in_with_chats().await;
        let c = cipher();
        h.backend.set_messages(
            ChatId(10),
            vec![message(1, 10, &profile(2, "bob"), &c.encrypt("kept").unwrap(), 0)],
        );
        h.client.messages().select(ChatId(10)).await.unwrap();

        h.backend
            .fail("chat_messages", TransportError::Network("reset".into()));
        let mut rx = h.client.subscribe();
        assert!(h.client.messages().load(ChatId(10), 50).await.is_err());

        assert_eq!(h.client.messages().snapshot()[0].text, "kept");
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ClientEvent::Notify { .. })));
    }

    #[tokio::test]
    async fn test_groups_split_active_chat_by_day() {
        let h = logged_in_with_chats().await;
        let c = cipher();
        let bob = profile(2, "bob");
        h.backend.set_messages(
            ChatId(10),
            vec![
                message(1, 10, &bob, &c.encrypt("morning").unwrap(), 0),
                message(2, 10, &bob, &c.encrypt("later").unwrap(), 1),
                message(3, 10, &bob, &c.encrypt("days after").unwrap(), 3 * 24 * 60),
            ],
        );
        assert!(h.client.messages().groups().is_empty());

        h.client.messages().select(ChatId(10)).await.unwrap();
        let groups = h.client.messages().groups();

        assert_eq!(groups.len(), 2);
        assert!(groups[0].date < groups[1].date);
        let ids: Vec<Vec<MessageId>> = groups
            .iter()
            .map(|g| g.messages.iter().map(|m| m.id).collect())
            .collect();
        assert_eq!(
            ids,
            vec![vec![MessageId(1), MessageId(2)], vec![MessageId(3)]]
        );
    }

    #[tokio::test]
    async fn test_select_emits_empty_then_loaded() {
        let h = logged_in_with_chats().await;
        let c = cipher();
        h.backend.set_messages(
            ChatId(10),
            vec![message(1, 10, &profile(2, "bob"), &c.encrypt("hi").unwrap(), 0)],
        );
        let mut rx = h.client.subscribe();

        h.client.messages().select(ChatId(10)).await.unwrap();

        let updates: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::MessagesUpdated { groups, .. } => {
                    Some(groups.iter().map(|g| g.messages.len()).sum())
                }
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![0, 1]);
    }
}
