//! Chat directory synchronizer.
//!
//! Keeps the signed-in user's chat list. Every refresh replaces the whole
//! list; responses that arrive after a newer one was applied, or after the
//! session they belong to ended, are dropped.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use parley_shared::constants::{ATTACHMENT_PREVIEW, DEFAULT_CHAT_TITLE, PREVIEW_MAX_CHARS};
use parley_shared::protocol::CreateGroupChatRequest;
use parley_shared::types::{Chat, ChatId, ChatKind, ChatKindTag, Message, Profile, UserId};
use parley_shared::MessageCipher;
use serde::Serialize;

use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::state::SessionContext;
use crate::transport::{Authed, Transport};

/// A chat as the view layer shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatView {
    pub id: ChatId,
    pub kind: ChatKindTag,
    pub title: String,
    pub avatar: Option<String>,
    pub preview: Option<String>,
    pub unread_count: u32,
    pub participants: Vec<Profile>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatView {
    /// Derive the display identity of `chat` as seen by `me`. A private
    /// chat is named after the other participant, wherever it sits in the
    /// participant list.
    pub fn resolve(chat: &Chat, me: UserId, cipher: &MessageCipher) -> Self {
        let (title, avatar) = match &chat.kind {
            ChatKind::Private { name } => match chat.counterpart(me) {
                Some(other) => (
                    other.username.clone(),
                    other.avatar.clone().or_else(|| chat.avatar.clone()),
                ),
                None => (
                    name.clone()
                        .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string()),
                    chat.avatar.clone(),
                ),
            },
            ChatKind::Group { name } => (name.clone(), chat.avatar.clone()),
        };

        Self {
            id: chat.id,
            kind: chat.kind.tag(),
            title,
            avatar,
            preview: preview_text(chat.last_message.as_ref(), cipher),
            unread_count: chat.unread_count,
            participants: chat.participants.clone(),
            updated_at: chat.updated_at,
        }
    }
}

pub(crate) fn preview_text(message: Option<&Message>, cipher: &MessageCipher) -> Option<String> {
    let message = message?;
    if message.has_text() {
        Some(truncate_preview(&cipher.decrypt(&message.content)))
    } else if message.file_ref.is_some() {
        Some(ATTACHMENT_PREVIEW.to_string())
    } else {
        None
    }
}

pub(crate) fn truncate_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_MAX_CHARS {
        let head: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[derive(Default)]
struct DirectoryState {
    epoch: Option<u64>,
    applied_seq: u64,
    chats: Vec<Chat>,
    views: Vec<ChatView>,
}

pub struct ChatDirectory {
    transport: Transport,
    cipher: MessageCipher,
    issued: AtomicU64,
    state: Mutex<DirectoryState>,
}

impl ChatDirectory {
    pub fn new(transport: Transport, cipher: MessageCipher) -> Self {
        Self {
            transport,
            cipher,
            issued: AtomicU64::new(0),
            state: Mutex::new(DirectoryState::default()),
        }
    }

    fn ctx(&self) -> &Arc<SessionContext> {
        self.transport.context()
    }

    fn events(&self) -> &EventBus {
        self.ctx().events()
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the chat list and apply it if nothing newer landed meanwhile.
    /// Returns the list now in effect.
    pub async fn refresh(&self) -> Result<Vec<ChatView>> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.transport.list_chats().await.map_err(ClientError::from);
        let Authed { epoch, value } = self.events().reported(result)?;

        let Some(me) = self.ctx().user_if_current(epoch) else {
            tracing::debug!(seq, epoch, "Dropping chat list from an ended session");
            return Ok(self.snapshot());
        };

        let chats: Vec<Chat> = value
            .into_iter()
            .filter_map(|dto| {
                let id = dto.id;
                match Chat::try_from(dto) {
                    Ok(chat) => Some(chat),
                    Err(e) => {
                        tracing::warn!(chat_id = %id, error = %e, "Skipping invalid chat");
                        None
                    }
                }
            })
            .collect();
        let views: Vec<ChatView> = chats
            .iter()
            .map(|chat| ChatView::resolve(chat, me.id, &self.cipher))
            .collect();

        let applied = {
            let mut state = self.state();
            if seq > state.applied_seq && self.ctx().is_current(epoch) {
                state.applied_seq = seq;
                state.epoch = Some(epoch);
                state.chats = chats;
                state.views = views.clone();
                true
            } else {
                false
            }
        };

        if !applied {
            tracing::debug!(seq, "Dropping stale chat list");
            return Ok(self.snapshot());
        }

        tracing::debug!(seq, count = views.len(), "Chat list applied");
        self.events().emit(ClientEvent::ChatsUpdated {
            chats: views.clone(),
        });
        Ok(views)
    }

    /// The last applied list, empty once its session has ended.
    pub fn snapshot(&self) -> Vec<ChatView> {
        let state = self.state();
        match state.epoch {
            Some(epoch) if self.ctx().is_current(epoch) => state.views.clone(),
            _ => Vec::new(),
        }
    }

    pub fn get(&self, id: ChatId) -> Option<Chat> {
        let state = self.state();
        match state.epoch {
            Some(epoch) if self.ctx().is_current(epoch) => {
                state.chats.iter().find(|c| c.id == id).cloned()
            }
            _ => None,
        }
    }

    pub fn contains(&self, id: ChatId) -> bool {
        self.get(id).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.epoch = None;
        state.chats.clear();
        state.views.clear();
    }

    pub async fn create_private_chat(&self, target: UserId) -> Result<ChatId> {
        let result = self.try_create_private_chat(target).await;
        self.events().reported(result)
    }

    async fn try_create_private_chat(&self, target: UserId) -> Result<ChatId> {
        if self.ctx().current_user().is_some_and(|me| me.id == target) {
            return Err(ClientError::validation("You cannot start a chat with yourself"));
        }

        let created = self.transport.create_private_chat(target).await?.value;
        tracing::info!(
            chat_id = %created.chat_id,
            is_new = created.is_new.unwrap_or(true),
            "Private chat ready"
        );
        self.refresh_after_change().await;
        Ok(created.chat_id)
    }

    pub async fn create_group_chat(&self, name: &str, members: &[UserId]) -> Result<ChatId> {
        let result = self.try_create_group_chat(name, members).await;
        self.events().reported(result)
    }

    async fn try_create_group_chat(&self, name: &str, members: &[UserId]) -> Result<ChatId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::validation("Group name is required"));
        }

        let me = self.ctx().current_user().map(|p| p.id);
        let user_ids: Vec<UserId> = members
            .iter()
            .copied()
            .filter(|id| Some(*id) != me)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if user_ids.is_empty() {
            return Err(ClientError::validation("Select at least one member"));
        }

        let request = CreateGroupChatRequest {
            name: name.to_string(),
            user_ids,
        };
        let created = self.transport.create_group_chat(&request).await?.value;
        tracing::info!(chat_id = %created.chat_id, members = request.user_ids.len(), "Group chat created");
        self.refresh_after_change().await;
        Ok(created.chat_id)
    }

    async fn refresh_after_change(&self) {
        if let Err(e) = self.refresh().await {
            tracing::debug!(error = %e, "Refresh after chat creation failed");
        }
    }

    /// User search. A blank query is answered locally with nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<Profile>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let result = self
            .transport
            .search_users(query)
            .await
            .map(|found| found.value)
            .map_err(ClientError::from);
        self.events().reported(result)
    }

    pub async fn lookup_user(&self, id: UserId) -> Result<Profile> {
        let result = self
            .transport
            .user(id)
            .await
            .map(|found| found.value)
            .map_err(ClientError::from);
        self.events().reported(result)
    }
}
