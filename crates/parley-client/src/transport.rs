//! Session-aware wrapper around a [`Backend`].
//!
//! Authenticated calls read the token and epoch once, at call start. A 401
//! ends that epoch's session through [`SessionContext::end_session`], which
//! ignores repeats, so concurrent failures produce a single logout.

use std::future::Future;
use std::sync::Arc;

use parley_shared::protocol::{
    ChatDto, CreateGroupChatRequest, CreateGroupChatResponse, CreatePrivateChatResponse,
    LoginResponse, RegisterRequest, RegisterResponse,
};
use parley_shared::types::{Attachment, ChatId, Message, Profile, UserId};

use crate::api::{ApiResult, Backend, MessagePage, OutgoingMessage};
use crate::error::TransportError;
use crate::state::SessionContext;

/// A response together with the session epoch it was made under.
#[derive(Debug, Clone)]
pub struct Authed<T> {
    pub epoch: u64,
    pub value: T,
}

#[derive(Clone)]
pub struct Transport {
    backend: Arc<dyn Backend>,
    ctx: Arc<SessionContext>,
}

impl Transport {
    pub fn new(backend: Arc<dyn Backend>, ctx: Arc<SessionContext>) -> Self {
        Self { backend, ctx }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    async fn authorized<T, F, Fut>(&self, op: &'static str, call: F) -> ApiResult<Authed<T>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let Some((token, epoch)) = self.ctx.credentials() else {
            tracing::debug!(op, "No session, request not sent");
            return Err(TransportError::Unauthorized);
        };

        match call(token).await {
            Ok(value) => Ok(Authed { epoch, value }),
            Err(TransportError::Unauthorized) => {
                tracing::warn!(op, epoch, "Token rejected by backend");
                self.ctx.end_session(Some(epoch));
                Err(TransportError::Unauthorized)
            }
            Err(e) => {
                tracing::debug!(op, error = %e, "Request failed");
                Err(e)
            }
        }
    }

    // -- Unauthenticated --

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        self.backend.login(username, password).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.backend.register(request).await
    }

    /// Check a token that is not (yet) the active session's.
    pub async fn validate_token(&self, token: &str) -> ApiResult<Profile> {
        self.backend.current_user(token).await
    }

    // -- Authenticated --

    pub async fn current_user(&self) -> ApiResult<Authed<Profile>> {
        let backend = &self.backend;
        self.authorized("current_user", move |token| async move {
            backend.current_user(&token).await
        })
        .await
    }

    pub async fn user(&self, id: UserId) -> ApiResult<Authed<Profile>> {
        let backend = &self.backend;
        self.authorized("user", move |token| async move {
            backend.user(&token, id).await
        })
        .await
    }

    pub async fn search_users(&self, query: &str) -> ApiResult<Authed<Vec<Profile>>> {
        let backend = &self.backend;
        self.authorized("search_users", move |token| async move {
            backend.search_users(&token, query).await
        })
        .await
    }

    pub async fn upload_avatar(&self, file: &Attachment) -> ApiResult<Authed<String>> {
        let backend = &self.backend;
        self.authorized("upload_avatar", move |token| async move {
            backend.upload_avatar(&token, file).await
        })
        .await
    }

    pub async fn list_chats(&self) -> ApiResult<Authed<Vec<ChatDto>>> {
        let backend = &self.backend;
        self.authorized("list_chats", move |token| async move {
            backend.list_chats(&token).await
        })
        .await
    }

    pub async fn create_private_chat(
        &self,
        target: UserId,
    ) -> ApiResult<Authed<CreatePrivateChatResponse>> {
        let backend = &self.backend;
        self.authorized("create_private_chat", move |token| async move {
            backend.create_private_chat(&token, target).await
        })
        .await
    }

    pub async fn create_group_chat(
        &self,
        request: &CreateGroupChatRequest,
    ) -> ApiResult<Authed<CreateGroupChatResponse>> {
        let backend = &self.backend;
        self.authorized("create_group_chat", move |token| async move {
            backend.create_group_chat(&token, request).await
        })
        .await
    }

    pub async fn chat_messages(
        &self,
        chat_id: ChatId,
        page: MessagePage,
    ) -> ApiResult<Authed<Vec<Message>>> {
        let backend = &self.backend;
        self.authorized("chat_messages", move |token| async move {
            backend.chat_messages(&token, chat_id, page).await
        })
        .await
    }

    pub async fn send_message(&self, message: &OutgoingMessage) -> ApiResult<Authed<Message>> {
        let backend = &self.backend;
        self.authorized("send_message", move |token| async move {
            backend.send_message(&token, message).await
        })
        .await
    }
}
