//! Backend seam.
//!
//! One async method per REST endpoint. Tokens are passed explicitly so the
//! implementation stays stateless; [`crate::transport::Transport`] decides
//! which token (if any) goes out.

use async_trait::async_trait;
use parley_shared::protocol::{
    ChatDto, CreateGroupChatRequest, CreateGroupChatResponse, CreatePrivateChatResponse,
    LoginResponse, RegisterRequest, RegisterResponse,
};
use parley_shared::types::{Attachment, ChatId, Message, Profile, UserId};

use crate::error::TransportError;

pub type ApiResult<T> = std::result::Result<T, TransportError>;

/// `limit`/`skip` window for `/chats/{id}/messages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePage {
    pub limit: u32,
    pub skip: u32,
}

/// Multipart body of `POST /messages`. `content` is already ciphertext.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse>;

    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse>;

    async fn current_user(&self, token: &str) -> ApiResult<Profile>;

    async fn user(&self, token: &str, id: UserId) -> ApiResult<Profile>;

    async fn search_users(&self, token: &str, query: &str) -> ApiResult<Vec<Profile>>;

    /// Returns the stored avatar reference.
    async fn upload_avatar(&self, token: &str, file: &Attachment) -> ApiResult<String>;

    async fn list_chats(&self, token: &str) -> ApiResult<Vec<ChatDto>>;

    async fn create_private_chat(
        &self,
        token: &str,
        target: UserId,
    ) -> ApiResult<CreatePrivateChatResponse>;

    async fn create_group_chat(
        &self,
        token: &str,
        request: &CreateGroupChatRequest,
    ) -> ApiResult<CreateGroupChatResponse>;

    async fn chat_messages(
        &self,
        token: &str,
        chat_id: ChatId,
        page: MessagePage,
    ) -> ApiResult<Vec<Message>>;

    async fn send_message(&self, token: &str, message: &OutgoingMessage) -> ApiResult<Message>;
}
