//! [`Backend`] over HTTP with `reqwest`.

use async_trait::async_trait;
use parley_shared::constants::API_PREFIX;
use parley_shared::protocol::{
    AvatarResponse, ChatDto, CreateGroupChatRequest, CreateGroupChatResponse,
    CreatePrivateChatRequest, CreatePrivateChatResponse, ErrorBody, LoginRequest, LoginResponse,
    RegisterRequest, RegisterResponse,
};
use parley_shared::types::{Attachment, ChatId, Message, Profile, UserId};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::{ApiResult, Backend, MessagePage, OutgoingMessage};
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};

/// Raw bodies longer than this are cut before they reach an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: Option<&str>,
    ) -> ApiResult<T> {
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(classify_reqwest)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify_reqwest)?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            tracing::debug!(status = status.as_u16(), "Backend returned an error status");
            return Err(classify_status(status, &text, token.is_some()));
        }

        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.execute(self.http.post(self.url("/login")).json(&body), None)
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.execute(self.http.post(self.url("/register")).json(request), None)
            .await
    }

    async fn current_user(&self, token: &str) -> ApiResult<Profile> {
        self.execute(self.http.get(self.url("/users/me")), Some(token))
            .await
    }

    async fn user(&self, token: &str, id: UserId) -> ApiResult<Profile> {
        self.execute(self.http.get(self.url(&format!("/users/{id}"))), Some(token))
            .await
    }

    async fn search_users(&self, token: &str, query: &str) -> ApiResult<Vec<Profile>> {
        let request = self.http.get(self.url("/users/search")).query(&[("q", query)]);
        self.execute(request, Some(token)).await
    }

    async fn upload_avatar(&self, token: &str, file: &Attachment) -> ApiResult<String> {
        let form = Form::new().part("file", file_part(file));
        let response: AvatarResponse = self
            .execute(
                self.http.post(self.url("/users/avatar")).multipart(form),
                Some(token),
            )
            .await?;
        Ok(response.avatar_path)
    }

    async fn list_chats(&self, token: &str) -> ApiResult<Vec<ChatDto>> {
        self.execute(self.http.get(self.url("/chats")), Some(token))
            .await
    }

    async fn create_private_chat(
        &self,
        token: &str,
        target: UserId,
    ) -> ApiResult<CreatePrivateChatResponse> {
        let body = CreatePrivateChatRequest {
            target_user_id: target,
        };
        self.execute(
            self.http.post(self.url("/chats/private")).json(&body),
            Some(token),
        )
        .await
    }

    async fn create_group_chat(
        &self,
        token: &str,
        request: &CreateGroupChatRequest,
    ) -> ApiResult<CreateGroupChatResponse> {
        self.execute(
            self.http.post(self.url("/chats/group")).json(request),
            Some(token),
        )
        .await
    }

    async fn chat_messages(
        &self,
        token: &str,
        chat_id: ChatId,
        page: MessagePage,
    ) -> ApiResult<Vec<Message>> {
        let request = self
            .http
            .get(self.url(&format!("/chats/{chat_id}/messages")))
            .query(&[("limit", page.limit), ("skip", page.skip)]);
        self.execute(request, Some(token)).await
    }

    async fn send_message(&self, token: &str, message: &OutgoingMessage) -> ApiResult<Message> {
        let mut form = Form::new().text("chat_id", message.chat_id.to_string());
        if let Some(content) = &message.content {
            form = form.text("content", content.clone());
        }
        if let Some(file) = &message.attachment {
            form = form.part("file", file_part(file));
        }
        self.execute(
            self.http.post(self.url("/messages")).multipart(form),
            Some(token),
        )
        .await
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}{}", base_url.trim_end_matches('/'), API_PREFIX, path)
}

fn file_part(file: &Attachment) -> Part {
    let part = || Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
    part().mime_str(&file.mime_type).unwrap_or_else(|_| part())
}

/// Map a non-2xx response to a [`TransportError`]. A 401 only means an
/// expired session when a token was sent; on `/login` it is a plain
/// credential rejection.
pub(crate) fn classify_status(status: StatusCode, body: &str, authed: bool) -> TransportError {
    if status == StatusCode::UNAUTHORIZED && authed {
        return TransportError::Unauthorized;
    }

    let body = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message(),
        Err(_) if !body.trim().is_empty() => body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };

    TransportError::Http {
        status: status.as_u16(),
        body,
    }
}

fn classify_reqwest(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}
