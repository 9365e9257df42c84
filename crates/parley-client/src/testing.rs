//! In-memory backend and fixtures for the client's tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parley_shared::protocol::{
    ChatDto, CreateGroupChatRequest, CreateGroupChatResponse, CreatePrivateChatResponse,
    LoginResponse, RegisterRequest, RegisterResponse,
};
use parley_shared::types::{Attachment, ChatId, Message, MessageId, Profile, UserId};
use parley_shared::MessageCipher;
use parley_store::{Database, PersistedSession};
use tokio::sync::{broadcast, oneshot};

use crate::api::{ApiResult, Backend, MessagePage, OutgoingMessage};
use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::events::ClientEvent;

pub const TOKEN: &str = "token-ann";
pub const PASSWORD: &str = "secret1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login(String),
    Register(String),
    CurrentUser,
    User(UserId),
    SearchUsers(String),
    UploadAvatar,
    ListChats,
    CreatePrivateChat(UserId),
    CreateGroupChat(String, Vec<UserId>),
    ChatMessages(ChatId, u32),
    SendMessage(ChatId),
}

pub fn profile(id: i64, name: &str) -> Profile {
    Profile {
        id: UserId(id),
        username: name.to_string(),
        email: Some(format!("{name}@example.com")),
        avatar: None,
    }
}

pub fn cipher() -> MessageCipher {
    MessageCipher::new([7u8; 32])
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

pub fn message(id: i64, chat: i64, sender: &Profile, content: &str, minutes: i64) -> Message {
    Message {
        id: MessageId(id),
        chat_id: ChatId(chat),
        sender_id: sender.id,
        sender: sender.clone(),
        content: content.to_string(),
        created_at: base_time() + Duration::minutes(minutes),
        file_ref: None,
        file_type: None,
        is_read: false,
    }
}

pub fn private_chat(id: i64, me: &Profile, other: &Profile) -> ChatDto {
    ChatDto {
        id: ChatId(id),
        chat_type: "private".into(),
        chat_name: None,
        chat_avatar: None,
        participants: vec![me.clone(), other.clone()],
        last_message: None,
        unread_count: 0,
        created_at: Some(base_time()),
        updated_at: Some(base_time()),
    }
}

pub fn group_chat(id: i64, name: &str, members: &[&Profile]) -> ChatDto {
    ChatDto {
        id: ChatId(id),
        chat_type: "group".into(),
        chat_name: Some(name.to_string()),
        chat_avatar: None,
        participants: members.iter().map(|p| (*p).clone()).collect(),
        last_message: None,
        unread_count: 0,
        created_at: Some(base_time()),
        updated_at: Some(base_time()),
    }
}

pub fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

struct Inner {
    calls: Vec<Call>,
    me: Profile,
    token: String,
    users: Vec<Profile>,
    chats: Vec<ChatDto>,
    messages: HashMap<ChatId, Vec<Message>>,
    failures: HashMap<String, TransportError>,
    chat_gates: VecDeque<oneshot::Receiver<Vec<ChatDto>>>,
    message_gates: VecDeque<oneshot::Receiver<()>>,
    next_id: i64,
}

/// Scripted stand-in for the REST backend. Records every call in order.
pub struct FakeBackend {
    inner: Mutex<Inner>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                calls: Vec::new(),
                me: profile(1, "ann"),
                token: TOKEN.to_string(),
                users: vec![profile(2, "bob"), profile(3, "cy")],
                chats: Vec::new(),
                messages: HashMap::new(),
                failures: HashMap::new(),
                chat_gates: VecDeque::new(),
                message_gates: VecDeque::new(),
                next_id: 100,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn me(&self) -> Profile {
        self.inner().me.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.inner().calls.clear();
    }

    /// Every later call to `endpoint` fails with `error`.
    pub fn fail(&self, endpoint: &str, error: TransportError) {
        self.inner().failures.insert(endpoint.to_string(), error);
    }

    pub fn clear_failure(&self, endpoint: &str) {
        self.inner().failures.remove(endpoint);
    }

    /// Invalidate the issued token; authenticated calls answer 401.
    pub fn revoke_token(&self) {
        self.inner().token = "revoked".to_string();
    }

    pub fn set_chats(&self, chats: Vec<ChatDto>) {
        self.inner().chats = chats;
    }

    pub fn set_messages(&self, chat_id: ChatId, messages: Vec<Message>) {
        self.inner().messages.insert(chat_id, messages);
    }

    /// The next `/chats` call waits for, and answers with, what is sent here.
    pub fn gate_list_chats(&self) -> oneshot::Sender<Vec<ChatDto>> {
        let (tx, rx) = oneshot::channel();
        self.inner().chat_gates.push_back(rx);
        tx
    }

    /// The next messages call waits until released.
    pub fn gate_chat_messages(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner().message_gates.push_back(rx);
        tx
    }

    fn record(&self, call: Call) {
        self.inner().calls.push(call);
    }

    fn injected(&self, endpoint: &str) -> ApiResult<()> {
        match self.inner().failures.get(endpoint) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Yield once so concurrent callers interleave, then check the token.
    async fn authorize(&self, endpoint: &str, token: &str) -> ApiResult<()> {
        tokio::task::yield_now().await;
        self.injected(endpoint)?;
        if self.inner().token != token {
            return Err(TransportError::Unauthorized);
        }
        Ok(())
    }

    fn next_id(&self) -> i64 {
        let mut inner = self.inner();
        inner.next_id += 1;
        inner.next_id
    }

    fn known_user(&self, id: UserId) -> Option<Profile> {
        let inner = self.inner();
        let found = std::iter::once(&inner.me)
            .chain(inner.users.iter())
            .find(|p| p.id == id)
            .cloned();
        found
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        self.record(Call::Login(username.to_string()));
        self.injected("login")?;
        let inner = self.inner();
        if username != inner.me.username || password != PASSWORD {
            return Err(TransportError::Http {
                status: 401,
                body: "Invalid username or password".into(),
            });
        }
        Ok(LoginResponse {
            access_token: inner.token.clone(),
            token_type: Some("bearer".into()),
            user: inner.me.clone(),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.record(Call::Register(request.username.clone()));
        self.injected("register")?;
        Ok(RegisterResponse {
            user_id: Some(UserId(self.next_id())),
            message: Some("User registered successfully".into()),
        })
    }

    async fn current_user(&self, token: &str) -> ApiResult<Profile> {
        self.record(Call::CurrentUser);
        self.authorize("current_user", token).await?;
        Ok(self.me())
    }

    async fn user(&self, token: &str, id: UserId) -> ApiResult<Profile> {
        self.record(Call::User(id));
        self.authorize("user", token).await?;
        self.known_user(id).ok_or(TransportError::Http {
            status: 404,
            body: "User not found".into(),
        })
    }

    async fn search_users(&self, token: &str, query: &str) -> ApiResult<Vec<Profile>> {
        self.record(Call::SearchUsers(query.to_string()));
        self.authorize("search_users", token).await?;
        let needle = query.to_lowercase();
        Ok(self
            .inner()
            .users
            .iter()
            .filter(|p| p.username.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn upload_avatar(&self, token: &str, file: &Attachment) -> ApiResult<String> {
        self.record(Call::UploadAvatar);
        self.authorize("upload_avatar", token).await?;
        let mut inner = self.inner();
        let ext = file.file_name.rsplit('.').next().unwrap_or("bin");
        let path = format!("uploads/avatar_{}.{ext}", inner.me.id);
        inner.me.avatar = Some(path.clone());
        Ok(path)
    }

    async fn list_chats(&self, token: &str) -> ApiResult<Vec<ChatDto>> {
        self.record(Call::ListChats);
        let gate = self.inner().chat_gates.pop_front();
        self.authorize("list_chats", token).await?;
        match gate {
            Some(gate) => gate
                .await
                .map_err(|_| TransportError::Network("gate dropped".into())),
            None => Ok(self.inner().chats.clone()),
        }
    }

    async fn create_private_chat(
        &self,
        token: &str,
        target: UserId,
    ) -> ApiResult<CreatePrivateChatResponse> {
        self.record(Call::CreatePrivateChat(target));
        self.authorize("create_private_chat", token).await?;

        let existing = self
            .inner()
            .chats
            .iter()
            .find(|c| c.chat_type == "private" && c.participants.iter().any(|p| p.id == target))
            .map(|c| c.id);
        if let Some(chat_id) = existing {
            return Ok(CreatePrivateChatResponse {
                chat_id,
                is_new: Some(false),
            });
        }

        let other = self.known_user(target).ok_or(TransportError::Http {
            status: 404,
            body: "User not found".into(),
        })?;
        let id = self.next_id();
        let me = self.me();
        self.inner().chats.push(private_chat(id, &me, &other));
        Ok(CreatePrivateChatResponse {
            chat_id: ChatId(id),
            is_new: Some(true),
        })
    }

    async fn create_group_chat(
        &self,
        token: &str,
        request: &CreateGroupChatRequest,
    ) -> ApiResult<CreateGroupChatResponse> {
        self.record(Call::CreateGroupChat(
            request.name.clone(),
            request.user_ids.clone(),
        ));
        self.authorize("create_group_chat", token).await?;

        let mut members = vec![self.me()];
        for id in &request.user_ids {
            members.push(self.known_user(*id).ok_or(TransportError::Http {
                status: 400,
                body: "Some users not found".into(),
            })?);
        }
        let id = self.next_id();
        let refs: Vec<&Profile> = members.iter().collect();
        self.inner().chats.push(group_chat(id, &request.name, &refs));
        Ok(CreateGroupChatResponse {
            chat_id: ChatId(id),
        })
    }

    async fn chat_messages(
        &self,
        token: &str,
        chat_id: ChatId,
        page: MessagePage,
    ) -> ApiResult<Vec<Message>> {
        self.record(Call::ChatMessages(chat_id, page.limit));
        let gate = self.inner().message_gates.pop_front();
        self.authorize("chat_messages", token).await?;
        if let Some(gate) = gate {
            gate.await
                .map_err(|_| TransportError::Network("gate dropped".into()))?;
        }

        let inner = self.inner();
        let all = inner.messages.get(&chat_id).cloned().unwrap_or_default();
        let keep = all.len().saturating_sub(page.limit as usize);
        Ok(all[keep..].to_vec())
    }

    async fn send_message(&self, token: &str, outgoing: &OutgoingMessage) -> ApiResult<Message> {
        self.record(Call::SendMessage(outgoing.chat_id));
        self.authorize("send_message", token).await?;

        let id = self.next_id();
        let mut sent = message(
            id,
            outgoing.chat_id.0,
            &self.me(),
            outgoing.content.as_deref().unwrap_or_default(),
            1_000 + id,
        );
        if let Some(file) = &outgoing.attachment {
            sent.file_ref = Some(format!("uploads/{}", file.file_name));
            sent.file_type = Some(file.mime_type.clone());
        }

        let mut inner = self.inner();
        inner
            .messages
            .entry(outgoing.chat_id)
            .or_default()
            .push(sent.clone());
        if let Some(chat) = inner.chats.iter_mut().find(|c| c.id == outgoing.chat_id) {
            chat.last_message = Some(sent.clone());
        }
        Ok(sent)
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub client: Client,
}

pub fn config() -> ClientConfig {
    ClientConfig {
        cipher: Some(cipher()),
        ..ClientConfig::default()
    }
}

fn build(database: Database) -> Harness {
    let backend = Arc::new(FakeBackend::new());
    let client = Client::new(config(), backend.clone(), database).unwrap();
    Harness { backend, client }
}

pub fn harness() -> Harness {
    build(Database::open_in_memory().unwrap())
}

pub fn harness_with_stored(session: PersistedSession) -> Harness {
    let mut database = Database::open_in_memory().unwrap();
    database.save_session(&session).unwrap();
    build(database)
}

/// Logged in without arming the poll timer; call log cleared.
pub async fn logged_in() -> Harness {
    let h = harness();
    h.client.session().login("ann", PASSWORD).await.unwrap();
    h.backend.reset_calls();
    h
}

/// Logged in with a private chat (10, with bob) and a group (20, "team")
/// already synced.
pub async fn logged_in_with_chats() -> Harness {
    let h = logged_in().await;
    let me = h.backend.me();
    let bob = profile(2, "bob");
    let cy = profile(3, "cy");
    h.backend.set_chats(vec![
        private_chat(10, &me, &bob),
        group_chat(20, "team", &[&me, &bob, &cy]),
    ]);
    h.client.directory().refresh().await.unwrap();
    h.backend.reset_calls();
    h
}
