//! The [`Client`] facade wiring every component to one session context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parley_shared::types::{Attachment, ChatId, Message, Profile, UserId};
use parley_store::Database;
use tokio::sync::broadcast;

use crate::api::Backend;
use crate::config::ClientConfig;
use crate::directory::ChatDirectory;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::http::HttpBackend;
use crate::messages::{MessageStream, MessageView};
use crate::outbound::OutboundPipeline;
use crate::scheduler::PollScheduler;
use crate::session::{AuthState, RegisterOutcome, SessionStore};
use crate::state::SessionContext;
use crate::transport::Transport;

/// Something the user asked for through the view layer.
#[derive(Debug, Clone)]
pub enum Intent {
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        email: String,
        password: String,
        confirm: String,
    },
    Logout,
    SelectChat(ChatId),
    Search(String),
    Send {
        text: Option<String>,
        attachment: Option<Attachment>,
    },
    CreateGroup {
        name: String,
        member_ids: Vec<UserId>,
    },
    OpenPrivateChat(UserId),
    UpdateAvatar(Attachment),
}

pub struct Client {
    config: ClientConfig,
    ctx: Arc<SessionContext>,
    session: SessionStore,
    directory: Arc<ChatDirectory>,
    messages: Arc<MessageStream>,
    outbound: OutboundPipeline,
    scheduler: PollScheduler,
    search_generation: AtomicU64,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        database: Database,
    ) -> Result<Self> {
        config.validate()?;
        let cipher = config.message_cipher()?;
        let ctx = Arc::new(SessionContext::new(database, EventBus::new()));
        let transport = Transport::new(backend, ctx.clone());

        let directory = Arc::new(ChatDirectory::new(transport.clone(), cipher.clone()));
        let messages = Arc::new(MessageStream::new(
            transport.clone(),
            directory.clone(),
            cipher.clone(),
            config.message_limit,
        ));
        let outbound = OutboundPipeline::new(
            transport.clone(),
            messages.clone(),
            directory.clone(),
            cipher,
        );
        let scheduler = PollScheduler::new(
            ctx.clone(),
            directory.clone(),
            messages.clone(),
            config.poll_interval,
        );

        Ok(Self {
            config,
            ctx,
            session: SessionStore::new(transport),
            directory,
            messages,
            outbound,
            scheduler,
            search_generation: AtomicU64::new(0),
        })
    }

    /// HTTP backend plus the on-disk store named by the config.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        let database = match &config.db_path {
            Some(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                Database::open_at(path)?
            }
            None => Database::new()?,
        };
        Self::new(config, backend, database)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.ctx.events().subscribe()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resume a stored session and start polling if that worked.
    pub async fn start(&self) -> AuthState {
        let state = self.session.restore().await;
        if matches!(state, AuthState::LoggedIn(_)) {
            self.scheduler.arm();
        }
        state
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Profile> {
        let user = self.session.login(username, password).await?;
        self.scheduler.arm();
        Ok(user)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<RegisterOutcome> {
        self.session
            .register(username, email, password, confirm)
            .await
    }

    pub fn logout(&self) -> bool {
        let ended = self.session.logout();
        self.messages.deselect();
        self.directory.clear();
        ended
    }

    pub async fn select_chat(&self, chat_id: ChatId) -> Result<Vec<MessageView>> {
        self.messages.select(chat_id).await
    }

    /// Debounced user search. Returns `None` when a newer query arrived
    /// during the quiet period.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<Profile>>> {
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.config.search_debounce).await;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            tracing::trace!(query, "Search superseded");
            return Ok(None);
        }

        let users = self.directory.search(query).await?;
        self.ctx.events().emit(ClientEvent::SearchResults {
            query: query.to_string(),
            users: users.clone(),
        });
        Ok(Some(users))
    }

    /// Send to the active chat.
    pub async fn send(&self, text: Option<&str>, attachment: Option<Attachment>) -> Result<Message> {
        let Some(active) = self.ctx.active_chat() else {
            return self
                .ctx
                .events()
                .reported(Err(ClientError::validation("Open the chat before sending")));
        };
        self.outbound.send(active.id, text, attachment).await
    }

    pub async fn create_group(&self, name: &str, member_ids: &[UserId]) -> Result<ChatId> {
        self.directory.create_group_chat(name, member_ids).await
    }

    /// Start (or reopen) the private chat with `user` and make it active.
    pub async fn open_private_chat(&self, user: UserId) -> Result<ChatId> {
        let chat_id = self.directory.create_private_chat(user).await?;
        self.messages.select(chat_id).await?;
        Ok(chat_id)
    }

    /// Dispatch an intent. Failures have already been surfaced as
    /// [`ClientEvent::Notify`] by the time this returns.
    pub async fn handle(&self, intent: Intent) -> Result<()> {
        match intent {
            Intent::Login { username, password } => {
                self.login(&username, &password).await?;
            }
            Intent::Register {
                username,
                email,
                password,
                confirm,
            } => {
                self.register(&username, &email, &password, &confirm)
                    .await?;
            }
            Intent::Logout => {
                self.logout();
            }
            Intent::SelectChat(chat_id) => {
                self.select_chat(chat_id).await?;
            }
            Intent::Search(query) => {
                self.search(&query).await?;
            }
            Intent::Send { text, attachment } => {
                self.send(text.as_deref(), attachment).await?;
            }
            Intent::CreateGroup { name, member_ids } => {
                self.create_group(&name, &member_ids).await?;
            }
            Intent::OpenPrivateChat(user) => {
                self.open_private_chat(user).await?;
            }
            Intent::UpdateAvatar(file) => {
                self.session.update_avatar(file).await?;
            }
        }
        Ok(())
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn directory(&self) -> &ChatDirectory {
        &self.directory
    }

    pub fn messages(&self) -> &MessageStream {
        &self.messages
    }

    pub fn outbound(&self) -> &OutboundPipeline {
        &self.outbound
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.ctx.disarm_poll_timer();
    }
}
