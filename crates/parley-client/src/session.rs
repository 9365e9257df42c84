//! Session lifecycle: restore, login, registration, logout.
//!
//! The session itself lives in [`SessionContext`]; this component drives the
//! transitions between logged out and logged in.

use std::sync::Arc;

use parley_shared::constants::{AVATAR_MIME_TYPES, MAX_FILE_SIZE, MIN_PASSWORD_LEN};
use parley_shared::protocol::RegisterRequest;
use parley_shared::types::{Attachment, Profile, UserId};

use crate::error::{ClientError, Result};
use crate::events::ClientEvent;
use crate::state::SessionContext;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn(Profile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub username: String,
    pub user_id: Option<UserId>,
}

pub struct SessionStore {
    transport: Transport,
}

impl SessionStore {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    fn ctx(&self) -> &Arc<SessionContext> {
        self.transport.context()
    }

    /// Resume the persisted session if the backend still accepts its token.
    /// Anything short of a confirmed profile clears the stored pair.
    pub async fn restore(&self) -> AuthState {
        let persisted = match self.ctx().load_persisted() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return AuthState::LoggedOut,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read persisted session");
                self.ctx().clear_persisted();
                return AuthState::LoggedOut;
            }
        };

        match self.transport.validate_token(&persisted.token).await {
            Ok(user) => {
                self.ctx().begin_session(persisted.token, user.clone());
                AuthState::LoggedIn(user)
            }
            Err(e) => {
                tracing::info!(error = %e, "Stored session not accepted, clearing");
                self.ctx().clear_persisted();
                AuthState::LoggedOut
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Profile> {
        let result = self.try_login(username, password).await;
        self.ctx().events().reported(result)
    }

    async fn try_login(&self, username: &str, password: &str) -> Result<Profile> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::validation("Username is required"));
        }
        if password.is_empty() {
            return Err(ClientError::validation("Password is required"));
        }

        let response = self.transport.login(username, password).await?;
        let user = response.user;
        self.ctx().begin_session(response.access_token, user.clone());
        Ok(user)
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<RegisterOutcome> {
        let result = self.try_register(username, email, password, confirm).await;
        self.ctx().events().reported(result)
    }

    async fn try_register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<RegisterOutcome> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() || password.is_empty() || confirm.is_empty() {
            return Err(ClientError::validation("All fields are required"));
        }
        if password != confirm {
            return Err(ClientError::validation("Passwords do not match"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let response = self
            .transport
            .register(&RegisterRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;

        tracing::info!(user = username, "Account registered");
        self.ctx().events().emit(ClientEvent::RegisterSucceeded {
            username: username.to_string(),
        });

        Ok(RegisterOutcome {
            username: username.to_string(),
            user_id: response.user_id,
        })
    }

    /// Returns `false` when there was no session to end.
    pub fn logout(&self) -> bool {
        self.ctx().end_session(None)
    }

    /// Upload a new avatar, then re-read the profile so the stored copy
    /// carries the new reference.
    pub async fn update_avatar(&self, file: Attachment) -> Result<Profile> {
        let result = self.try_update_avatar(file).await;
        self.ctx().events().reported(result)
    }

    async fn try_update_avatar(&self, file: Attachment) -> Result<Profile> {
        if file.is_empty() {
            return Err(ClientError::validation("Avatar file is empty"));
        }
        if file.len() > MAX_FILE_SIZE {
            return Err(ClientError::validation("Avatar file is too large"));
        }
        if !AVATAR_MIME_TYPES.contains(&file.mime_type.as_str()) {
            return Err(ClientError::validation(
                "Invalid file type. Only images are allowed",
            ));
        }

        let uploaded = self.transport.upload_avatar(&file).await?;
        tracing::debug!(avatar = %uploaded.value, "Avatar uploaded");

        let refreshed = self.transport.current_user().await?;
        self.ctx()
            .replace_profile(refreshed.epoch, refreshed.value.clone());
        Ok(refreshed.value)
    }

    pub fn current_user(&self) -> Option<Profile> {
        self.ctx().current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.ctx().is_authenticated()
    }
}
