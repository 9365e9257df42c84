//! Persisted authentication state.
//!
//! The token and the last-known profile live under two fixed keys and are
//! always written and cleared together, so a half-written pair never
//! survives a restart.

use parley_shared::types::Profile;

use crate::database::Database;
use crate::error::Result;
use crate::kv;

pub const TOKEN_KEY: &str = "session.token";
pub const USER_KEY: &str = "session.user";

/// Token plus the profile cached alongside it. The profile is provisional
/// until the backend confirms the token.
#[derive(Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub token: String,
    pub user: Profile,
}

impl std::fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedSession")
            .field("token", &"<redacted>")
            .field("user", &self.user.username)
            .finish()
    }
}

impl Database {
    pub fn save_session(&mut self, session: &PersistedSession) -> Result<()> {
        let user_json = serde_json::to_string(&session.user)?;
        let tx = self.conn_mut().transaction()?;
        kv::set_value(&tx, TOKEN_KEY, &session.token)?;
        kv::set_value(&tx, USER_KEY, &user_json)?;
        tx.commit()?;
        Ok(())
    }

    /// Returns the stored pair, or `None` if either half is missing or the
    /// profile no longer parses. Broken pairs are cleared on the way out.
    pub fn load_session(&mut self) -> Result<Option<PersistedSession>> {
        let token = self.get_value(TOKEN_KEY)?;
        let user_json = self.get_value(USER_KEY)?;

        let (token, user_json) = match (token, user_json) {
            (Some(t), Some(u)) if !t.is_empty() => (t, u),
            (None, None) => return Ok(None),
            _ => {
                tracing::warn!("incomplete persisted session, clearing");
                self.clear_session()?;
                return Ok(None);
            }
        };

        match serde_json::from_str::<Profile>(&user_json) {
            Ok(user) => Ok(Some(PersistedSession { token, user })),
            Err(e) => {
                tracing::warn!(error = %e, "corrupt persisted profile, clearing session");
                self.clear_session()?;
                Ok(None)
            }
        }
    }

    pub fn clear_session(&mut self) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        kv::delete_value(&tx, TOKEN_KEY)?;
        kv::delete_value(&tx, USER_KEY)?;
        tx.commit()?;
        Ok(())
    }
}
