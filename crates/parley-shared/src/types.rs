use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Backend-assigned user id
    UserId
);
numeric_id!(
    /// Backend-assigned chat id
    ChatId
);
numeric_id!(
    /// Backend-assigned message id
    MessageId
);

/// Snapshot of a user as returned by `/users/me`, `/login` and search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "avatar_path")]
    pub avatar: Option<String>,
}

/// Discriminant of [`ChatKind`], without the per-variant payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatKindTag {
    Private,
    Group,
}

impl ChatKindTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }
}

impl std::fmt::Display for ChatKindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatKind {
    /// Two-participant chat. Its display identity is the counterpart; the
    /// server-side name is only a fallback.
    Private { name: Option<String> },
    /// Multi-participant chat with an explicit name.
    Group { name: String },
}

impl ChatKind {
    pub fn tag(&self) -> ChatKindTag {
        match self {
            Self::Private { .. } => ChatKindTag::Private,
            Self::Group { .. } => ChatKindTag::Group,
        }
    }
}

/// A chat as validated at the wire boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub avatar: Option<String>,
    pub participants: Vec<Profile>,
    pub last_message: Option<Message>,
    pub unread_count: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// The participant that is not `me`, regardless of list order.
    pub fn counterpart(&self, me: UserId) -> Option<&Profile> {
        self.participants.iter().find(|p| p.id != me)
    }
}

/// A stored message. `content` is always ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender: Profile,
    #[serde(default)]
    pub content: String,
    #[serde(with = "crate::protocol::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "file_path")]
    pub file_ref: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    pub fn has_text(&self) -> bool {
        !self.content.is_empty()
    }
}

/// A file queued for upload alongside a message or as an avatar.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
