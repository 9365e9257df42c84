//! REST wire schema.
//!
//! Request and response bodies mirror the backend's JSON exactly. Chats go
//! through [`ChatDto`] and are validated into [`Chat`] before anything else
//! in the client sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Chat, ChatId, ChatKind, ChatKindTag, Message, Profile, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrivateChatRequest {
    pub target_user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrivateChatResponse {
    pub chat_id: ChatId,
    #[serde(default)]
    pub is_new: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupChatRequest {
    pub name: String,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupChatResponse {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarResponse {
    pub avatar_path: String,
}

/// Error body produced by the backend for every non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// Human-readable detail: the string itself, or the compact JSON when
    /// the backend returned a structured validation report.
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Chat exactly as `/chats` serialises it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDto {
    pub id: ChatId,
    pub chat_type: String,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub chat_avatar: Option<String>,
    #[serde(default)]
    pub participants: Vec<Profile>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ChatDto> for Chat {
    type Error = ProtocolError;

    fn try_from(dto: ChatDto) -> Result<Self, Self::Error> {
        let name = dto
            .chat_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let kind = match dto.chat_type.as_str() {
            t if t == ChatKindTag::Private.as_str() => ChatKind::Private { name },
            t if t == ChatKindTag::Group.as_str() => ChatKind::Group {
                name: name.ok_or(ProtocolError::MissingGroupName(dto.id.0))?,
            },
            other => return Err(ProtocolError::UnknownChatType(other.to_string())),
        };

        Ok(Chat {
            id: dto.id,
            kind,
            avatar: dto.chat_avatar,
            participants: dto.participants,
            last_message: dto.last_message,
            unread_count: dto.unread_count,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        })
    }
}

/// The backend emits naive ISO-8601 timestamps in UTC; RFC 3339 values with
/// an explicit offset are accepted as well.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::error::ProtocolError;

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, ProtocolError> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .map_err(|_| ProtocolError::InvalidTimestamp(raw.to_string()))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) => super::parse(&raw).map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    const CHAT_JSON: &str = r#"{
        "id": 3,
        "chat_type": "private",
        "chat_name": "bob",
        "chat_avatar": null,
        "participants": [
            {"id": 1, "username": "alice", "email": "a@x.io", "avatar_path": null},
            {"id": 2, "username": "bob", "email": "b@x.io", "avatar_path": "uploads/b.png"}
        ],
        "last_message": {
            "id": 10, "chat_id": 3, "sender_id": 2, "content": "Y2lwaGVy",
            "file_path": null, "file_type": null, "is_read": false,
            "created_at": "2024-05-01T09:30:15.123456",
            "sender": {"id": 2, "username": "bob", "email": "b@x.io", "avatar_path": null}
        },
        "unread_count": 4,
        "created_at": "2024-04-30T08:00:00",
        "updated_at": "2024-05-01T09:30:15.123456"
    }"#;

    #[test]
    fn test_private_chat_from_wire() {
        let dto: ChatDto = serde_json::from_str(CHAT_JSON).unwrap();
        let chat = Chat::try_from(dto).unwrap();

        assert_eq!(chat.id, ChatId(3));
        assert_eq!(chat.kind, ChatKind::Private { name: Some("bob".into()) });
        assert_eq!(chat.unread_count, 4);
        assert_eq!(chat.participants.len(), 2);

        let last = chat.last_message.unwrap();
        assert_eq!(last.created_at.hour(), 9);
        assert_eq!(last.created_at.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_group_requires_name() {
        let mut dto: ChatDto = serde_json::from_str(CHAT_JSON).unwrap();
        dto.chat_type = "group".into();
        dto.chat_name = Some("   ".into());

        assert_eq!(
            Chat::try_from(dto).unwrap_err(),
            ProtocolError::MissingGroupName(3)
        );
    }

    #[test]
    fn test_unknown_chat_type_rejected() {
        let mut dto: ChatDto = serde_json::from_str(CHAT_JSON).unwrap();
        dto.chat_type = "channel".into();

        assert!(matches!(
            Chat::try_from(dto),
            Err(ProtocolError::UnknownChatType(t)) if t == "channel"
        ));
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 15).unwrap();
        assert_eq!(timestamp::parse("2024-05-01T09:30:15").unwrap(), expected);
        assert_eq!(timestamp::parse("2024-05-01 09:30:15").unwrap(), expected);
        assert_eq!(timestamp::parse("2024-05-01T09:30:15Z").unwrap(), expected);
        assert_eq!(timestamp::parse("2024-05-01T11:30:15+02:00").unwrap(), expected);
        assert!(timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn test_error_body_message() {
        let plain: ErrorBody = serde_json::from_str(r#"{"detail":"Username already taken"}"#).unwrap();
        assert_eq!(plain.message(), "Username already taken");

        let structured: ErrorBody =
            serde_json::from_str(r#"{"detail":[{"loc":["body","email"],"msg":"bad"}]}"#).unwrap();
        assert!(structured.message().contains("email"));
    }
}
