use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ConversationId);
id_newtype!(MessageId);
id_newtype!(TempId);

const TEMP_ID_PREFIX: &str = "temp_";

impl TempId {
    /// Fresh provisional identity for an optimistic message.
    pub fn generate() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn as_message_id(&self) -> MessageId {
        MessageId(self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender_id: UserId,
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<TempId>,
}

impl Message {
    pub fn optimistic(
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let temp_id = TempId::generate();
        Self {
            id: temp_id.as_message_id(),
            content: content.into(),
            sender_id,
            conversation_id,
            created_at,
            temp_id: Some(temp_id),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.temp_id.is_some()
    }
}

// The API sends `null` for unset names and avatars.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    #[serde(alias = "DIRECT")]
    Private,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Admin,
    Member,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: UserId,
    pub full_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub avatar: String,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub avatar: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl Conversation {
    fn other_participant(&self, me: Option<&UserId>) -> Option<&Participant> {
        let me = me?;
        self.participants.iter().find(|p| &p.id != me)
    }

    pub fn display_name(&self, me: Option<&UserId>) -> String {
        match self.kind {
            ConversationKind::Group if self.name.is_empty() => "Group Chat".to_string(),
            ConversationKind::Group => self.name.clone(),
            ConversationKind::Private if me.is_none() => self.name.clone(),
            ConversationKind::Private => self
                .other_participant(me)
                .map(|p| p.full_name.clone())
                .unwrap_or_else(|| "Unknown User".to_string()),
        }
    }

    pub fn display_avatar(&self, me: Option<&UserId>) -> String {
        match self.kind {
            ConversationKind::Group => self.avatar.clone(),
            ConversationKind::Private if me.is_none() => self.avatar.clone(),
            ConversationKind::Private => self
                .other_participant(me)
                .map(|p| p.avatar.clone())
                .unwrap_or_default(),
        }
    }

    /// Member shown in the details pane: the first participant of a group, or
    /// the counterpart of a private conversation.
    pub fn target_member(&self, me: Option<&UserId>) -> Option<&Participant> {
        match self.kind {
            ConversationKind::Group => self.participants.first(),
            ConversationKind::Private => self
                .other_participant(me)
                .or_else(|| self.participants.first()),
        }
    }
}
