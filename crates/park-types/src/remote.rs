use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an addressable entity on the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerKind {
    User { bot: bool },
    Group,
    Channel,
}

/// Resolved handle to a remote entity (chat, channel or user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: i64,
    #[serde(default)]
    pub access_hash: Option<i64>,
    pub kind: PeerKind,
}

impl Peer {
    pub fn is_bot(&self) -> bool {
        matches!(self.kind, PeerKind::User { bot: true })
    }
}

/// Conversation visible to the session, as listed by the dialog enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub name: String,
    pub peer: Peer,
}

/// Last-seen status of a remote user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Presence {
    Online,
    Offline { was_online: DateTime<Utc> },
    Recently,
    LastWeek,
    LastMonth,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Presence {
    pub fn label(&self) -> String {
        match self {
            Self::Online => "now".to_string(),
            Self::Offline { was_online } => was_online.format("%Y-%m-%d").to_string(),
            Self::Recently => "recently".to_string(),
            Self::LastWeek => "last week".to_string(),
            Self::LastMonth => "last month".to_string(),
            Self::Unknown => "unknown".to_string(),
        }
    }
}

/// Member of the tracked community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub status: Presence,
}

impl Participant {
    /// "first last (@username)" with empty parts kept as blanks.
    pub fn display_name(&self) -> String {
        let username = match self.username.as_deref() {
            Some(u) if !u.is_empty() => format!("(@{})", u),
            _ => String::new(),
        };
        [
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or(""),
            username.as_str(),
        ]
        .join(" ")
    }
}

/// Full participant listing of a channel. `total` is the count reported by the
/// platform and may exceed `participants.len()` when the listing was truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub participants: Vec<Participant>,
    pub total: usize,
}

impl ParticipantSnapshot {
    pub fn is_complete(&self) -> bool {
        self.participants.len() >= self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: i64,
    #[serde(default)]
    pub from_id: Option<i64>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
}

/// One page of search results. `total` counts every match, not just the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<RemoteMessage>,
    pub total: usize,
}
