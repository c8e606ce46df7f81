use serde::{Deserialize, Serialize};

/// Membership ledger entry. `removed_on` is `None` while the user is a member.
/// Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownUser {
    pub id: i64,
    pub name: String,
    pub joined_on: i64,
    pub removed_on: Option<i64>,
}

/// A harvested message tagged with a building and floor marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComingOut {
    pub msg_id: i64,
    pub user_id: i64,
    pub msg_date: i64,
    pub msg_text: String,
    pub building_num: i64,
    pub floor_num: i64,
    pub deprecated: bool,
    /// Chat that received the relayed copy. Set together with `forwarded_msg_id`.
    pub forwarded_chat_id: Option<i64>,
    pub forwarded_msg_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

/// Per-deployment settings stored in `bot_config`, keyed by deployment name.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub id: String,
    pub api_id: i64,
    pub api_hash: String,
    pub chat_url: String,
    pub bot_username: String,
    pub bot_key: Option<String>,
}

// Credentials stay out of logs.
impl std::fmt::Debug for DeploymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentConfig")
            .field("id", &self.id)
            .field("api_id", &self.api_id)
            .field("chat_url", &self.chat_url)
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

/// Membership status used by the neighbour bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Stranger,
    KnownButUntrusted,
    KnownAndTrusted,
}

/// A (building, floor) pair a user declared in a tagged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub building: i64,
    pub floor: i64,
}

/// Relayed copy of a neighbour's tagged message, addressable in the bot's chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborMessage {
    pub chat_id: i64,
    pub msg_id: i64,
}
