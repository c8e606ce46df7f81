use async_trait::async_trait;

use park_types::remote::{Dialog, MessagePage, ParticipantSnapshot, Peer};

use crate::error::PlatformError;

/// Message search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    /// Substring the message text must contain.
    pub search: Option<String>,
    /// Restrict to messages authored by this user.
    pub from_user: Option<i64>,
    /// Most recent matches to return.
    pub limit: usize,
}

/// The remote chat platform, as seen through one authenticated user session.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Looks up a chat, channel or user by username, link or id.
    async fn resolve_entity(&self, identifier: &str) -> Result<Peer, PlatformError>;

    /// Every conversation visible to the session.
    async fn dialogs(&self) -> Result<Vec<Dialog>, PlatformError>;

    async fn participants(&self, channel: &Peer) -> Result<ParticipantSnapshot, PlatformError>;

    async fn search_messages(
        &self,
        channel: &Peer,
        query: &MessageQuery,
    ) -> Result<MessagePage, PlatformError>;

    /// Relays existing messages unchanged from one entity to another.
    async fn forward_messages(
        &self,
        from: &Peer,
        ids: &[i64],
        to: &Peer,
    ) -> Result<(), PlatformError>;
}
