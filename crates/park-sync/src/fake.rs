//! In-memory platform for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use park_types::remote::{
    Dialog, MessagePage, Participant, ParticipantSnapshot, Peer, PeerKind, Presence, RemoteMessage,
};

use crate::error::PlatformError;
use crate::platform::{MessageQuery, Platform};

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    entities: HashMap<String, Peer>,
    dialogs: Vec<Dialog>,
    participants: Vec<Participant>,
    reported_total: Option<usize>,
    messages: Vec<RemoteMessage>,
    forwarded: Vec<(i64, i64, i64)>,
    fail_forward_of: Option<i64>,
    fail_participants: bool,
    searches: Vec<MessageQuery>,
}

pub fn channel_peer(id: i64) -> Peer {
    Peer { id, access_hash: Some(1), kind: PeerKind::Channel }
}

pub fn bot_peer(id: i64) -> Peer {
    Peer { id, access_hash: Some(2), kind: PeerKind::User { bot: true } }
}

pub fn person(id: i64, first: &str) -> Participant {
    Participant {
        id,
        first_name: Some(first.to_string()),
        last_name: None,
        username: None,
        status: Presence::Recently,
    }
}

pub fn message(id: i64, from: i64, text: &str) -> RemoteMessage {
    RemoteMessage {
        id,
        from_id: Some(from),
        date: Utc.timestamp_opt(1_600_000_000 + id, 0).unwrap(),
        text: Some(text.to_string()),
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_entity(&self, identifier: &str, peer: Peer) {
        self.with(|s| s.entities.insert(identifier.to_string(), peer));
    }

    pub fn add_dialog(&self, name: &str, peer: Peer) {
        self.with(|s| s.dialogs.push(Dialog { name: name.to_string(), peer }));
    }

    pub fn set_participants(&self, participants: Vec<Participant>) {
        self.with(|s| {
            s.participants = participants;
            s.reported_total = None;
        });
    }

    pub fn set_reported_total(&self, total: usize) {
        self.with(|s| s.reported_total = Some(total));
    }

    pub fn fail_participants(&self, fail: bool) {
        self.with(|s| s.fail_participants = fail);
    }

    pub fn post(&self, msg: RemoteMessage) {
        self.with(|s| s.messages.push(msg));
    }

    pub fn fail_forward_of(&self, msg_id: Option<i64>) {
        self.with(|s| s.fail_forward_of = msg_id);
    }

    /// `(from peer, message id, to peer)` in call order.
    pub fn forwarded(&self) -> Vec<(i64, i64, i64)> {
        self.with(|s| s.forwarded.clone())
    }

    pub fn searches(&self) -> Vec<MessageQuery> {
        self.with(|s| s.searches.clone())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn resolve_entity(&self, identifier: &str) -> Result<Peer, PlatformError> {
        self.with(|s| s.entities.get(identifier).cloned())
            .ok_or_else(|| PlatformError::NotFound(identifier.to_string()))
    }

    async fn dialogs(&self) -> Result<Vec<Dialog>, PlatformError> {
        Ok(self.with(|s| s.dialogs.clone()))
    }

    async fn participants(&self, _channel: &Peer) -> Result<ParticipantSnapshot, PlatformError> {
        self.with(|s| {
            if s.fail_participants {
                return Err(PlatformError::Api {
                    call: "participants".into(),
                    status: 420,
                    message: "FLOOD_WAIT".into(),
                });
            }
            Ok(ParticipantSnapshot {
                participants: s.participants.clone(),
                total: s.reported_total.unwrap_or(s.participants.len()),
            })
        })
    }

    async fn search_messages(
        &self,
        _channel: &Peer,
        query: &MessageQuery,
    ) -> Result<MessagePage, PlatformError> {
        self.with(|s| {
            s.searches.push(query.clone());
            let mut matches: Vec<RemoteMessage> = s
                .messages
                .iter()
                .filter(|m| match &query.search {
                    Some(needle) => m.text.as_deref().is_some_and(|t| t.contains(needle.as_str())),
                    None => true,
                })
                .filter(|m| query.from_user.is_none() || m.from_id == query.from_user)
                .cloned()
                .collect();
            // newest first
            matches.sort_by(|a, b| b.id.cmp(&a.id));
            let total = matches.len();
            matches.truncate(query.limit);
            Ok(MessagePage { messages: matches, total })
        })
    }

    async fn forward_messages(
        &self,
        from: &Peer,
        ids: &[i64],
        to: &Peer,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            for id in ids {
                if s.fail_forward_of == Some(*id) {
                    return Err(PlatformError::Api {
                        call: "forward".into(),
                        status: 500,
                        message: "RPC_CALL_FAIL".into(),
                    });
                }
                s.forwarded.push((from.id, *id, to.id));
            }
            Ok(())
        })
    }
}
