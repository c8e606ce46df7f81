//! One-shot jobs built on the engine primitives.

use std::collections::HashMap;
use std::time::Duration;

use chrono::DateTime;
use tracing::{info, warn};

use park_db::Database;
use park_types::remote::{Participant, Peer};

use crate::error::SyncError;
use crate::platform::{MessageQuery, Platform};

const RECENT_MESSAGES: usize = 10;

/// Lists current members who never tagged their building, oldest join first,
/// as semicolon separated lines:
///
/// `joined;last seen;message count;id;name`, followed by one
/// `;;;;;date;text` line per recent message.
pub async fn inactive_members(
    platform: &dyn Platform,
    db: &Database,
    channel: &Peer,
    pause: Duration,
) -> Result<Vec<String>, SyncError> {
    let live: HashMap<i64, Participant> = platform
        .participants(channel)
        .await?
        .participants
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut lines = Vec::new();
    for (i, member) in db.inactive_members()?.iter().enumerate() {
        let Some(user) = live.get(&member.id) else {
            warn!(user_id = member.id, "Ledger member missing from live listing, skipped");
            continue;
        };
        if i > 0 {
            tokio::time::sleep(pause).await;
        }

        let query = MessageQuery {
            search: None,
            from_user: Some(user.id),
            limit: RECENT_MESSAGES,
        };
        let page = platform.search_messages(channel, &query).await?;

        lines.push(
            [
                format_date(member.joined_on),
                user.status.label(),
                page.total.saturating_sub(1).to_string(),
                user.id.to_string(),
                user.display_name(),
            ]
            .join(";"),
        );
        for msg in &page.messages {
            lines.push(format!(
                ";;;;;{};{}",
                msg.date.format("%Y-%m-%d"),
                msg.text.as_deref().unwrap_or("")
            ));
        }
    }
    Ok(lines)
}

/// Forwards the latest tagged message of every current member of `building`
/// to `dest`. Returns the number of messages forwarded.
pub async fn forward_building(
    platform: &dyn Platform,
    db: &Database,
    source: &Peer,
    dest: &Peer,
    building: i64,
    pause: Duration,
) -> Result<usize, SyncError> {
    let posts = db.latest_building_posts(building)?;
    for (i, post) in posts.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pause).await;
        }
        info!(user_id = post.user_id, msg_id = post.msg_id, "Forwarding building post");
        platform.forward_messages(source, &[post.msg_id], dest).await?;
    }
    Ok(posts.len())
}

fn format_date(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
