use anyhow::Result;
use tracing::{error, info};

use park_db::Database;
use park_types::models::MemberStatus;

use crate::api::{Message, Outbox};
use crate::replies;

/// Members younger than this are not shown their neighbours yet.
pub const TRUST_AFTER_SECS: i64 = 2 * 24 * 60 * 60;

/// What the poll loop should do with the update after handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Done,
    /// The relay acknowledgement could not be written because a sync cycle
    /// holds the store. The update must be handled again later.
    StoreBusy,
}

/// Handles one incoming message. Errors are logged and, for `/start`,
/// answered with an apology. Only a busy store is reported back.
pub async fn handle_message(db: &Database, outbox: &dyn Outbox, msg: &Message, now: i64) -> Handled {
    if let (Some(author), Some(text)) = (msg.forwarded_from_user(), msg.text.as_deref()) {
        return match acknowledge(db, msg.chat.id, msg.message_id, author.id, text) {
            Ok(()) => Handled::Done,
            Err(e) if park_db::is_busy(&e) => Handled::StoreBusy,
            Err(e) => {
                error!("Recording relayed message {} failed: {:#}", msg.message_id, e);
                Handled::Done
            }
        };
    }

    let is_start = msg
        .text
        .as_deref()
        .and_then(|t| t.split_whitespace().next())
        .is_some_and(|cmd| cmd == "/start" || cmd.starts_with("/start@"));
    let Some(from) = msg.from.as_ref().filter(|_| is_start) else {
        return Handled::Done;
    };

    if let Err(e) = start(db, outbox, from.id, msg.chat.id, now).await {
        error!(user_id = from.id, "/start failed: {:#}", e);
        if let Err(e) = outbox.send_message(msg.chat.id, replies::APOLOGY).await {
            error!("Sending apology to {} failed: {:#}", msg.chat.id, e);
        }
    }
    Handled::Done
}

fn acknowledge(db: &Database, chat_id: i64, message_id: i64, author: i64, text: &str) -> Result<()> {
    let updated = db.acknowledge_forward(chat_id, message_id, author, text)?;
    if updated > 0 {
        info!("Update forwarded msg {} from {}", message_id, author);
    }
    Ok(())
}

/// Greets the user and, if they are an established member with exactly one
/// known place, forwards them their neighbours' introductions.
pub async fn start(
    db: &Database,
    outbox: &dyn Outbox,
    user_id: i64,
    chat_id: i64,
    now: i64,
) -> Result<()> {
    let status = db.member_status(user_id, now - TRUST_AFTER_SECS)?;
    info!(user_id, ?status, "/start");
    outbox.send_message(chat_id, &replies::greeting(status)).await?;
    if status != MemberStatus::KnownAndTrusted {
        return Ok(());
    }

    let places = db.places_of(user_id)?;
    outbox.send_message(chat_id, &replies::places(&places)).await?;
    let [place] = places.as_slice() else {
        return Ok(());
    };

    let neighbors = db.neighbors(user_id, *place)?;
    outbox.send_message(chat_id, &replies::neighbors(neighbors.len())).await?;
    for n in &neighbors {
        outbox.forward_message(chat_id, n.chat_id, n.msg_id).await?;
    }
    Ok(())
}
