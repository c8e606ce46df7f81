//! Neighbour bot: receives the relayed tagged messages, records where they
//! landed, and introduces members to the people living next to them.

pub mod api;
pub mod handler;
pub mod replies;

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use park_db::Database;

use crate::api::{BotClient, Message, Outbox};
use crate::handler::Handled;

const POLL_PAUSE: Duration = Duration::from_millis(500);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const STORE_RETRY: Duration = Duration::from_millis(250);

/// Lock wait for the bot's own writes. Kept short since `deliver` retries
/// while a sync cycle holds the store.
pub const STORE_BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// Long-polls updates until `shutdown` fires.
///
/// An update is confirmed to the Bot API (by advancing `offset`) only once it
/// has been handled, so one left pending at shutdown is redelivered.
pub async fn run(db: &Database, client: &BotClient, shutdown: CancellationToken) {
    let mut offset: i64 = 0;
    info!("Bot polling for updates");

    'poll: loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = client.get_updates(offset) => res,
        };

        let pause = match polled {
            Ok(updates) => {
                for update in updates {
                    if let Some(message) = &update.message {
                        if !deliver(db, client, message, &shutdown).await {
                            break 'poll;
                        }
                    }
                    offset = update.update_id + 1;
                }
                POLL_PAUSE
            }
            Err(e) => {
                warn!("getUpdates failed, retrying in {}s: {:#}", ERROR_BACKOFF.as_secs(), e);
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!("Bot stopped");
}

/// Handles `message`, retrying with backoff while an open sync cycle holds
/// the store. Returns false if `shutdown` fired before it could be handled.
pub async fn deliver(
    db: &Database,
    outbox: &dyn Outbox,
    message: &Message,
    shutdown: &CancellationToken,
) -> bool {
    let mut backoff = STORE_RETRY;
    loop {
        match handler::handle_message(db, outbox, message, Utc::now().timestamp()).await {
            Handled::Done => return true,
            Handled::StoreBusy => {
                warn!(
                    msg_id = message.message_id,
                    "Store busy, retrying in {}ms",
                    backoff.as_millis()
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return false,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(ERROR_BACKOFF);
            }
        }
    }
}
