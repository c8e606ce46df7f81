use std::time::Duration;

use tracing::info;

use park_db::Database;
use park_types::remote::Peer;

use crate::error::SyncError;
use crate::platform::Platform;

/// Relays every ledger row the bot has not acknowledged yet, one message per
/// call, pausing `delay` between calls to stay under the platform's flood
/// limits. The first failed relay aborts the run.
///
/// The relay marker is not written here. The bot records it when the copy
/// arrives, so a relay that never lands is retried by the next cycle.
pub async fn dispatch_pending(
    platform: &dyn Platform,
    db: &Database,
    channel: &Peer,
    bot: &Peer,
    delay: Duration,
) -> Result<usize, SyncError> {
    let pending = db.pending_forwards()?;

    for (i, row) in pending.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        info!(msg_id = row.msg_id, "Relaying: {}", row.msg_text);
        platform.forward_messages(channel, &[row.msg_id], bot).await?;
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::fake::{FakePlatform, bot_peer, channel_peer};
    use park_db::models::NewComingOut;

    fn seed(db: &Database, ids: &[i64]) {
        let rows: Vec<NewComingOut> = ids
            .iter()
            .map(|&id| NewComingOut {
                msg_id: id,
                user_id: id * 10,
                msg_date: id,
                msg_text: format!("#1корпус #{}этаж", id),
                building_num: 1,
                floor_num: id,
            })
            .collect();
        db.insert_comingouts(&rows).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn relays_pending_rows_in_order_with_pause() {
        let fake = FakePlatform::new();
        let db = Database::open_in_memory().unwrap();
        seed(&db, &[3, 1, 2]);
        db.acknowledge_forward(900, 1, 20, "#1корпус #2этаж").unwrap();

        let started = tokio::time::Instant::now();
        let n = dispatch_pending(&fake, &db, &channel_peer(1), &bot_peer(2), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(fake.forwarded(), vec![(1, 1, 2), (1, 3, 2)]);
        // one pause between two relays, none after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn first_failure_stops_the_run() {
        let fake = FakePlatform::new();
        fake.fail_forward_of(Some(1));
        let db = Database::open_in_memory().unwrap();
        seed(&db, &[1, 2]);

        let err = dispatch_pending(&fake, &db, &channel_peer(1), &bot_peer(2), Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Remote(PlatformError::Api { .. })));
        assert!(fake.forwarded().is_empty());
        assert_eq!(db.pending_forwards().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn successful_relay_leaves_marker_to_the_bot() {
        let fake = FakePlatform::new();
        let db = Database::open_in_memory().unwrap();
        seed(&db, &[1]);

        dispatch_pending(&fake, &db, &channel_peer(1), &bot_peer(2), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(db.pending_forwards().unwrap().len(), 1);
    }
}
