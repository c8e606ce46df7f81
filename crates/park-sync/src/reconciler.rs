use tracing::{debug, info};

use park_db::Database;
use park_db::models::{LiveMember, MembershipDelta};
use park_types::remote::{ParticipantSnapshot, Peer};

use crate::error::{PlatformError, SyncError};
use crate::platform::Platform;

/// Pulls the live participant listing of `channel` and applies it to the
/// membership ledger.
pub async fn reconcile(
    platform: &dyn Platform,
    db: &Database,
    channel: &Peer,
    now: i64,
) -> Result<MembershipDelta, SyncError> {
    let snapshot = platform.participants(channel).await?;
    apply_snapshot(db, &snapshot, now)
}

/// Applies one participant listing. A truncated listing would mark real
/// members as departed, so it is rejected before the ledger is touched.
pub fn apply_snapshot(
    db: &Database,
    snapshot: &ParticipantSnapshot,
    now: i64,
) -> Result<MembershipDelta, SyncError> {
    if !snapshot.is_complete() {
        return Err(PlatformError::IncompleteSnapshot {
            got: snapshot.participants.len(),
            total: snapshot.total,
        }
        .into());
    }

    let live: Vec<LiveMember> = snapshot
        .participants
        .iter()
        .map(|p| LiveMember {
            id: p.id,
            name: p.display_name(),
        })
        .collect();

    let delta = db.reconcile_members(&live, now)?;
    if delta.is_empty() {
        debug!(members = live.len(), "Membership unchanged");
    } else {
        info!(
            members = live.len(),
            joined = delta.joined,
            departed = delta.departed,
            rejoined = delta.rejoined,
            "Membership reconciled"
        );
    }
    Ok(delta)
}
