use tracing::{debug, info};

use park_types::remote::Peer;

use crate::error::SyncError;
use crate::platform::Platform;

/// Resolves the community chat. Private chats often cannot be looked up by
/// link, so a failed direct lookup falls back to the session's dialogs,
/// matched by exact display name.
pub async fn resolve_channel(platform: &dyn Platform, identifier: &str) -> Result<Peer, SyncError> {
    match platform.resolve_entity(identifier).await {
        Ok(peer) => {
            info!(chat = %identifier, id = peer.id, "Resolved chat");
            return Ok(peer);
        }
        Err(e) => debug!("Direct lookup of {:?} failed ({}), searching dialogs", identifier, e),
    }

    let peer = resolve_dialog(platform, identifier).await?;
    info!(chat = %identifier, id = peer.id, "Resolved chat by dialog name");
    Ok(peer)
}

/// First dialog whose display name equals `name`.
pub async fn resolve_dialog(platform: &dyn Platform, name: &str) -> Result<Peer, SyncError> {
    let dialogs = platform
        .dialogs()
        .await
        .map_err(|e| SyncError::Resolution(format!("listing dialogs: {}", e)))?;

    dialogs
        .into_iter()
        .find(|d| d.name == name)
        .map(|d| d.peer)
        .ok_or_else(|| SyncError::Resolution(format!("no chat or dialog named {:?}", name)))
}

/// Resolves the downstream bot. Anything that is not a bot account is a
/// misconfiguration.
pub async fn resolve_bot(platform: &dyn Platform, username: &str) -> Result<Peer, SyncError> {
    let peer = platform
        .resolve_entity(username)
        .await
        .map_err(|e| SyncError::Resolution(format!("bot {:?}: {}", username, e)))?;

    if !peer.is_bot() {
        return Err(SyncError::Config(format!("{:?} is not a bot account", username)));
    }

    info!(bot = %username, id = peer.id, "Resolved bot");
    Ok(peer)
}
