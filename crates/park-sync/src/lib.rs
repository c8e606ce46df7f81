//! Sync & forward engine: keeps the membership and tagged-message ledgers in
//! step with the community chat and relays new tagged messages to the bot.

pub mod bridge;
pub mod dispatcher;
pub mod error;
pub mod harvester;
pub mod platform;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
mod fake;

pub use error::{PlatformError, SyncError};
pub use platform::{MessageQuery, Platform};
pub use scheduler::{Engine, SyncSettings};
