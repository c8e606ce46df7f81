use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use park_db::Database;
use park_db::models::MembershipDelta;
use park_types::models::DeploymentConfig;
use park_types::remote::Peer;

use crate::dispatcher;
use crate::error::SyncError;
use crate::harvester::{self, HarvestOutcome, HarvestRules};
use crate::platform::Platform;
use crate::reconciler;
use crate::resolver;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Pause between two relays.
    pub forward_delay: Duration,
    pub rules: HarvestRules,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            forward_delay: Duration::from_secs(1),
            rules: HarvestRules::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub membership: MembershipDelta,
    pub harvest: HarvestOutcome,
    pub relayed: usize,
}

/// The sync loop with its resolved chat and bot handles.
pub struct Engine<'a> {
    platform: &'a dyn Platform,
    db: &'a Database,
    channel: Peer,
    bot: Peer,
    settings: SyncSettings,
}

impl<'a> Engine<'a> {
    /// Resolves the chat and the bot named by `config`. Fails without
    /// touching the ledger.
    pub async fn start(
        platform: &'a dyn Platform,
        db: &'a Database,
        config: &DeploymentConfig,
        settings: SyncSettings,
    ) -> Result<Self, SyncError> {
        let channel = resolver::resolve_channel(platform, &config.chat_url).await?;
        let bot = resolver::resolve_bot(platform, &config.bot_username).await?;
        Ok(Self {
            platform,
            db,
            channel,
            bot,
            settings,
        })
    }

    pub fn channel(&self) -> &Peer {
        &self.channel
    }

    pub fn bot(&self) -> &Peer {
        &self.bot
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        self.run_cycle_at(Utc::now().timestamp()).await
    }

    /// One reconcile → harvest → log → relay pass in a single transaction.
    /// Any error rolls the whole cycle back.
    pub async fn run_cycle_at(&self, now: i64) -> Result<CycleReport, SyncError> {
        let tx = self.db.begin_cycle()?;

        let membership = reconciler::reconcile(self.platform, self.db, &self.channel, now).await?;
        let harvest =
            harvester::harvest(self.platform, self.db, &self.channel, &self.settings.rules).await?;
        let marker = self.db.begin_sync(now)?;
        let relayed = dispatcher::dispatch_pending(
            self.platform,
            self.db,
            &self.channel,
            &self.bot,
            self.settings.forward_delay,
        )
        .await?;
        self.db.finish_sync(marker, Utc::now().timestamp().max(now))?;

        tx.commit()?;
        Ok(CycleReport {
            membership,
            harvest,
            relayed,
        })
    }

    /// Runs cycles until `shutdown` fires, including mid-cycle. A failed
    /// cycle is logged and retried after the regular interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Sync loop started (interval {}s, relay delay {}ms)",
            self.settings.interval.as_secs(),
            self.settings.forward_delay.as_millis()
        );

        loop {
            info!("Sync cycle");
            // Dropping an unfinished cycle drops its transaction guard,
            // which rolls the cycle back.
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!("Shutdown during sync cycle, rolled back");
                    break;
                }
                outcome = self.run_cycle() => outcome,
            };
            match outcome {
                Ok(report) => info!(
                    joined = report.membership.joined,
                    departed = report.membership.departed,
                    rejoined = report.membership.rejoined,
                    harvested = report.harvest.inserted,
                    relayed = report.relayed,
                    "Sync cycle committed"
                ),
                Err(e) => warn!("Sync cycle rolled back: {}", e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        info!("Sync loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::fake::{FakePlatform, bot_peer, channel_peer, message, person};

    fn config() -> DeploymentConfig {
        DeploymentConfig {
            id: "test".into(),
            api_id: 1,
            api_hash: "hash".into(),
            chat_url: "Park residents".into(),
            bot_username: "park_bot".into(),
            bot_key: None,
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            interval: Duration::from_secs(300),
            forward_delay: Duration::ZERO,
            rules: HarvestRules::default(),
        }
    }

    fn community() -> FakePlatform {
        let fake = FakePlatform::new();
        fake.add_dialog("Park residents", channel_peer(100));
        fake.add_entity("park_bot", bot_peer(200));
        fake
    }

    #[tokio::test]
    async fn start_fails_before_any_cycle_without_bot() {
        let fake = FakePlatform::new();
        fake.add_dialog("Park residents", channel_peer(100));
        let db = Database::open_in_memory().unwrap();

        let err = Engine::start(&fake, &db, &config(), settings()).await.err().unwrap();
        assert!(err.is_fatal());
        assert!(db.sync_log().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_cycle_commits_all_phases() {
        let fake = community();
        fake.set_participants(vec![person(1, "Alice"), person(2, "Bob")]);
        fake.post(message(42, 1, "#1корпус #3этаж"));
        let db = Database::open_in_memory().unwrap();
        let engine = Engine::start(&fake, &db, &config(), settings()).await.unwrap();

        let report = engine.run_cycle_at(1_000).await.unwrap();

        assert_eq!(report.membership.joined, 2);
        assert_eq!(report.harvest.inserted, 1);
        assert_eq!(report.relayed, 1);
        assert_eq!(fake.forwarded(), vec![(100, 42, 200)]);
        let log = db.sync_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].started_at, 1_000);
        assert!(log[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn user_leaves_and_returns_across_cycles() {
        let fake = community();
        let db = Database::open_in_memory().unwrap();
        let engine = Engine::start(&fake, &db, &config(), settings()).await.unwrap();

        fake.set_participants(vec![person(1, "Alice"), person(2, "Bob")]);
        engine.run_cycle_at(1_000).await.unwrap();
        fake.set_participants(vec![person(2, "Bob")]);
        engine.run_cycle_at(2_000).await.unwrap();
        assert_eq!(db.known_user(1).unwrap().unwrap().removed_on, Some(2_000));

        fake.set_participants(vec![person(1, "Alice"), person(2, "Bob")]);
        engine.run_cycle_at(3_000).await.unwrap();

        let alice = db.known_user(1).unwrap().unwrap();
        assert_eq!(alice.removed_on, None);
        assert_eq!(alice.joined_on, 3_000);
        assert_eq!(db.known_user(2).unwrap().unwrap().joined_on, 1_000);
    }

    #[tokio::test]
    async fn failed_relay_rolls_back_the_whole_cycle() {
        let fake = community();
        fake.set_participants(vec![person(1, "Alice")]);
        fake.post(message(1, 1, "#1корпус #3этаж"));
        fake.post(message(2, 1, "#2корпус #4этаж"));
        fake.fail_forward_of(Some(1));
        let db = Database::open_in_memory().unwrap();
        let engine = Engine::start(&fake, &db, &config(), settings()).await.unwrap();

        let err = engine.run_cycle_at(1_000).await.unwrap_err();

        assert!(matches!(err, SyncError::Remote(PlatformError::Api { .. })));
        assert!(!err.is_fatal());
        assert!(fake.forwarded().is_empty());
        assert!(db.known_users().unwrap().is_empty());
        assert!(db.comingouts().unwrap().is_empty());
        assert!(db.sync_log().unwrap().is_empty());

        // next cycle starts from a clean slate and succeeds
        fake.fail_forward_of(None);
        let report = engine.run_cycle_at(2_000).await.unwrap();
        assert_eq!(report.relayed, 2);
        assert_eq!(fake.forwarded(), vec![(100, 1, 200), (100, 2, 200)]);
    }

    #[tokio::test]
    async fn truncated_listing_aborts_cycle_before_harvest() {
        let fake = community();
        fake.set_participants(vec![person(1, "Alice")]);
        fake.set_reported_total(2);
        fake.post(message(1, 1, "#1корпус #3этаж"));
        let db = Database::open_in_memory().unwrap();
        let engine = Engine::start(&fake, &db, &config(), settings()).await.unwrap();

        let err = engine.run_cycle_at(1_000).await.unwrap_err();

        assert!(matches!(err, SyncError::Remote(PlatformError::IncompleteSnapshot { .. })));
        assert!(fake.searches().is_empty());
        assert!(db.known_users().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_running_after_failures_until_cancelled() {
        let fake = community();
        fake.fail_participants(true);
        let db = Database::open_in_memory().unwrap();
        let engine = Engine::start(&fake, &db, &config(), settings()).await.unwrap();
        let shutdown = CancellationToken::new();

        let stopper = {
            let shutdown = shutdown.clone();
            let fake = &fake;
            async move {
                // first cycle fails, second succeeds, then stop
                tokio::time::sleep(Duration::from_secs(10)).await;
                fake.fail_participants(false);
                fake.set_participants(vec![person(1, "Alice")]);
                tokio::time::sleep(Duration::from_secs(300)).await;
                shutdown.cancel();
            }
        };
        tokio::join!(engine.run(shutdown.clone()), stopper);

        assert_eq!(db.sync_log().unwrap().len(), 1);
        assert_eq!(db.current_member_ids().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_relay_backlog() {
        let fake = community();
        fake.set_participants(vec![person(1, "Alice")]);
        for id in 1..=10 {
            fake.post(message(id, 1, &format!("#1корпус #{}этаж", id)));
        }
        let db = Database::open_in_memory().unwrap();
        let slow = SyncSettings {
            forward_delay: Duration::from_secs(60),
            ..settings()
        };
        let engine = Engine::start(&fake, &db, &config(), slow).await.unwrap();
        let shutdown = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let stopper = {
            let shutdown = shutdown.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                shutdown.cancel();
            }
        };
        tokio::join!(engine.run(shutdown.clone()), stopper);

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(fake.forwarded(), vec![(100, 1, 200)]);
        // the interrupted cycle left nothing behind
        assert!(db.known_users().unwrap().is_empty());
        assert!(db.comingouts().unwrap().is_empty());
        assert!(db.sync_log().unwrap().is_empty());
    }
}
