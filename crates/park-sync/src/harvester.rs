use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use park_db::Database;
use park_db::models::NewComingOut;
use park_types::remote::{Peer, RemoteMessage};

use crate::error::{PlatformError, SyncError};
use crate::platform::{MessageQuery, Platform};

/// `#<n>этаж`, any case. ASCII digits only, and few enough to fit an `i64`.
static FLOOR_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#([0-9]{1,18})этаж").expect("floor marker pattern is valid"));

/// Messages known to carry a wrong tag, as `(msg_id, user_id)`.
pub const MANUAL_EXCLUSIONS: &[(i64, i64)] = &[(11258, 796267776), (9729, 125290876)];

const DEFAULT_BUILDINGS: [i64; 4] = [1, 2, 3, 4];
const DEFAULT_SEARCH_LIMIT: usize = 1000;

/// What to search for and how to classify the results.
#[derive(Debug, Clone)]
pub struct HarvestRules {
    pub buildings: Vec<i64>,
    /// Most recent matches fetched per building tag.
    pub search_limit: usize,
    pub exclusions: Vec<(i64, i64)>,
}

impl Default for HarvestRules {
    fn default() -> Self {
        Self {
            buildings: DEFAULT_BUILDINGS.to_vec(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            exclusions: MANUAL_EXCLUSIONS.to_vec(),
        }
    }
}

impl HarvestRules {
    pub fn building_tag(building: i64) -> String {
        format!("#{}корпус", building)
    }

    /// First floor number tagged in `text`.
    pub fn extract_floor(text: &str) -> Option<i64> {
        FLOOR_MARKER
            .captures_iter(text)
            .next()
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestOutcome {
    /// Tagged messages seen on the remote side.
    pub found: usize,
    /// Of those, rows new to the ledger.
    pub inserted: usize,
}

/// Searches every building tag and keeps the messages that also carry a floor
/// marker. Messages without author, text, or floor are dropped.
pub async fn collect(
    platform: &dyn Platform,
    channel: &Peer,
    rules: &HarvestRules,
) -> Result<Vec<NewComingOut>, PlatformError> {
    let mut rows = Vec::new();
    for &building in &rules.buildings {
        let query = MessageQuery {
            search: Some(HarvestRules::building_tag(building)),
            from_user: None,
            limit: rules.search_limit,
        };
        let page = platform.search_messages(channel, &query).await?;
        let before = rows.len();
        rows.extend(page.messages.iter().filter_map(|m| tagged_row(m, building)));
        debug!(
            building,
            matches = page.messages.len(),
            kept = rows.len() - before,
            "Searched building tag"
        );
    }
    Ok(rows)
}

fn tagged_row(msg: &RemoteMessage, building: i64) -> Option<NewComingOut> {
    let text = msg.text.as_deref()?;
    let floor = HarvestRules::extract_floor(text)?;
    Some(NewComingOut {
        msg_id: msg.id,
        user_id: msg.from_id?,
        msg_date: msg.date.timestamp(),
        msg_text: text.to_string(),
        building_num: building,
        floor_num: floor,
    })
}

/// Collects tagged messages into the ledger, then re-applies the manual
/// exclusions. Safe to repeat every cycle.
pub async fn harvest(
    platform: &dyn Platform,
    db: &Database,
    channel: &Peer,
    rules: &HarvestRules,
) -> Result<HarvestOutcome, SyncError> {
    let rows = collect(platform, channel, rules).await?;
    let inserted = db.insert_comingouts(&rows)?;
    db.deprecate_messages(&rules.exclusions)?;

    if inserted > 0 {
        info!(found = rows.len(), inserted, "Harvested tagged messages");
    }
    Ok(HarvestOutcome {
        found: rows.len(),
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakePlatform, channel_peer, message};

    #[test]
    fn floor_marker_extraction() {
        assert_eq!(HarvestRules::extract_floor("#1корпус #3этаж"), Some(3));
        assert_eq!(HarvestRules::extract_floor("Привет! #2КОРПУС #12Этаж кв 5"), Some(12));
        assert_eq!(HarvestRules::extract_floor("#4этаж и потом #7этаж"), Some(4));
        assert_eq!(HarvestRules::extract_floor("#1корпус, этаж 3"), None);
        assert_eq!(HarvestRules::extract_floor("# 3этаж"), None);
    }

    #[test]
    fn floor_marker_ignores_unparseable_numbers() {
        assert_eq!(HarvestRules::extract_floor("#３этаж"), None);
        assert_eq!(HarvestRules::extract_floor("#３этаж, точнее #5этаж"), Some(5));
        assert_eq!(HarvestRules::extract_floor("#99999999999999999999этаж #7этаж"), Some(7));
    }

    #[tokio::test]
    async fn harvest_is_idempotent() {
        let fake = FakePlatform::new();
        fake.post(message(42, 7, "#1корпус #3этаж"));
        let db = Database::open_in_memory().unwrap();
        let chan = channel_peer(1);
        let rules = HarvestRules::default();

        let first = harvest(&fake, &db, &chan, &rules).await.unwrap();
        let second = harvest(&fake, &db, &chan, &rules).await.unwrap();

        assert_eq!(first, HarvestOutcome { found: 1, inserted: 1 });
        assert_eq!(second, HarvestOutcome { found: 1, inserted: 0 });
        let rows = db.comingouts().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!((row.msg_id, row.user_id, row.building_num, row.floor_num), (42, 7, 1, 3));
        assert!(!row.deprecated);
    }

    #[tokio::test]
    async fn building_tag_without_floor_is_dropped() {
        let fake = FakePlatform::new();
        fake.post(message(1, 7, "#2корпус, живу тут"));
        fake.post(message(2, 8, "#3этаж without building"));
        let db = Database::open_in_memory().unwrap();

        let outcome = harvest(&fake, &db, &channel_peer(1), &HarvestRules::default())
            .await
            .unwrap();

        assert_eq!(outcome.found, 0);
        assert!(db.comingouts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exclusions_survive_a_ledger_wipe() {
        let fake = FakePlatform::new();
        fake.post(message(11258, 796267776, "#3корпус #5этаж"));
        fake.post(message(11259, 796267776, "#3корпус #6этаж"));
        let chan = channel_peer(1);
        let rules = HarvestRules::default();

        for _ in 0..2 {
            // fresh ledger each round
            let db = Database::open_in_memory().unwrap();
            harvest(&fake, &db, &chan, &rules).await.unwrap();
            assert!(db.comingout(11258).unwrap().unwrap().deprecated);
            assert!(!db.comingout(11259).unwrap().unwrap().deprecated);
        }
    }

    #[tokio::test]
    async fn searches_each_building_with_limit() {
        let fake = FakePlatform::new();
        let rules = HarvestRules {
            buildings: vec![1, 2],
            search_limit: 10,
            exclusions: vec![],
        };

        collect(&fake, &channel_peer(1), &rules).await.unwrap();

        let searches = fake.searches();
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].search.as_deref(), Some("#1корпус"));
        assert_eq!(searches[1].search.as_deref(), Some("#2корпус"));
        assert!(searches.iter().all(|q| q.limit == 10 && q.from_user.is_none()));
    }

    #[tokio::test]
    async fn search_limit_bounds_results() {
        let fake = FakePlatform::new();
        for id in 1..=5 {
            fake.post(message(id, 100 + id, "#1корпус #2этаж"));
        }
        let rules = HarvestRules {
            buildings: vec![1],
            search_limit: 3,
            exclusions: vec![],
        };

        let rows = collect(&fake, &channel_peer(1), &rules).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.msg_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }
}
