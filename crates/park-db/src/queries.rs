use crate::Database;
use crate::models::{BuildingPost, LiveMember, MembershipDelta, NewComingOut};
use anyhow::{Context, Result};
use park_types::models::{
    ComingOut, DeploymentConfig, KnownUser, MemberStatus, NeighborMessage, Place, SyncLogEntry,
};
use rusqlite::{Connection, Row};

const COMINGOUT_COLUMNS: &str = "msg_id, user_id, msg_date, msg_text, building_num, floor_num,
     deprecated, forwarded_chat_id, forwarded_msg_id";

impl Database {
    // -- Deployment config --

    pub fn load_config(&self, name: &str) -> Result<Option<DeploymentConfig>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, api_id, api_hash, chat_url, bot_username, bot_key
                 FROM bot_config WHERE id = ?1",
                [name],
                |row| {
                    Ok(DeploymentConfig {
                        id: row.get(0)?,
                        api_id: row.get(1)?,
                        api_hash: row.get(2)?,
                        chat_url: row.get(3)?,
                        bot_username: row.get(4)?,
                        bot_key: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn save_config(&self, cfg: &DeploymentConfig) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO bot_config
                    (id, api_id, api_hash, chat_url, bot_username, bot_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    cfg.id,
                    cfg.api_id,
                    cfg.api_hash,
                    cfg.chat_url,
                    cfg.bot_username,
                    cfg.bot_key
                ],
            )?;
            Ok(())
        })
    }

    // -- Membership ledger --

    /// Diffs the live listing against the ledger: inserts new members, soft
    /// deletes current members missing from `live`, and revives departed
    /// members found in `live`. Runs atomically.
    pub fn reconcile_members(&self, live: &[LiveMember], now: i64) -> Result<MembershipDelta> {
        self.with_conn_mut(|conn| {
            let sp = conn.savepoint()?;
            let delta = reconcile(&sp, live, now)?;
            sp.commit()?;
            Ok(delta)
        })
    }

    pub fn known_user(&self, id: i64) -> Result<Option<KnownUser>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, joined_on, removed_on FROM known_users WHERE id = ?1",
                [id],
                known_user_from_row,
            )
            .optional()
        })
    }

    pub fn known_users(&self) -> Result<Vec<KnownUser>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, joined_on, removed_on FROM known_users ORDER BY id")?;
            let rows = stmt
                .query_map([], known_user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn current_member_ids(&self) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM known_users WHERE removed_on IS NULL ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Current members who never posted a tagged message, oldest first.
    pub fn inactive_members(&self) -> Result<Vec<KnownUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT k.id, k.name, k.joined_on, k.removed_on
                 FROM known_users k
                 WHERE k.removed_on IS NULL
                   AND NOT EXISTS (SELECT 1 FROM comingouts c WHERE c.user_id = k.id)
                 ORDER BY k.joined_on, k.id",
            )?;
            let rows = stmt
                .query_map([], known_user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Tagged message ledger --

    /// Inserts harvested messages, ignoring ids already in the ledger.
    /// Returns how many rows were actually added.
    pub fn insert_comingouts(&self, rows: &[NewComingOut]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let sp = conn.savepoint()?;
            let mut inserted = 0;
            {
                let mut stmt = sp.prepare(
                    "INSERT OR IGNORE INTO comingouts
                        (msg_id, user_id, msg_date, msg_text, building_num, floor_num, deprecated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                )?;
                for row in rows {
                    inserted += stmt.execute(rusqlite::params![
                        row.msg_id,
                        row.user_id,
                        row.msg_date,
                        row.msg_text,
                        row.building_num,
                        row.floor_num
                    ])?;
                }
            }
            sp.commit()?;
            Ok(inserted)
        })
    }

    /// Marks the given `(msg_id, user_id)` pairs as deprecated. Overwrites,
    /// never toggles.
    pub fn deprecate_messages(&self, pairs: &[(i64, i64)]) -> Result<usize> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "UPDATE comingouts SET deprecated = 1 WHERE msg_id = ?1 AND user_id = ?2",
            )?;
            let mut touched = 0;
            for (msg_id, user_id) in pairs {
                touched += stmt.execute([msg_id, user_id])?;
            }
            Ok(touched)
        })
    }

    pub fn comingout(&self, msg_id: i64) -> Result<Option<ComingOut>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM comingouts WHERE msg_id = ?1", COMINGOUT_COLUMNS),
                [msg_id],
                comingout_from_row,
            )
            .optional()
        })
    }

    pub fn comingouts(&self) -> Result<Vec<ComingOut>> {
        self.with_conn(|conn| query_comingouts(conn, "1 = 1"))
    }

    /// Rows whose relayed copy has not been acknowledged yet.
    pub fn pending_forwards(&self) -> Result<Vec<ComingOut>> {
        self.with_conn(|conn| query_comingouts(conn, "forwarded_msg_id IS NULL"))
    }

    /// Records where the relayed copy of a tagged message landed. Matches the
    /// original by author and text since the relayed copy carries no source
    /// message id. Returns the number of rows updated.
    pub fn acknowledge_forward(
        &self,
        chat_id: i64,
        forwarded_msg_id: i64,
        user_id: i64,
        text: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE comingouts
                 SET forwarded_chat_id = ?1,
                     forwarded_msg_id = ?2
                 WHERE forwarded_chat_id IS NULL
                   AND forwarded_msg_id IS NULL
                   AND user_id = ?3
                   AND msg_text = ?4",
                rusqlite::params![chat_id, forwarded_msg_id, user_id, text],
            )?;
            Ok(n)
        })
    }

    /// Latest non-deprecated tagged message of every current member living in
    /// `building`.
    pub fn latest_building_posts(&self, building: i64) -> Result<Vec<BuildingPost>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.user_id, MAX(c.msg_id)
                 FROM comingouts c
                 INNER JOIN known_users u ON c.user_id = u.id
                 WHERE c.building_num = ?1
                   AND c.deprecated = 0
                   AND u.removed_on IS NULL
                 GROUP BY c.user_id
                 ORDER BY c.user_id",
            )?;
            let rows = stmt
                .query_map([building], |row| {
                    Ok(BuildingPost {
                        user_id: row.get(0)?,
                        msg_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Neighbour lookups --

    /// Classifies a user: not a current member, a member who joined after
    /// `trusted_before`, or an established member.
    pub fn member_status(&self, user_id: i64, trusted_before: i64) -> Result<MemberStatus> {
        self.with_conn(|conn| {
            let joined_on: Option<i64> = conn
                .query_row(
                    "SELECT joined_on FROM known_users WHERE removed_on IS NULL AND id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(match joined_on {
                None => MemberStatus::Stranger,
                Some(joined) if joined < trusted_before => MemberStatus::KnownAndTrusted,
                Some(_) => MemberStatus::KnownButUntrusted,
            })
        })
    }

    pub fn places_of(&self, user_id: i64) -> Result<Vec<Place>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT building_num, floor_num
                 FROM comingouts
                 WHERE deprecated = 0 AND user_id = ?1
                 ORDER BY building_num, floor_num",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(Place {
                        building: row.get(0)?,
                        floor: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Relayed messages of other users in the same building, one floor below
    /// to one floor above.
    pub fn neighbors(&self, user_id: i64, place: Place) -> Result<Vec<NeighborMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT forwarded_chat_id, forwarded_msg_id
                 FROM comingouts
                 WHERE deprecated = 0
                   AND forwarded_chat_id IS NOT NULL
                   AND forwarded_msg_id IS NOT NULL
                   AND user_id <> ?1
                   AND building_num = ?2
                   AND floor_num IN (?3, ?4, ?5)
                 ORDER BY floor_num, user_id, msg_date",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        user_id,
                        place.building,
                        place.floor - 1,
                        place.floor,
                        place.floor + 1
                    ],
                    |row| {
                        Ok(NeighborMessage {
                            chat_id: row.get(0)?,
                            msg_id: row.get(1)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Sync log --

    /// Appends a cycle marker and returns its rowid.
    pub fn begin_sync(&self, now: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO sync_log (started_at) VALUES (?1)", [now])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn finish_sync(&self, marker: i64, now: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sync_log SET finished_at = ?1 WHERE rowid = ?2",
                [now, marker],
            )?;
            Ok(())
        })
    }

    pub fn sync_log(&self) -> Result<Vec<SyncLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT started_at, finished_at FROM sync_log ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SyncLogEntry {
                        started_at: row.get(0)?,
                        finished_at: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn reconcile(conn: &Connection, live: &[LiveMember], now: i64) -> Result<MembershipDelta> {
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS current_users (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL
        );
        DELETE FROM temp.current_users;",
    )?;
    {
        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO temp.current_users (id, name) VALUES (?1, ?2)")?;
        for member in live {
            stmt.execute(rusqlite::params![member.id, member.name])?;
        }
    }

    let rejoined = conn
        .execute(
            "UPDATE known_users
             SET removed_on = NULL, joined_on = ?1
             WHERE removed_on IS NOT NULL
               AND EXISTS (SELECT 1 FROM temp.current_users c WHERE c.id = known_users.id)",
            [now],
        )
        .context("reviving returning members")?;

    let joined = conn
        .execute(
            "INSERT INTO known_users (id, name, joined_on, removed_on)
             SELECT c.id, c.name, ?1, NULL FROM temp.current_users c
             WHERE NOT EXISTS (SELECT 1 FROM known_users k WHERE k.id = c.id)",
            [now],
        )
        .context("inserting new members")?;

    let departed = conn
        .execute(
            "UPDATE known_users
             SET removed_on = ?1
             WHERE removed_on IS NULL
               AND NOT EXISTS (SELECT 1 FROM temp.current_users c WHERE c.id = known_users.id)",
            [now],
        )
        .context("marking departed members")?;

    conn.execute_batch("DROP TABLE temp.current_users")?;

    Ok(MembershipDelta {
        joined,
        departed,
        rejoined,
    })
}

fn query_comingouts(conn: &Connection, filter: &str) -> Result<Vec<ComingOut>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comingouts WHERE {} ORDER BY msg_id",
        COMINGOUT_COLUMNS, filter
    ))?;
    let rows = stmt
        .query_map([], comingout_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn known_user_from_row(row: &Row<'_>) -> rusqlite::Result<KnownUser> {
    Ok(KnownUser {
        id: row.get(0)?,
        name: row.get(1)?,
        joined_on: row.get(2)?,
        removed_on: row.get(3)?,
    })
}

fn comingout_from_row(row: &Row<'_>) -> rusqlite::Result<ComingOut> {
    Ok(ComingOut {
        msg_id: row.get(0)?,
        user_id: row.get(1)?,
        msg_date: row.get(2)?,
        msg_text: row.get(3)?,
        building_num: row.get(4)?,
        floor_num: row.get(5)?,
        deprecated: row.get(6)?,
        forwarded_chat_id: row.get(7)?,
        forwarded_msg_id: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
