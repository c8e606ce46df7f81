use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (ledgers and deployment config)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS bot_config (
                id              TEXT PRIMARY KEY,
                api_id          INTEGER NOT NULL,
                api_hash        TEXT NOT NULL,
                chat_url        TEXT NOT NULL,
                bot_username    TEXT NOT NULL,
                bot_key         TEXT
            );

            CREATE TABLE IF NOT EXISTS known_users (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL,
                joined_on   INTEGER NOT NULL,
                removed_on  INTEGER
            );

            CREATE TABLE IF NOT EXISTS comingouts (
                msg_id              INTEGER PRIMARY KEY,
                user_id             INTEGER NOT NULL,
                msg_date            INTEGER NOT NULL,
                msg_text            TEXT NOT NULL,
                building_num        INTEGER NOT NULL,
                floor_num           INTEGER NOT NULL,
                deprecated          INTEGER NOT NULL DEFAULT 0,
                forwarded_chat_id   INTEGER,
                forwarded_msg_id    INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_comingouts_user
                ON comingouts(user_id);

            CREATE INDEX IF NOT EXISTS idx_comingouts_place
                ON comingouts(building_num, floor_num);

            CREATE TABLE IF NOT EXISTS sync_log (
                started_at  INTEGER NOT NULL,
                finished_at INTEGER
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
