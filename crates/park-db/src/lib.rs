pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// How long a writer waits on a lock held by another process (the bot and the
/// sync loop share one file).
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;

        // WAL so the bot can read while a sync cycle is open
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Overrides how long a write waits for another connection's lock before
    /// failing with a busy error (see [`is_busy`]).
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.with_conn(|conn| Ok(conn.busy_timeout(timeout)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }

    /// Opens the write transaction that spans one sync cycle.
    ///
    /// The connection lock is only taken per statement, so the caller may
    /// await remote calls while the transaction is open. Everything executed
    /// through this `Database` until `commit` belongs to the cycle. Dropping
    /// the guard without committing rolls the cycle back.
    pub fn begin_cycle(&self) -> Result<CycleTx<'_>> {
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")
                .context("beginning cycle transaction")?;
            Ok(())
        })?;
        Ok(CycleTx { db: self, open: true })
    }
}

pub struct CycleTx<'a> {
    db: &'a Database,
    open: bool,
}

impl CycleTx<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.open = false;
        let res = self.db.with_conn(|conn| {
            conn.execute_batch("COMMIT").context("committing cycle transaction")?;
            Ok(())
        });
        if res.is_err() {
            // A failed COMMIT leaves the transaction open
            self.db.with_conn(|conn| Ok(conn.execute_batch("ROLLBACK")?)).ok();
        }
        res
    }

}

impl Drop for CycleTx<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.db.with_conn(|conn| Ok(conn.execute_batch("ROLLBACK")?)) {
                warn!("Cycle rollback failed: {:#}", e);
            }
        }
    }
}

/// True when `err` comes from a write that gave up waiting for another
/// connection's lock. Such writes can be retried once the lock is released.
pub fn is_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    })
}
