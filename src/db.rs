//! SQLite-backed cache store.
//!
//! The database lives at `~/.pagepace/goals.db` and is a disposable cache:
//! the progress service remains the source of truth for counters and goals,
//! and every table self-corrects on the next successful fetch. What must
//! survive restarts is the engine's own bookkeeping: baselines, progress
//! snapshots, and notification marks.

use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::{CacheError, CacheStore, NotifiedMark};
use crate::types::{AggregateCounters, Baseline, Goal};

const COUNTERS_KIND: &str = "counters";
const GOALS_KIND: &str = "goals";

/// SQLite implementation of [`CacheStore`].
///
/// The connection sits behind a non-poisoning mutex so a single store can be
/// shared by every engine consumer for a user.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) the database at the default location.
    pub fn open() -> Result<Self, CacheError> {
        let path = default_db_path()?;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(CacheError::CreateDir)?;
            }
        }
        Self::open_at(path)
    }

    /// Open (or create) the database at a specific path. Used by tests.
    pub fn open_at(path: PathBuf) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Default database path (`~/.pagepace/goals.db`).
fn default_db_path() -> Result<PathBuf, CacheError> {
    let home = dirs::home_dir().ok_or(CacheError::HomeDirNotFound)?;
    Ok(home.join(".pagepace").join("goals.db"))
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS goal_baselines (
            user_id        TEXT NOT NULL,
            goal_id        TEXT NOT NULL,
            daily_minutes  INTEGER NOT NULL,
            weekly_books   INTEGER NOT NULL,
            monthly_books  INTEGER NOT NULL,
            captured_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, goal_id)
        );
        CREATE TABLE IF NOT EXISTS progress_snapshots (
            user_id        TEXT NOT NULL,
            key            TEXT NOT NULL,
            last_observed  INTEGER NOT NULL,
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (user_id, key)
        );
        CREATE TABLE IF NOT EXISTS notified_marks (
            user_id        TEXT NOT NULL,
            key            TEXT NOT NULL,
            period_key     TEXT,
            notified_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, key)
        );
        CREATE TABLE IF NOT EXISTS remote_snapshots (
            user_id        TEXT NOT NULL,
            kind           TEXT NOT NULL,
            payload        TEXT NOT NULL,
            fetched_at     TEXT NOT NULL,
            PRIMARY KEY (user_id, kind)
        );",
    )
}

impl SqliteCache {
    fn read_remote_snapshot(&self, user_id: &str, kind: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock();
        let payload = conn
            .query_row(
                "SELECT payload FROM remote_snapshots WHERE user_id = ?1 AND kind = ?2",
                params![user_id, kind],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn write_remote_snapshot(&self, user_id: &str, kind: &str, payload: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO remote_snapshots (user_id, kind, payload, fetched_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, kind) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at",
            params![user_id, kind, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl CacheStore for SqliteCache {
    fn baseline(&self, user_id: &str, goal_id: &str) -> Result<Option<Baseline>, CacheError> {
        let conn = self.conn.lock();
        let baseline = conn
            .query_row(
                "SELECT goal_id, daily_minutes, weekly_books, monthly_books
                 FROM goal_baselines WHERE user_id = ?1 AND goal_id = ?2",
                params![user_id, goal_id],
                |row| {
                    Ok(Baseline {
                        goal_id: row.get(0)?,
                        daily_minutes_at_creation: row.get(1)?,
                        weekly_books_at_creation: row.get(2)?,
                        monthly_books_at_creation: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(baseline)
    }

    fn put_baseline(&self, user_id: &str, baseline: &Baseline) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        // INSERT OR IGNORE: the first captured baseline is permanent.
        conn.execute(
            "INSERT OR IGNORE INTO goal_baselines
                (user_id, goal_id, daily_minutes, weekly_books, monthly_books, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                baseline.goal_id,
                baseline.daily_minutes_at_creation,
                baseline.weekly_books_at_creation,
                baseline.monthly_books_at_creation,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn snapshot(&self, user_id: &str, key: &str) -> Result<Option<i64>, CacheError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT last_observed FROM progress_snapshots WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_snapshot(&self, user_id: &str, key: &str, current: i64) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO progress_snapshots (user_id, key, last_observed, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET
                last_observed = excluded.last_observed,
                updated_at = excluded.updated_at",
            params![user_id, key, current, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn notified_mark(&self, user_id: &str, key: &str) -> Result<Option<NotifiedMark>, CacheError> {
        let conn = self.conn.lock();
        let mark = conn
            .query_row(
                "SELECT key, period_key, notified_at
                 FROM notified_marks WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match mark {
            Some((key, period_key, notified_at)) => {
                let notified_at = chrono::DateTime::parse_from_rfc3339(&notified_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(Some(NotifiedMark {
                    key,
                    period_key,
                    notified_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn put_notified_mark(&self, user_id: &str, mark: &NotifiedMark) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notified_marks (user_id, key, period_key, notified_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET
                period_key = excluded.period_key,
                notified_at = excluded.notified_at",
            params![
                user_id,
                mark.key,
                mark.period_key,
                mark.notified_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn last_counters(&self, user_id: &str) -> Result<Option<AggregateCounters>, CacheError> {
        match self.read_remote_snapshot(user_id, COUNTERS_KIND)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn put_counters(&self, user_id: &str, counters: &AggregateCounters) -> Result<(), CacheError> {
        let payload = serde_json::to_string(counters)?;
        self.write_remote_snapshot(user_id, COUNTERS_KIND, &payload)
    }

    fn last_goals(&self, user_id: &str) -> Result<Option<Vec<Goal>>, CacheError> {
        match self.read_remote_snapshot(user_id, GOALS_KIND)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn put_goals(&self, user_id: &str, goals: &[Goal]) -> Result<(), CacheError> {
        let payload = serde_json::to_string(goals)?;
        self.write_remote_snapshot(user_id, GOALS_KIND, &payload)
    }

    fn remove_goal_state(&self, user_id: &str, goal_id: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM goal_baselines WHERE user_id = ?1 AND goal_id = ?2",
            params![user_id, goal_id],
        )?;
        conn.execute(
            "DELETE FROM progress_snapshots WHERE user_id = ?1 AND key = ?2",
            params![user_id, goal_id],
        )?;
        conn.execute(
            "DELETE FROM notified_marks WHERE user_id = ?1 AND key = ?2",
            params![user_id, goal_id],
        )?;
        Ok(())
    }

    fn clear_user(&self, user_id: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        for table in [
            "goal_baselines",
            "progress_snapshots",
            "notified_marks",
            "remote_snapshots",
        ] {
            conn.execute(
                &format!("DELETE FROM {table} WHERE user_id = ?1"),
                params![user_id],
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::*;

    /// Create a temporary on-disk database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the
    /// test. Test temp dirs are cleaned up by the OS.
    pub fn test_db() -> SqliteCache {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test_goals.db");
        std::mem::forget(dir);
        SqliteCache::open_at(path).expect("Failed to open test database")
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;
    use crate::types::{GoalPeriod, GoalType};

    fn sample_goal(id: &str) -> Goal {
        Goal {
            id: id.to_string(),
            title: "Evening chapters".to_string(),
            goal_type: GoalType::Minutes,
            period: GoalPeriod::Day,
            target: 30,
            active: true,
            created_at: Utc::now(),
            server_confirmed: true,
            current: None,
        }
    }

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        assert!(db.baseline("u1", "g1").unwrap().is_none());
        assert!(db.snapshot("u1", "g1").unwrap().is_none());
        assert!(db.notified_mark("u1", "g1").unwrap().is_none());
        assert!(db.last_counters("u1").unwrap().is_none());
        assert!(db.last_goals("u1").unwrap().is_none());
    }

    #[test]
    fn test_baseline_is_write_once() {
        let db = test_db();
        let first = Baseline {
            goal_id: "g1".to_string(),
            daily_minutes_at_creation: 15,
            weekly_books_at_creation: 2,
            monthly_books_at_creation: 4,
        };
        db.put_baseline("u1", &first).unwrap();

        let overwrite = Baseline {
            daily_minutes_at_creation: 99,
            ..first.clone()
        };
        db.put_baseline("u1", &overwrite).unwrap();

        let stored = db.baseline("u1", "g1").unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[test]
    fn test_snapshot_roundtrip_and_update() {
        let db = test_db();
        db.put_snapshot("u1", "g1", 2).unwrap();
        db.put_snapshot("u1", "g1", 5).unwrap();
        assert_eq!(db.snapshot("u1", "g1").unwrap(), Some(5));
    }

    #[test]
    fn test_notified_mark_upserts_period_key() {
        let db = test_db();
        db.put_notified_mark(
            "u1",
            &NotifiedMark {
                key: "builtin:weekly-books".to_string(),
                period_key: Some("2026-W31".to_string()),
                notified_at: Utc::now(),
            },
        )
        .unwrap();
        db.put_notified_mark(
            "u1",
            &NotifiedMark {
                key: "builtin:weekly-books".to_string(),
                period_key: Some("2026-W32".to_string()),
                notified_at: Utc::now(),
            },
        )
        .unwrap();

        let mark = db.notified_mark("u1", "builtin:weekly-books").unwrap().unwrap();
        assert_eq!(mark.period_key.as_deref(), Some("2026-W32"));
    }

    #[test]
    fn test_remote_snapshots_roundtrip() {
        let db = test_db();
        let counters = AggregateCounters {
            daily_minutes: 42,
            weekly_books: 1,
            monthly_books: 3,
        };
        db.put_counters("u1", &counters).unwrap();
        assert_eq!(db.last_counters("u1").unwrap(), Some(counters));

        let goals = vec![sample_goal("g1"), sample_goal("g2")];
        db.put_goals("u1", &goals).unwrap();
        let loaded = db.last_goals("u1").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "g1");
    }

    #[test]
    fn test_remove_goal_state_leaves_other_goals() {
        let db = test_db();
        db.put_snapshot("u1", "g1", 3).unwrap();
        db.put_snapshot("u1", "g2", 7).unwrap();

        db.remove_goal_state("u1", "g1").unwrap();
        assert!(db.snapshot("u1", "g1").unwrap().is_none());
        assert_eq!(db.snapshot("u1", "g2").unwrap(), Some(7));
    }

    #[test]
    fn test_clear_user_scopes_to_user() {
        let db = test_db();
        db.put_snapshot("u1", "g1", 1).unwrap();
        db.put_snapshot("u2", "g1", 2).unwrap();
        db.put_counters("u1", &AggregateCounters::default()).unwrap();

        db.clear_user("u1").unwrap();
        assert!(db.snapshot("u1", "g1").unwrap().is_none());
        assert!(db.last_counters("u1").unwrap().is_none());
        assert_eq!(db.snapshot("u2", "g1").unwrap(), Some(2));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("persist.db");

        {
            let db = SqliteCache::open_at(path.clone()).unwrap();
            db.put_snapshot("u1", "g1", 9).unwrap();
        }

        let db = SqliteCache::open_at(path).unwrap();
        assert_eq!(db.snapshot("u1", "g1").unwrap(), Some(9));
    }
}
