//! Durable storage shared by the foreground and background contexts.
//!
//! Background execution runs without the UI tree and must not assume shared
//! in-memory state, so everything both sides need — the auth token, the
//! locale for `Accept-Language`, and samples spilled from an interrupted
//! session — goes through this SQLite store.

use crate::error::SyncError;
use crate::types::LocationSample;
use log::{info, warn};
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};
use std::sync::{Mutex, MutexGuard};

/// Primary ("secure") auth token key.
pub const AUTH_TOKEN_KEY: &str = "auth_token_secure";
/// Legacy token key, still read for backward compatibility.
pub const LEGACY_AUTH_TOKEN_KEY: &str = "auth_token";
/// Current locale, sent as `Accept-Language` on every upload.
pub const LOCALE_KEY: &str = "locale";

const DEFAULT_LOCALE: &str = "en";

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        ),
        M::up(
            "CREATE TABLE spilled_batches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                activity_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                samples BLOB NOT NULL
            );
            CREATE INDEX idx_spilled_batches_activity
            ON spilled_batches(activity_id);",
        ),
    ])
}

/// SQLite-backed key-value and spill store.
///
/// Safe to share behind an `Arc` between the sync path and the host app;
/// the connection is serialized through a mutex.
pub struct SyncStore {
    db: Mutex<Connection>,
}

impl SyncStore {
    /// Open (and migrate) the store at `path`.
    pub fn open(path: &str) -> Result<Self, SyncError> {
        let conn = Connection::open(path).map_err(|e| SyncError::Store(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// In-memory store, used by tests and previews.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory().map_err(|e| SyncError::Store(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, SyncError> {
        migrations()
            .to_latest(&mut conn)
            .map_err(|e| SyncError::Store(format!("migration failed: {}", e)))?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Key/Value
    // ========================================================================

    pub fn get_value(&self, key: &str) -> Option<String> {
        self.db()
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .ok()
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.db()
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(())
    }

    pub fn delete_value(&self, key: &str) -> Result<(), SyncError> {
        self.db()
            .execute("DELETE FROM kv WHERE key = ?", params![key])
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(())
    }

    // ========================================================================
    // Auth Token
    // ========================================================================

    /// Resolve the auth token: primary secure key first, legacy key as
    /// fallback for installs that predate the secure location.
    pub fn auth_token(&self) -> Option<String> {
        self.get_value(AUTH_TOKEN_KEY)
            .or_else(|| self.get_value(LEGACY_AUTH_TOKEN_KEY))
    }

    /// Store the token under the primary key.
    pub fn set_auth_token(&self, token: &str) -> Result<(), SyncError> {
        self.set_value(AUTH_TOKEN_KEY, token)
    }

    /// Remove the token from both locations (logout / forced re-auth).
    pub fn clear_auth_token(&self) -> Result<(), SyncError> {
        self.delete_value(AUTH_TOKEN_KEY)?;
        self.delete_value(LEGACY_AUTH_TOKEN_KEY)
    }

    // ========================================================================
    // Locale
    // ========================================================================

    /// Language tag for the `Accept-Language` header; defaults to "en".
    pub fn language(&self) -> String {
        self.get_value(LOCALE_KEY)
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    pub fn set_language(&self, language: &str) -> Result<(), SyncError> {
        self.set_value(LOCALE_KEY, language)
    }

    // ========================================================================
    // Sample Spill
    // ========================================================================

    /// Persist samples that could not be uploaded before the session ended,
    /// so they survive an app restart.
    pub fn spill_samples(
        &self,
        activity_id: &str,
        samples: &[LocationSample],
    ) -> Result<(), SyncError> {
        if samples.is_empty() {
            return Ok(());
        }

        let blob =
            rmp_serde::to_vec(samples).map_err(|e| SyncError::Store(format!("encode: {}", e)))?;
        let created_at = chrono::Utc::now().to_rfc3339();

        self.db()
            .execute(
                "INSERT INTO spilled_batches (activity_id, created_at, samples) VALUES (?, ?, ?)",
                params![activity_id, created_at, blob],
            )
            .map_err(|e| SyncError::Store(e.to_string()))?;

        info!(
            "[store] spilled {} samples for activity {}",
            samples.len(),
            activity_id
        );
        Ok(())
    }

    /// Load and remove every spilled sample for an activity, oldest spill
    /// first. Undecodable blobs are dropped with a warning rather than
    /// wedging the whole reload.
    pub fn take_spilled_samples(&self, activity_id: &str) -> Result<Vec<LocationSample>, SyncError> {
        let db = self.db();

        let mut stmt = db
            .prepare("SELECT samples FROM spilled_batches WHERE activity_id = ? ORDER BY id")
            .map_err(|e| SyncError::Store(e.to_string()))?;

        let blobs: Vec<Vec<u8>> = stmt
            .query_map(params![activity_id], |row| row.get(0))
            .map_err(|e| SyncError::Store(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        let mut samples = Vec::new();
        for blob in blobs {
            match rmp_serde::from_slice::<Vec<LocationSample>>(&blob) {
                Ok(batch) => samples.extend(batch),
                Err(e) => warn!(
                    "[store] dropping undecodable spill for {}: {}",
                    activity_id, e
                ),
            }
        }

        db.execute(
            "DELETE FROM spilled_batches WHERE activity_id = ?",
            params![activity_id],
        )
        .map_err(|e| SyncError::Store(e.to_string()))?;

        Ok(samples)
    }

    /// Number of spilled batches waiting for an activity.
    pub fn spilled_batch_count(&self, activity_id: &str) -> u32 {
        self.db()
            .query_row(
                "SELECT COUNT(*) FROM spilled_batches WHERE activity_id = ?",
                params![activity_id],
                |row| row.get(0),
            )
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64) -> LocationSample {
        LocationSample {
            lat: 59.3,
            lng: 18.1,
            elevation: Some(25.0),
            timestamp: ts,
            speed: Some(2.5),
            heart_rate: Some(150),
            cadence: Some(80),
        }
    }

    #[test]
    fn test_token_prefers_primary_key() {
        let store = SyncStore::open_in_memory().unwrap();
        assert!(store.auth_token().is_none());

        store.set_value(LEGACY_AUTH_TOKEN_KEY, "legacy-token").unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("legacy-token"));

        store.set_auth_token("secure-token").unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("secure-token"));

        store.clear_auth_token().unwrap();
        assert!(store.auth_token().is_none());
    }

    #[test]
    fn test_language_defaults_to_en() {
        let store = SyncStore::open_in_memory().unwrap();
        assert_eq!(store.language(), "en");

        store.set_language("de-DE").unwrap();
        assert_eq!(store.language(), "de-DE");
    }

    #[test]
    fn test_spill_round_trip_preserves_order() {
        let store = SyncStore::open_in_memory().unwrap();

        store
            .spill_samples("act-1", &[sample(1), sample(2)])
            .unwrap();
        store.spill_samples("act-1", &[sample(3)]).unwrap();
        store.spill_samples("act-2", &[sample(99)]).unwrap();
        assert_eq!(store.spilled_batch_count("act-1"), 2);

        let reloaded = store.take_spilled_samples("act-1").unwrap();
        let timestamps: Vec<i64> = reloaded.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1, 2, 3]);
        assert_eq!(reloaded[0], sample(1));

        // taking consumes; the other activity's spill is untouched
        assert!(store.take_spilled_samples("act-1").unwrap().is_empty());
        assert_eq!(store.spilled_batch_count("act-2"), 1);
    }

    #[test]
    fn test_empty_spill_is_a_noop() {
        let store = SyncStore::open_in_memory().unwrap();
        store.spill_samples("act-1", &[]).unwrap();
        assert_eq!(store.spilled_batch_count("act-1"), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.db");
        let path = path.to_str().unwrap();

        {
            let store = SyncStore::open(path).unwrap();
            store.set_auth_token("tok").unwrap();
            store.spill_samples("act-1", &[sample(5)]).unwrap();
        }

        let store = SyncStore::open(path).unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("tok"));
        assert_eq!(store.take_spilled_samples("act-1").unwrap().len(), 1);
    }
}
