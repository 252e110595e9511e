use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// One cached response. The key is the request bucket (canonical URL plus
/// sorted query string); writing a bucket replaces the record wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Write time, as fractional seconds since the Unix epoch.
    pub stored_at: f64,
    /// The decoded JSON payload exactly as the API returned it.
    pub payload: JsonValue,
}

impl CacheRecord {
    /// Whether this record is still within the freshness window. Expiry is
    /// enforced here at read time; stale rows stay in the database until
    /// overwritten or cleared.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let age = Utc::now().timestamp_millis() as f64 / 1000.0 - self.stored_at;
        age < ttl.as_secs_f64()
    }

    /// The write time as a UTC timestamp.
    pub fn stored_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis((self.stored_at * 1000.0) as i64).unwrap_or_default()
    }
}

/// Durable response cache backed by SQLite. One logical table per namespace:
/// `(key TEXT PRIMARY KEY, value BLOB)`, where the value is a serialized
/// [`CacheRecord`]. A single mutex serializes all access within the process.
#[derive(Debug)]
pub struct CacheStore {
    conn: Mutex<Connection>,
    table: String,
}

impl CacheStore {
    /// Opens (creating if necessary) the cache database at `path`, using
    /// `table` as the namespace.
    pub fn open(path: &Path, table: &str) -> Result<CacheStore> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::Error::CannotCreateClient(format!(
                        "failed to create cache directory: {}",
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS `{}` (key TEXT PRIMARY KEY, value BLOB)",
            table
        ))?;

        Ok(CacheStore {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Looks up the record for `bucket`, fresh or not.
    pub fn get(&self, bucket: &str) -> Result<Option<CacheRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let blob: Option<Vec<u8>> = conn
            .query_row(
                &format!("SELECT value FROM `{}` WHERE key = ?1", self.table),
                params![bucket],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stores `payload` under `bucket`, stamped with the current time. Any
    /// previous record for the bucket is replaced.
    pub fn put(&self, bucket: &str, payload: &JsonValue) -> Result<()> {
        let record = CacheRecord {
            stored_at: Utc::now().timestamp_millis() as f64 / 1000.0,
            payload: payload.clone(),
        };
        let bytes = serde_json::to_vec(&record)?;

        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO `{}` (key, value) VALUES (?1, ?2)",
                self.table
            ),
            params![bucket, bytes],
        )?;

        Ok(())
    }

    /// Drops every record in the namespace.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(&format!("DELETE FROM `{}`", self.table), [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_store(dir: &tempfile::TempDir) -> CacheStore {
        CacheStore::open(&dir.path().join("cache.db"), "cache").unwrap()
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        store.put("k", &json!({"tag": "#ABC"})).unwrap();
        let record = store.get("k").unwrap().unwrap();

        assert_eq!(record.payload, json!({"tag": "#ABC"}));
        assert!(record.is_fresh(Duration::from_secs(60)));
    }

    #[test]
    fn miss_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn put_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        store.put("k", &json!({"a": 1, "b": 2})).unwrap();
        store.put("k", &json!({"a": 3})).unwrap();

        let record = store.get("k").unwrap().unwrap();
        assert_eq!(record.payload, json!({"a": 3}));
    }

    #[test]
    fn expired_records_are_not_fresh() {
        let record = CacheRecord {
            stored_at: Utc::now().timestamp_millis() as f64 / 1000.0 - 10.0,
            payload: json!({}),
        };

        assert!(!record.is_fresh(Duration::from_secs(5)));
        assert!(record.is_fresh(Duration::from_secs(60)));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let store = CacheStore::open(&path, "cache").unwrap();
            store.put("k", &json!("persisted")).unwrap();
        }

        let store = CacheStore::open(&path, "cache").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().payload, json!("persisted"));
    }

    #[test]
    fn clear_empties_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        store.put("k", &json!(1)).unwrap();
        store.clear().unwrap();

        assert!(store.get("k").unwrap().is_none());
    }
}
