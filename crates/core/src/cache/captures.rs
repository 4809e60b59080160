//! Result record operations.
//!
//! A record is a hash map per normalized URL key (capture timestamp ->
//! encoded simhash) with an optional expiry covering the whole record.
//! Expired records are invisible to reads until
//! [`CacheDb::purge_expired_captures`] removes them.

use std::collections::HashMap;

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio_rusqlite::{params, rusqlite};

const LIVE_SET: &str = "EXISTS(
    SELECT 1 FROM capture_sets s
    WHERE s.url_key = ?1 AND (s.expires_at IS NULL OR s.expires_at > ?2)
)";

/// Fixed-width RFC 3339 so stored instants compare correctly as text.
fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl CacheDb {
    /// Set fields of the record for `url_key`, creating it if needed.
    ///
    /// Existing fields with the same timestamp are overwritten. A record that
    /// has already expired is discarded first, so stale fields never mix with
    /// fresh ones. Returns the number of fields written.
    pub async fn put_captures(&self, url_key: &str, captures: &HashMap<String, String>) -> Result<usize, Error> {
        let url_key = url_key.to_string();
        let rows: Vec<(String, String)> = captures.iter().map(|(t, s)| (t.clone(), s.clone())).collect();
        let now = stamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM capture_sets
                     WHERE url_key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
                    params![url_key, now],
                )?;
                tx.execute(
                    "INSERT INTO capture_sets (url_key, created_at, expires_at) VALUES (?1, ?2, NULL)
                     ON CONFLICT(url_key) DO NOTHING",
                    params![url_key, now],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO captures (url_key, timestamp, simhash) VALUES (?1, ?2, ?3)
                         ON CONFLICT(url_key, timestamp) DO UPDATE SET simhash = excluded.simhash",
                    )?;
                    for (timestamp, simhash) in &rows {
                        stmt.execute(params![url_key, timestamp, simhash])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Set the record for `url_key` to expire `ttl_seconds` from now.
    ///
    /// Returns false if no live record exists for the key.
    pub async fn expire_captures(&self, url_key: &str, ttl_seconds: i64) -> Result<bool, Error> {
        let url_key = url_key.to_string();
        let now = stamp(Utc::now());
        let expires_at = stamp(Utc::now() + Duration::seconds(ttl_seconds));

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let updated = conn.execute(
                    "UPDATE capture_sets SET expires_at = ?3
                     WHERE url_key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![url_key, now, expires_at],
                )?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Get one field of a live record.
    pub async fn get_capture(&self, url_key: &str, timestamp: &str) -> Result<Option<String>, Error> {
        let url_key = url_key.to_string();
        let timestamp = timestamp.to_string();
        let now = stamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let sql = format!("SELECT simhash FROM captures WHERE url_key = ?1 AND timestamp = ?3 AND {LIVE_SET}");
                let result = conn.query_row(&sql, params![url_key, now, timestamp], |row| row.get(0));

                match result {
                    Ok(simhash) => Ok(Some(simhash)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All field names (timestamps) of a live record, in no particular order.
    pub async fn capture_timestamps(&self, url_key: &str) -> Result<Vec<String>, Error> {
        let url_key = url_key.to_string();
        let now = stamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let sql = format!("SELECT timestamp FROM captures WHERE url_key = ?1 AND {LIVE_SET}");
                let mut stmt = conn.prepare(&sql)?;
                let timestamps = stmt
                    .query_map(params![url_key, now], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(timestamps)
            })
            .await
            .map_err(Error::from)
    }

    /// Get several fields of a live record, in the order requested.
    ///
    /// Missing fields come back as `None`.
    pub async fn get_captures(&self, url_key: &str, timestamps: &[String]) -> Result<Vec<Option<String>>, Error> {
        let url_key = url_key.to_string();
        let timestamps = timestamps.to_vec();
        let now = stamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<Vec<Option<String>>, Error> {
                let sql = format!("SELECT simhash FROM captures WHERE url_key = ?1 AND timestamp = ?3 AND {LIVE_SET}");
                let mut stmt = conn.prepare(&sql)?;
                let mut values = Vec::with_capacity(timestamps.len());
                for timestamp in &timestamps {
                    let value = match stmt.query_row(params![url_key, now, timestamp], |row| row.get(0)) {
                        Ok(simhash) => Some(simhash),
                        Err(rusqlite::Error::QueryReturnedNoRows) => None,
                        Err(e) => return Err(e.into()),
                    };
                    values.push(value);
                }
                Ok(values)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired records and their fields.
    ///
    /// Returns the number of records removed.
    pub async fn purge_expired_captures(&self) -> Result<u64, Error> {
        let now = stamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM capture_sets WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
