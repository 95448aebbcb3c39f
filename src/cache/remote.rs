//! Remote Cache Adapter (C) — narrow wrapper over the external key/value
//! store (`spec.md` §4.3).
//!
//! All operations surface [`ChronoError`] rather than raising ambient
//! exceptions; callers (the multi-tier cache, component D) treat errors as
//! misses on reads and as hard failures on writes.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::{ChronoError, ChronoResult};

/// Point-in-time health of the remote store.
#[derive(Debug, Clone)]
pub struct RemoteInfo {
    /// Raw `PING` round-trip succeeded.
    pub reachable: bool,
    /// Connected-clients field parsed from `INFO`, if available.
    pub connected_clients: Option<u64>,
    /// Used-memory field (bytes) parsed from `INFO`, if available.
    pub used_memory_bytes: Option<u64>,
}

/// Remote key/value store operations (`spec.md` §4.3).
#[async_trait]
pub trait RemoteCachePort: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> ChronoResult<Option<Vec<u8>>>;
    /// Store `value` under `key` with the given TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> ChronoResult<()>;
    /// Delete a single key.
    async fn delete(&self, key: &str) -> ChronoResult<()>;
    /// Whether `key` currently exists.
    async fn exists(&self, key: &str) -> ChronoResult<bool>;
    /// Delete every key matching a glob `pattern`, via cursor-driven `SCAN`
    /// (never `KEYS`, which blocks the store).
    async fn delete_pattern(&self, pattern: &str) -> ChronoResult<u64>;
    /// `PING` the store.
    async fn ping(&self) -> ChronoResult<bool>;
    /// Summary health info.
    async fn info(&self) -> ChronoResult<RemoteInfo>;
}

/// `redis`-backed implementation of [`RemoteCachePort`].
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> ChronoResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ChronoError::unavailable(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ChronoError::unavailable(format!("redis connect failed: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RemoteCachePort for RedisCache {
    async fn get(&self, key: &str) -> ChronoResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| ChronoError::unavailable(format!("redis GET failed: {e}")))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> ChronoResult<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex(key, value, seconds)
            .await
            .map_err(|e| ChronoError::unavailable(format!("redis SETEX failed: {e}")))
    }

    async fn delete(&self, key: &str) -> ChronoResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| ChronoError::unavailable(format!("redis DEL failed: {e}")))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> ChronoResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| ChronoError::unavailable(format!("redis EXISTS failed: {e}")))
    }

    async fn delete_pattern(&self, pattern: &str) -> ChronoResult<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| ChronoError::unavailable(format!("redis SCAN failed: {e}")))?;

            if !keys.is_empty() {
                deleted += keys.len() as u64;
                let _: () = conn
                    .del(keys)
                    .await
                    .map_err(|e| ChronoError::unavailable(format!("redis DEL failed: {e}")))?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    async fn ping(&self) -> ChronoResult<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| true)
            .map_err(|e| ChronoError::unavailable(format!("redis PING failed: {e}")))
    }

    async fn info(&self) -> ChronoResult<RemoteInfo> {
        let mut conn = self.conn.clone();
        let raw: String = redis::cmd("INFO")
            .query_async(&mut conn)
            .await
            .map_err(|e| ChronoError::unavailable(format!("redis INFO failed: {e}")))?;

        let connected_clients = parse_info_field(&raw, "connected_clients");
        let used_memory_bytes = parse_info_field(&raw, "used_memory");

        Ok(RemoteInfo {
            reachable: true,
            connected_clients,
            used_memory_bytes,
        })
    }
}

fn parse_info_field(raw: &str, field: &str) -> Option<u64> {
    raw.lines()
        .find_map(|line| line.strip_prefix(&format!("{field}:")))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_fields() {
        let raw = "# Clients\r\nconnected_clients:7\r\nused_memory:1048576\r\n";
        assert_eq!(parse_info_field(raw, "connected_clients"), Some(7));
        assert_eq!(parse_info_field(raw, "used_memory"), Some(1_048_576));
        assert_eq!(parse_info_field(raw, "missing_field"), None);
    }
}
