//! Response cache entries and their tag index in Redis.
//!
//! Entries live under `cache:*`, each tag under `tag:*` as a set of entry keys.
//! There is no index from an entry back to its tags; invalidation is by tag.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use super::RedisConnection;

pub const CACHE_PREFIX: &str = "cache:";
pub const TAG_PREFIX: &str = "tag:";

const CLEAR_BATCH: usize = 500;

// KEYS[1] = tag key. Reads and drops the tag set in one step so a concurrent
// put either lands before (and is invalidated) or after (and starts a new set).
const INVALIDATE_SCRIPT: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
if #members == 0 then
    return 0
end
redis.call('DEL', KEYS[1])
for i = 1, #members, 500 do
    redis.call('DEL', unpack(members, i, math.min(i + 499, #members)))
end
return #members
";

pub fn tag_key(tag: &str) -> String {
    format!("{}{}", TAG_PREFIX, tag)
}

/// Number of keys removed by a full clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedKeys {
    pub entries: usize,
    pub tags: usize,
}

/// Store for cached responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a serialized entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write an entry with TTL and add its key to every tag set, resetting
    /// each tag set's TTL to `ttl_secs`.
    async fn put(&self, key: &str, value: &str, ttl_secs: u64, tags: &[String]) -> Result<()>;

    /// Delete every entry referenced by the tag, then the tag set itself.
    /// Returns the number of entry keys referenced.
    async fn invalidate_tag(&self, tag: &str) -> Result<usize>;

    /// Delete all entries and tag sets.
    async fn clear_all(&self) -> Result<ClearedKeys>;
}

/// Redis implementation of CacheStore.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: Arc<RedisConnection>,
}

impl RedisCacheStore {
    pub fn new(conn: Arc<RedisConnection>) -> Self {
        Self { conn }
    }

    /// Walk the key space with SCAN and delete matches in batches.
    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.get().await?;
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(CLEAR_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: usize = conn.del(&keys).await?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(deleted)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.get().await?;

        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64, tags: &[String]) -> Result<()> {
        let mut conn = self.conn.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic().set_ex(key, value, ttl_secs).ignore();
        for tag in tags {
            let tag_key = tag_key(tag);
            pipe.sadd(&tag_key, key)
                .ignore()
                .expire(&tag_key, ttl_secs as i64)
                .ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        let mut conn = self.conn.get().await?;

        let removed: usize = redis::Script::new(INVALIDATE_SCRIPT)
            .key(tag_key(tag))
            .invoke_async(&mut conn)
            .await?;

        Ok(removed)
    }

    async fn clear_all(&self) -> Result<ClearedKeys> {
        let entries = self.delete_matching(&format!("{}*", CACHE_PREFIX)).await?;
        let tags = self.delete_matching(&format!("{}*", TAG_PREFIX)).await?;

        Ok(ClearedKeys { entries, tags })
    }
}
