//! In-process store with per-key expiry.
//!
//! Implements every store trait for single-instance development runs and
//! tests. Time comes from `tokio::time`, so tests can drive expiry with a
//! paused clock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::cache::{CACHE_PREFIX, CacheStore, ClearedKeys, TAG_PREFIX, tag_key};
use super::connection::StoreConnection;
use super::otp::{ConsumeOutcome, OtpStore, otp_key, verified_key};
use super::rate_limit::{RateLimitResult, RateLimiter};

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Set(HashSet<String>),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Value, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Writes between sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 1024;

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_string(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
            return None;
        }
        match &entry.value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Drop expired entries every `SWEEP_INTERVAL` writes. Keys nobody reads
    /// again (per-client counters, one-off cache keys) would otherwise pile up.
    /// Must not be called while holding a map guard.
    fn record_write(&self) {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.sweep();
        }
    }

    fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            tracing::debug!(swept, "expired entries removed");
        }
    }

    fn set_string(&self, key: &str, value: &str, ttl_secs: u64) {
        self.record_write();
        self.entries.insert(
            key.to_string(),
            Entry::new(Value::String(value.to_string()), ttl_secs),
        );
    }

    fn remove_matching(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Raw string value at `key`, if live.
    #[cfg(test)]
    pub fn value(&self, key: &str) -> Option<String> {
        self.get_string(key)
    }

    /// Remaining lifetime of `key`, if live.
    #[cfg(test)]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        (!entry.is_expired()).then(|| entry.expires_at - Instant::now())
    }

    /// Members of the set at `key`, if live.
    #[cfg(test)]
    pub fn members(&self, key: &str) -> Vec<String> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                Value::Set(members) => members.iter().cloned().collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryStore {
    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }

    async fn close(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn store_code(&self, email: &str, code: &str, ttl_secs: u64) -> Result<()> {
        self.set_string(&otp_key(email), code, ttl_secs);
        Ok(())
    }

    async fn delete_code(&self, email: &str) -> Result<()> {
        self.entries.remove(&otp_key(email));
        Ok(())
    }

    async fn consume_code(
        &self,
        email: &str,
        code: &str,
        verified_ttl_secs: u64,
    ) -> Result<ConsumeOutcome> {
        let key = otp_key(email);

        // remove_if holds the shard lock, so only one caller can consume
        let removed = self.entries.remove_if(&key, |_, entry| {
            !entry.is_expired() && matches!(&entry.value, Value::String(s) if s == code)
        });
        if removed.is_some() {
            self.set_string(&verified_key(email), "true", verified_ttl_secs);
            return Ok(ConsumeOutcome::Consumed);
        }

        Ok(match self.get_string(&key) {
            Some(_) => ConsumeOutcome::Mismatch,
            None => ConsumeOutcome::Missing,
        })
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_string(key))
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64, tags: &[String]) -> Result<()> {
        self.set_string(key, value, ttl_secs);

        for tag in tags {
            let mut entry = self
                .entries
                .entry(tag_key(tag))
                .or_insert_with(|| Entry::new(Value::Set(HashSet::new()), ttl_secs));
            if entry.is_expired() || !matches!(entry.value, Value::Set(_)) {
                entry.value = Value::Set(HashSet::new());
            }
            if let Value::Set(members) = &mut entry.value {
                members.insert(key.to_string());
            }
            entry.expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        }

        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        let Some((_, entry)) = self.entries.remove(&tag_key(tag)) else {
            return Ok(0);
        };
        if entry.is_expired() {
            return Ok(0);
        }
        let members = match entry.value {
            Value::Set(members) => members,
            _ => return Ok(0),
        };

        for key in &members {
            self.entries.remove(key);
        }

        Ok(members.len())
    }

    async fn clear_all(&self) -> Result<ClearedKeys> {
        Ok(ClearedKeys {
            entries: self.remove_matching(CACHE_PREFIX),
            tags: self.remove_matching(TAG_PREFIX),
        })
    }
}

#[async_trait]
impl RateLimiter for MemoryStore {
    async fn check_simple(&self, key: &str, limit: i64, ttl_secs: u64) -> Result<RateLimitResult> {
        self.record_write();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Counter(0), ttl_secs));
        if entry.is_expired() {
            *entry = Entry::new(Value::Counter(0), ttl_secs);
        }

        let count = match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                *count
            }
            other => {
                *other = Value::Counter(1);
                1
            }
        };

        Ok(RateLimitResult::from_count(count, limit))
    }

    async fn current(&self, key: &str) -> Result<i64> {
        Ok(match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => match entry.value {
                Value::Counter(count) => count,
                _ => 0,
            },
            _ => 0,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn string_values_expire() {
        let store = MemoryStore::new();
        store.store_code("a@example.com", "ABC123", 10).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.value("otp:a@example.com").as_deref(), Some("ABC123"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.value("otp:a@example.com"), None);
    }

    #[tokio::test]
    async fn consume_reports_mismatch_and_keeps_code() {
        let store = MemoryStore::new();
        store.store_code("a@example.com", "ABC123", 600).await.unwrap();

        let outcome = store.consume_code("a@example.com", "ZZZ999", 1800).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::Mismatch);
        assert_eq!(store.value("otp:a@example.com").as_deref(), Some("ABC123"));
        assert_eq!(store.value("otp:verified:a@example.com"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn consume_deletes_code_and_flags_email() {
        let store = MemoryStore::new();
        store.store_code("a@example.com", "ABC123", 600).await.unwrap();

        let outcome = store.consume_code("a@example.com", "ABC123", 1800).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::Consumed);
        assert_eq!(store.value("otp:a@example.com"), None);
        assert_eq!(
            store.value("otp:verified:a@example.com").as_deref(),
            Some("true")
        );
        assert_eq!(
            store.ttl("otp:verified:a@example.com"),
            Some(Duration::from_secs(1800))
        );
    }

    #[tokio::test]
    async fn consume_missing_code() {
        let store = MemoryStore::new();

        let outcome = store.consume_code("a@example.com", "ABC123", 1800).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn tag_ttl_is_refreshed_on_each_put() {
        let store = MemoryStore::new();
        let tags = vec!["products".to_string()];

        store.put("cache:GET:/a", "{}", 100, &tags).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        store.put("cache:GET:/b", "{}", 30, &tags).await.unwrap();

        assert_eq!(store.ttl("tag:products"), Some(Duration::from_secs(30)));
        let mut members = store.members("tag:products");
        members.sort();
        assert_eq!(members, vec!["cache:GET:/a", "cache:GET:/b"]);
    }

    #[tokio::test]
    async fn invalidate_tag_removes_entries_and_set() {
        let store = MemoryStore::new();
        let tags = vec!["products".to_string()];
        store.put("cache:GET:/a", "{}", 100, &tags).await.unwrap();
        store.put("cache:GET:/b", "{}", 100, &[]).await.unwrap();

        let removed = store.invalidate_tag("products").await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(CacheStore::get(&store, "cache:GET:/a").await.unwrap(), None);
        assert!(CacheStore::get(&store, "cache:GET:/b").await.unwrap().is_some());
        assert!(store.members("tag:products").is_empty());
        assert_eq!(store.invalidate_tag("products").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn entries_written_after_invalidation_stay_tagged() {
        let store = MemoryStore::new();
        let tags = vec!["products".to_string()];
        store.put("cache:GET:/a", "{}", 100, &tags).await.unwrap();
        store.invalidate_tag("products").await.unwrap();

        store.put("cache:GET:/b", "{}", 100, &tags).await.unwrap();
        assert_eq!(store.members("tag:products"), vec!["cache:GET:/b".to_string()]);

        assert_eq!(store.invalidate_tag("products").await.unwrap(), 1);
        assert_eq!(CacheStore::get(&store, "cache:GET:/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_all_only_touches_cache_namespaces() {
        let store = MemoryStore::new();
        let tags = vec!["products".to_string()];
        store.put("cache:GET:/a", "{}", 100, &tags).await.unwrap();
        store.put("cache:GET:/b", "{}", 100, &tags).await.unwrap();
        store.store_code("a@example.com", "ABC123", 600).await.unwrap();

        let cleared = store.clear_all().await.unwrap();

        assert_eq!(cleared, ClearedKeys { entries: 2, tags: 1 });
        assert!(store.value("otp:a@example.com").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn counters_reset_after_window() {
        let store = MemoryStore::new();

        assert!(store.check_simple("k", 2, 60).await.unwrap().is_allowed());
        assert!(store.check_simple("k", 2, 60).await.unwrap().is_allowed());
        assert_eq!(
            store.check_simple("k", 2, 60).await.unwrap(),
            RateLimitResult::Exceeded(3)
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(
            store.check_simple("k", 2, 60).await.unwrap(),
            RateLimitResult::Allowed(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn current_reads_counter_without_incrementing() {
        let store = MemoryStore::new();
        assert_eq!(store.current("k").await.unwrap(), 0);

        store.check_simple("k", 5, 60).await.unwrap();
        store.check_simple("k", 5, 60).await.unwrap();
        assert_eq!(store.current("k").await.unwrap(), 2);
        assert_eq!(store.current("k").await.unwrap(), 2);

        store.reset("k").await.unwrap();
        assert_eq!(store.current("k").await.unwrap(), 0);

        store.check_simple("k", 5, 60).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.current("k").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_entries() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.check_simple(&format!("ratelimit:ip:10.0.0.{}", i), 5, 60).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        for i in 0..SWEEP_INTERVAL {
            store.check_simple("ratelimit:ip:live", i as i64 + 1, 600).await.unwrap();
        }

        assert_eq!(store.entries.len(), 1);
        assert_eq!(store.current("ratelimit:ip:live").await.unwrap(), SWEEP_INTERVAL as i64);
    }
}
