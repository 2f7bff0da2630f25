//! Tagged response cache.
//!
//! `cache_response` serves stored JSON responses for cacheable requests and
//! records successful ones on a miss. Each entry can be indexed under tags so
//! `invalidate_tags` can drop every response that shares one.
//!
//! ```ignore
//! let products = Router::new()
//!     .route("/", get(list_products))
//!     .layer(from_fn_with_state(
//!         ResponseCache::new(store.clone(), CacheOptions::default().with_tags(["products"])),
//!         cache_response,
//!     ));
//!
//! let admin = Router::new()
//!     .route("/", post(create_product))
//!     .layer(from_fn_with_state(TagInvalidator::new(store, ["products"]), invalidate_tags));
//! ```
//!
//! The cache never fails a request: store errors are logged and the request
//! is served uncached.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::error_response;
use crate::stores::{CacheStore, ClearedKeys};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Per-mount cache settings.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub ttl_secs: u64,
    /// Tags every entry written by this mount is indexed under.
    pub tags: Vec<String>,
    pub methods: Vec<Method>,
    pub enabled: bool,
    /// Requests whose path contains any of these are never cached.
    pub skip_paths: Vec<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            tags: Vec::new(),
            methods: vec![Method::GET],
            enabled: true,
            skip_paths: vec!["/health".to_string(), "/ping".to_string()],
        }
    }
}

impl CacheOptions {
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    #[allow(dead_code)]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Stored form of a cached response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub body: Value,
    pub status: u16,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
}

/// Cache key for a request. The query string is part of the key so distinct
/// queries to one path are cached separately.
pub fn cache_key(method: &Method, uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("cache:{}:{}", method, target)
}

/// State for [`cache_response`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    options: Arc<CacheOptions>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, options: CacheOptions) -> Self {
        Self {
            store,
            options: Arc::new(options),
        }
    }

    fn is_cacheable(&self, req: &Request) -> bool {
        let path = req.uri().path();
        self.options.enabled
            && self.options.methods.contains(req.method())
            && !self
                .options
                .skip_paths
                .iter()
                .any(|skip| path.contains(skip.as_str()))
    }

    /// Record a successful JSON response and hand back an equivalent one.
    async fn record(&self, key: &str, response: Response) -> Response {
        if !response.status().is_success() {
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %key, "failed to buffer response for cache: {:?}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(json) => {
                let entry = CachedResponse {
                    body: json,
                    status: parts.status.as_u16(),
                    timestamp: Utc::now().timestamp_millis(),
                };
                if let Err(e) = self.write(key, &entry).await {
                    tracing::error!(key = %key, "cache write failed: {:?}", e);
                }
            }
            Err(_) => tracing::debug!(key = %key, "response is not JSON, not cached"),
        }

        Response::from_parts(parts, Body::from(bytes))
    }

    async fn write(&self, key: &str, entry: &CachedResponse) -> Result<()> {
        let value = serde_json::to_string(entry)?;
        self.store
            .put(key, &value, self.options.ttl_secs, &self.options.tags)
            .await
    }
}

fn with_cache_status(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status));
    response
}

/// Middleware serving and recording cached JSON responses.
pub async fn cache_response(
    State(cache): State<ResponseCache>,
    req: Request,
    next: Next,
) -> Response {
    if !cache.is_cacheable(&req) {
        return next.run(req).await;
    }

    let key = cache_key(req.method(), req.uri());

    match cache.store.get(&key).await {
        Ok(Some(raw)) => match serde_json::from_str::<CachedResponse>(&raw) {
            Ok(entry) => {
                tracing::debug!(key = %key, "cache hit");
                let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
                return with_cache_status((status, Json(entry.body)).into_response(), "HIT");
            }
            Err(e) => tracing::warn!(key = %key, "unreadable cache entry: {}", e),
        },
        Ok(None) => {}
        Err(e) => {
            tracing::error!(key = %key, "cache read failed: {:?}", e);
            return with_cache_status(next.run(req).await, "MISS");
        }
    }

    let response = next.run(req).await;
    let response = cache.record(&key, response).await;

    with_cache_status(response, "MISS")
}

/// Delete every cached response indexed under any of `tags`.
/// Returns the number of cache keys removed.
pub async fn invalidate_tags_now(store: &dyn CacheStore, tags: &[String]) -> Result<usize> {
    let mut removed = 0;
    for tag in tags {
        let count = store.invalidate_tag(tag).await?;
        if count > 0 {
            tracing::info!(tag = %tag, keys = count, "cache invalidated");
        }
        removed += count;
    }
    Ok(removed)
}

/// Delete all cached responses and tag sets. Walks the whole key space.
pub async fn clear_all_cache(store: &dyn CacheStore) -> Result<ClearedKeys> {
    let cleared = store.clear_all().await?;
    tracing::info!(
        entries = cleared.entries,
        tags = cleared.tags,
        "cache cleared"
    );
    Ok(cleared)
}

/// State for [`invalidate_tags`].
#[allow(dead_code)]
#[derive(Clone)]
pub struct TagInvalidator {
    store: Arc<dyn CacheStore>,
    tags: Arc<Vec<String>>,
}

#[allow(dead_code)]
impl TagInvalidator {
    pub fn new<I, S>(store: Arc<dyn CacheStore>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            tags: Arc::new(tags.into_iter().map(Into::into).collect()),
        }
    }
}

/// Middleware invalidating its tags after the inner handler succeeds.
#[allow(dead_code)]
pub async fn invalidate_tags(
    State(invalidator): State<TagInvalidator>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    if response.status().is_success()
        && let Err(e) = invalidate_tags_now(invalidator.store.as_ref(), &invalidator.tags).await
    {
        tracing::error!(tags = ?invalidator.tags, "cache invalidation failed: {:?}", e);
    }

    response
}
