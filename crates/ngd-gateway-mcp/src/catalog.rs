// crates/ngd-gateway-mcp/src/catalog.rs
// ============================================================================
// Module: Catalog Cache
// Description: TTL cache of collection and queryable metadata.
// Purpose: Amortize slow upstream metadata fetches across callers.
// Dependencies: tokio, serde, serde_json
// ============================================================================

//! ## Overview
//! [`CatalogCache`] memoizes the collection list, per-collection queryables,
//! and the endpoint paths of the upstream OpenAPI document, all fetched
//! through [`UpstreamApi`]. Each key owns an async mutex
//! held across its fetch, so concurrent callers for one key wait on a single
//! upstream call and share the resulting [`Arc`].
//!
//! ## Invariants
//! - An entry is served only while `now - fetched_at < ttl`.
//! - Failed fetches are surfaced and never written.
//! - A cancelled fetch releases the key without writing anything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use ngd_gateway_config::CatalogConfig;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::params::EndpointKind;
use crate::params::UpstreamParams;
use crate::params::validate_params;
use crate::upstream::UpstreamApi;
use crate::upstream::UpstreamError;

// ============================================================================
// SECTION: Catalog Types
// ============================================================================

/// Cache key for catalog entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogKey {
    /// The collection list.
    Collections,
    /// Queryables for one collection.
    Queryables(String),
    /// The upstream OpenAPI description.
    ApiDescription,
}

/// Identifier and title of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// Collection identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
}

/// Parsed collection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCatalog {
    /// All collections in upstream order.
    collections: Vec<CollectionSummary>,
    /// Identifier set for membership checks.
    ids: BTreeSet<String>,
}

impl CollectionCatalog {
    /// Parses an upstream `collections` payload.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Upstream`] when the payload has no
    /// `collections` array.
    pub fn from_payload(payload: &Value) -> Result<Self, UpstreamError> {
        let entries = payload.get("collections").and_then(Value::as_array).ok_or_else(|| {
            UpstreamError::Upstream("collections payload is missing the collections array".to_string())
        })?;
        let collections: Vec<CollectionSummary> = entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id").and_then(Value::as_str)?;
                let title = entry.get("title").and_then(Value::as_str).unwrap_or(id);
                Some(CollectionSummary {
                    id: id.to_string(),
                    title: title.to_string(),
                })
            })
            .collect();
        let ids = collections.iter().map(|summary| summary.id.clone()).collect();
        Ok(Self {
            collections,
            ids,
        })
    }

    /// Returns true when the collection id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns all collection ids in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    /// Returns all collections in upstream order.
    #[must_use]
    pub fn collections(&self) -> &[CollectionSummary] {
        &self.collections
    }

    /// Returns the collections with version suffixes collapsed.
    ///
    /// Ids shaped `<base>-<n>` keep only the highest `n` per base. Other ids
    /// are kept as-is. Output is sorted by id.
    #[must_use]
    pub fn latest_versions(&self) -> Vec<CollectionSummary> {
        let mut latest: BTreeMap<&str, (u64, &CollectionSummary)> = BTreeMap::new();
        for summary in &self.collections {
            let (base, version) = split_version(&summary.id);
            match latest.get(base) {
                Some((current, _)) if *current >= version => {}
                _ => {
                    latest.insert(base, (version, summary));
                }
            }
        }
        let mut summaries: Vec<CollectionSummary> =
            latest.into_values().map(|(_, summary)| summary.clone()).collect();
        summaries.sort_by(|left, right| left.id.cmp(&right.id));
        summaries
    }
}

/// Splits `<base>-<n>` into its base and version; other ids are version 0.
fn split_version(id: &str) -> (&str, u64) {
    id.rsplit_once('-')
        .filter(|(_, suffix)| !suffix.is_empty() && suffix.chars().all(|ch| ch.is_ascii_digit()))
        .and_then(|(base, suffix)| suffix.parse::<u64>().ok().map(|version| (base, version)))
        .unwrap_or((id, 0))
}

/// Endpoint paths advertised by the upstream OpenAPI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDescription {
    /// Path templates in sorted order.
    paths: Vec<String>,
}

impl ApiDescription {
    /// Parses an upstream OpenAPI document.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Upstream`] when the document has no `paths`
    /// object.
    pub fn from_payload(payload: &Value) -> Result<Self, UpstreamError> {
        let paths = payload.get("paths").and_then(Value::as_object).ok_or_else(|| {
            UpstreamError::Upstream("openapi document is missing the paths object".to_string())
        })?;
        let mut paths: Vec<String> = paths.keys().cloned().collect();
        paths.sort();
        Ok(Self {
            paths,
        })
    }

    /// Returns the advertised path templates.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// Queryable properties for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryableSet {
    /// Collection identifier.
    pub collection_id: String,
    /// Sanitized upstream queryables document.
    pub payload: Value,
}

impl QueryableSet {
    /// Returns the queryable property names in sorted order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.payload
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                let mut names: Vec<String> = properties.keys().cloned().collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Memoized value with its fetch time.
struct CacheEntry<T> {
    /// Shared payload.
    value: Arc<T>,
    /// Fetch completion time.
    fetched_at: Instant,
}

/// Per-key slot guarded by an async mutex held across fetches.
type Slot<T> = Arc<AsyncMutex<Option<CacheEntry<T>>>>;

/// TTL cache of catalog metadata.
pub struct CatalogCache {
    /// Upstream used on miss or expiry.
    upstream: Arc<dyn UpstreamApi>,
    /// Entry lifetime.
    ttl: Duration,
    /// Collection list slot.
    collections: Slot<CollectionCatalog>,
    /// Queryables slots keyed by collection id.
    queryables: Mutex<HashMap<String, Slot<QueryableSet>>>,
    /// OpenAPI description slot.
    api_description: Slot<ApiDescription>,
}

impl CatalogCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamApi>, ttl: Duration) -> Self {
        Self {
            upstream,
            ttl,
            collections: Arc::new(AsyncMutex::new(None)),
            queryables: Mutex::new(HashMap::new()),
            api_description: Arc::new(AsyncMutex::new(None)),
        }
    }

    /// Creates an empty cache from configuration.
    #[must_use]
    pub fn from_config(upstream: Arc<dyn UpstreamApi>, config: &CatalogConfig) -> Self {
        Self::new(upstream, Duration::from_millis(config.ttl_ms))
    }

    /// Returns the configured entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the collection catalog, fetching on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns the upstream failure when a fetch is required and fails.
    pub async fn collections(&self) -> Result<Arc<CollectionCatalog>, UpstreamError> {
        let upstream = Arc::clone(&self.upstream);
        get_or_fetch(&self.collections, self.ttl, || async move {
            let payload = upstream.invoke(EndpointKind::Collections, &UpstreamParams::new()).await?;
            CollectionCatalog::from_payload(&payload)
        })
        .await
    }

    /// Returns queryables for a collection, fetching on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidInput`] for malformed ids, or the
    /// upstream failure when a fetch is required and fails.
    pub async fn queryables(&self, collection_id: &str) -> Result<Arc<QueryableSet>, UpstreamError> {
        let params = UpstreamParams::new().with_segment(collection_id);
        validate_params(EndpointKind::CollectionQueryables, &params)?;
        let slot = {
            let mut slots = self.queryables.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(collection_id.to_string()).or_default())
        };
        let upstream = Arc::clone(&self.upstream);
        let collection_id = collection_id.to_string();
        get_or_fetch(&slot, self.ttl, || async move {
            let payload = upstream.invoke(EndpointKind::CollectionQueryables, &params).await?;
            Ok(QueryableSet {
                collection_id,
                payload,
            })
        })
        .await
    }

    /// Returns the upstream API description, fetching on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns the upstream failure when a fetch is required and fails, or
    /// when the document carries no `paths` object.
    pub async fn api_description(&self) -> Result<Arc<ApiDescription>, UpstreamError> {
        let upstream = Arc::clone(&self.upstream);
        get_or_fetch(&self.api_description, self.ttl, || async move {
            let payload = upstream.invoke(EndpointKind::OpenApiSpec, &UpstreamParams::new()).await?;
            ApiDescription::from_payload(&payload)
        })
        .await
    }

    /// Returns true when a fresh entry exists for the key.
    pub async fn is_fresh(&self, key: &CatalogKey) -> bool {
        match key {
            CatalogKey::Collections => is_fresh(&self.collections, self.ttl).await,
            CatalogKey::Queryables(collection_id) => {
                let slot = self
                    .queryables
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(collection_id)
                    .cloned();
                match slot {
                    Some(slot) => is_fresh(&slot, self.ttl).await,
                    None => false,
                }
            }
            CatalogKey::ApiDescription => is_fresh(&self.api_description, self.ttl).await,
        }
    }

    /// Drops the entry for one key.
    pub async fn invalidate_key(&self, key: &CatalogKey) {
        match key {
            CatalogKey::Collections => {
                self.collections.lock().await.take();
            }
            CatalogKey::Queryables(collection_id) => {
                self.queryables.lock().unwrap_or_else(PoisonError::into_inner).remove(collection_id);
            }
            CatalogKey::ApiDescription => {
                self.api_description.lock().await.take();
            }
        }
    }

    /// Drops every entry.
    pub async fn invalidate(&self) {
        self.collections.lock().await.take();
        self.queryables.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.api_description.lock().await.take();
    }
}

/// Serves a fresh entry or runs `fetch` while holding the slot lock.
async fn get_or_fetch<T, F, Fut>(
    slot: &Slot<T>,
    ttl: Duration,
    fetch: F,
) -> Result<Arc<T>, UpstreamError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut guard = slot.lock().await;
    if let Some(entry) = guard.as_ref()
        && entry.fetched_at.elapsed() < ttl
    {
        return Ok(Arc::clone(&entry.value));
    }
    let value = Arc::new(fetch().await?);
    *guard = Some(CacheEntry {
        value: Arc::clone(&value),
        fetched_at: Instant::now(),
    });
    Ok(value)
}

/// Returns true when the slot holds an unexpired entry.
async fn is_fresh<T>(slot: &Slot<T>, ttl: Duration) -> bool {
    slot.lock().await.as_ref().is_some_and(|entry| entry.fetched_at.elapsed() < ttl)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
