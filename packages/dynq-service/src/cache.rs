use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	time::Duration,
};

use serde_json::json;
use tokio::time::Instant;

use crate::{BoxFuture, CacheService, Error, NormalizedItem, Result};

/// A cached result set. Shared so hits do not copy the items under the lock.
pub type CachedItems = Arc<Vec<NormalizedItem>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
	pub hits: u64,
	pub misses: u64,
	pub evictions: u64,
	pub entries: usize,
	pub capacity: usize,
}

struct CacheEntry {
	value: CachedItems,
	expires_at: Instant,
	tags: Vec<String>,
}

struct CacheState {
	entries: HashMap<String, CacheEntry>,
	order: VecDeque<String>,
	tags: HashMap<String, HashSet<String>>,
	capacity: usize,
	hits: u64,
	misses: u64,
	evictions: u64,
}
impl CacheState {
	fn get(&mut self, key: &str, now: Instant) -> Option<CachedItems> {
		let expired = match self.entries.get(key) {
			Some(entry) if entry.expires_at > now => {
				self.hits += 1;

				return Some(entry.value.clone());
			},
			Some(_) => true,
			None => false,
		};

		if expired {
			self.remove(key);
		}

		self.misses += 1;

		None
	}

	fn insert(&mut self, key: String, entry: CacheEntry) {
		if self.entries.contains_key(&key) {
			self.untag(&key);
		} else {
			while self.entries.len() >= self.capacity {
				let Some(evicted) = self.order.pop_front() else {
					break;
				};

				self.untag(&evicted);
				self.entries.remove(&evicted);

				self.evictions += 1;
			}

			self.order.push_back(key.clone());
		}

		for tag in &entry.tags {
			self.tags.entry(tag.clone()).or_default().insert(key.clone());
		}

		self.entries.insert(key, entry);
	}

	fn remove(&mut self, key: &str) -> bool {
		self.untag(key);
		self.order.retain(|queued| queued != key);

		self.entries.remove(key).is_some()
	}

	fn untag(&mut self, key: &str) {
		let Some(entry) = self.entries.get(key) else {
			return;
		};

		for tag in &entry.tags {
			if let Some(keys) = self.tags.get_mut(tag) {
				keys.remove(key);

				if keys.is_empty() {
					self.tags.remove(tag);
				}
			}
		}
	}

	fn invalidate_tag(&mut self, tag: &str) -> usize {
		let Some(keys) = self.tags.remove(tag) else {
			return 0;
		};

		keys.iter().filter(|key| self.remove(key)).count()
	}

	fn clear(&mut self) -> usize {
		let removed = self.entries.len();

		self.entries.clear();
		self.order.clear();
		self.tags.clear();

		removed
	}
}

/// Bounded in-process cache with FIFO eviction, per-entry expiry and a tag index.
///
/// The lock is only held for map operations and never across an `.await`.
pub struct MemoryCache {
	state: Mutex<CacheState>,
}
impl MemoryCache {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self {
			state: Mutex::new(CacheState {
				entries: HashMap::with_capacity(capacity),
				order: VecDeque::with_capacity(capacity),
				tags: HashMap::new(),
				capacity,
				hits: 0,
				misses: 0,
				evictions: 0,
			}),
		}
	}

	pub fn stats(&self) -> CacheStats {
		let state = self.state_lock();

		CacheStats {
			hits: state.hits,
			misses: state.misses,
			evictions: state.evictions,
			entries: state.entries.len(),
			capacity: state.capacity,
		}
	}

	fn state_lock(&self) -> MutexGuard<'_, CacheState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
impl CacheService for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CachedItems>>> {
		let value = self.state_lock().get(key, Instant::now());

		Box::pin(async move { Ok(value) })
	}

	fn put_with_tags<'a>(
		&'a self,
		key: &'a str,
		value: CachedItems,
		ttl: Duration,
		tags: &'a [String],
	) -> BoxFuture<'a, Result<()>> {
		let entry = CacheEntry { value, expires_at: Instant::now() + ttl, tags: tags.to_vec() };

		self.state_lock().insert(key.to_string(), entry);

		Box::pin(async move { Ok(()) })
	}

	fn invalidate_by_tag<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<usize>> {
		let removed = self.state_lock().invalidate_tag(tag);

		Box::pin(async move { Ok(removed) })
	}

	fn invalidate_all(&self) -> BoxFuture<'_, Result<usize>> {
		let removed = self.state_lock().clear();

		Box::pin(async move { Ok(removed) })
	}
}

/// Deterministic key over the request dimensions that select a result page.
///
/// Content type names match case-insensitively, so they are lowercased before hashing.
pub fn build_content_cache_key(
	channel: &str,
	content_type: Option<&str>,
	path: &str,
	language: &str,
	skip: u32,
	take: u32,
) -> Result<String> {
	let payload = json!({
		"kind": "dynamic_content",
		"schema_version": 1,
		"channel": channel,
		"content_type": content_type.map(str::to_lowercase),
		"path": path,
		"language": language,
		"skip": skip,
		"take": take,
	});
	let raw = serde_json::to_vec(&payload).map_err(|err| Error::Cache {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

/// Invalidation tags attached to a cached result set.
pub fn cache_tags(channel: &str, content_type: Option<&str>) -> Vec<String> {
	let mut tags = vec![format!("channel:{channel}")];

	if let Some(content_type) = content_type {
		tags.push(format!("content_type:{channel}:{}", content_type.to_lowercase()));
	}

	tags
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	key.get(..len).unwrap_or(key)
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, time::Duration};

	use serde_json::{Map, json};

	use crate::{
		CacheService,
		cache::{CachedItems, MemoryCache, build_content_cache_key, cache_key_prefix, cache_tags},
	};

	fn items(title: &str) -> CachedItems {
		let mut item = Map::new();

		item.insert("Title".to_string(), json!(title));

		Arc::new(vec![item])
	}

	fn tags(raw: &[&str]) -> Vec<String> {
		raw.iter().map(|tag| tag.to_string()).collect()
	}

	#[test]
	fn cache_key_is_deterministic_and_sensitive_to_paging() {
		let key = |skip, take| {
			build_content_cache_key("site", Some("Article"), "/News", "en-US", skip, take)
				.expect("key")
		};

		assert_eq!(key(0, 3), key(0, 3));
		assert_ne!(key(0, 3), key(3, 3));
		assert_ne!(key(0, 3), key(0, 4));
		assert_eq!(key(0, 3).len(), 64);
	}

	#[test]
	fn cache_key_separates_channels_languages_and_types() {
		let base = build_content_cache_key("site", Some("Article"), "/News", "en-US", 0, 0)
			.expect("key");

		for other in [
			build_content_cache_key("intranet", Some("Article"), "/News", "en-US", 0, 0),
			build_content_cache_key("site", None, "/News", "en-US", 0, 0),
			build_content_cache_key("site", Some("Article"), "/Blog", "en-US", 0, 0),
			build_content_cache_key("site", Some("Article"), "/News", "de-DE", 0, 0),
		] {
			assert_ne!(other.expect("key"), base);
		}

		assert_eq!(
			build_content_cache_key("site", Some("article"), "/News", "en-US", 0, 0).expect("key"),
			base
		);
	}

	#[test]
	fn tags_cover_channel_and_content_type() {
		assert_eq!(cache_tags("site", None), tags(&["channel:site"]));
		assert_eq!(
			cache_tags("site", Some("Article")),
			tags(&["channel:site", "content_type:site:article"])
		);
		assert_eq!(cache_key_prefix("abcdef0123456789"), "abcdef012345");
		assert_eq!(cache_key_prefix("abc"), "abc");
	}

	#[tokio::test(start_paused = true)]
	async fn entries_expire_after_ttl() {
		let cache = MemoryCache::new(8);

		cache.put_with_tags("k", items("a"), Duration::from_secs(300), &[]).await.expect("put");

		assert!(cache.get("k").await.expect("get").is_some());

		tokio::time::advance(Duration::from_secs(301)).await;

		assert!(cache.get("k").await.expect("get").is_none());

		let stats = cache.stats();

		assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 0));
	}

	#[tokio::test]
	async fn fifo_eviction_drops_oldest_entry() {
		let cache = MemoryCache::new(2);
		let ttl = Duration::from_secs(60);

		cache.put_with_tags("a", items("a"), ttl, &[]).await.expect("put");
		cache.put_with_tags("b", items("b"), ttl, &[]).await.expect("put");
		cache.put_with_tags("a", items("a2"), ttl, &[]).await.expect("put");
		cache.put_with_tags("c", items("c"), ttl, &[]).await.expect("put");

		assert!(cache.get("a").await.expect("get").is_none());
		assert!(cache.get("b").await.expect("get").is_some());
		assert!(cache.get("c").await.expect("get").is_some());
		assert_eq!(cache.stats().evictions, 1);
	}

	#[tokio::test]
	async fn tag_invalidation_removes_only_tagged_entries() {
		let cache = MemoryCache::new(8);
		let ttl = Duration::from_secs(60);
		let article = tags(&["channel:site", "content_type:site:article"]);
		let product = tags(&["channel:site", "content_type:site:product"]);

		cache.put_with_tags("a1", items("a1"), ttl, &article).await.expect("put");
		cache.put_with_tags("a2", items("a2"), ttl, &article).await.expect("put");
		cache.put_with_tags("p1", items("p1"), ttl, &product).await.expect("put");

		assert_eq!(cache.invalidate_by_tag("content_type:site:article").await.expect("tag"), 2);
		assert_eq!(cache.invalidate_by_tag("content_type:site:article").await.expect("tag"), 0);
		assert!(cache.get("p1").await.expect("get").is_some());
		assert_eq!(cache.invalidate_by_tag("channel:site").await.expect("tag"), 1);
		assert_eq!(cache.stats().entries, 0);
	}

	#[tokio::test]
	async fn replacing_an_entry_refreshes_its_tags() {
		let cache = MemoryCache::new(8);
		let ttl = Duration::from_secs(60);

		cache.put_with_tags("k", items("old"), ttl, &tags(&["old"])).await.expect("put");
		cache.put_with_tags("k", items("new"), ttl, &tags(&["new"])).await.expect("put");

		assert_eq!(cache.invalidate_by_tag("old").await.expect("tag"), 0);

		let cached = cache.get("k").await.expect("get").expect("entry");

		assert_eq!(cached[0].get("Title"), Some(&json!("new")));
		assert_eq!(cache.invalidate_all().await.expect("clear"), 1);
	}
}
