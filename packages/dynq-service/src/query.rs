use std::{
	collections::HashMap,
	future::Future,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	time::Duration,
};

use serde::Serialize;
use tokio::{
	sync::{Mutex as AsyncMutex, OwnedMutexGuard},
	time::Instant,
};
use tokio_util::sync::CancellationToken;

use dynq_domain::{BuiltQuery, QueryNote, QueryRequest, StructuredQuery, build_query};

use crate::{
	CachedItems, DynqService, NormalizedItem,
	cache::{self, cache_key_prefix},
	guard::{self, Guarded},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryStatus {
	Ok,
	TimedOut,
	Cancelled,
	Failed { message: String },
}
impl QueryStatus {
	pub fn is_ok(&self) -> bool {
		matches!(self, Self::Ok)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDisposition {
	Hit,
	Miss,
	/// The caller asked to skip the cache.
	Bypassed,
	/// Caching is switched off in configuration.
	Disabled,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryDiagnostics {
	pub status: QueryStatus,
	pub cache: CacheDisposition,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache_key: Option<String>,
	pub scope: &'static str,
	pub language: String,
	pub notes: Vec<QueryNote>,
	pub item_count: usize,
	pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryOutcome {
	pub items: Vec<NormalizedItem>,
	pub diagnostics: QueryDiagnostics,
}

/// Per-key async locks used when concurrent misses are coalesced.
#[derive(Default)]
pub(crate) struct InflightLocks {
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl InflightLocks {
	async fn acquire(&self, key: &str) -> InflightGuard<'_> {
		let lock = self.map_lock().entry(key.to_string()).or_default().clone();
		let held = lock.clone().lock_owned().await;

		InflightGuard { locks: self, key: key.to_string(), lock, _held: held }
	}

	fn map_lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
		self.locks.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

struct InflightGuard<'a> {
	locks: &'a InflightLocks,
	key: String,
	lock: Arc<AsyncMutex<()>>,
	_held: OwnedMutexGuard<()>,
}
impl Drop for InflightGuard<'_> {
	fn drop(&mut self) {
		let mut locks = self.locks.map_lock();

		// The map, this guard and its owned lock guard hold the only references when nobody waits.
		if Arc::strong_count(&self.lock) <= 3 {
			locks.remove(&self.key);
		}
	}
}

impl DynqService {
	/// Runs a dynamic content query. Never fails; faults yield an empty list.
	pub async fn query_dynamic_content(&self, request: QueryRequest) -> Vec<NormalizedItem> {
		self.query_dynamic_content_with(request, CancellationToken::new()).await.items
	}

	/// Runs a dynamic content query under the caller's cancellation token and reports diagnostics.
	pub async fn query_dynamic_content_with(
		&self,
		request: QueryRequest,
		cancel: CancellationToken,
	) -> QueryOutcome {
		let started = Instant::now();
		let BuiltQuery { query, path, notes } =
			build_query(&request, self.channel.query_defaults());
		let disposition = if !self.cfg.cache.enabled {
			Some(CacheDisposition::Disabled)
		} else if request.bypass_cache {
			Some(CacheDisposition::Bypassed)
		} else {
			None
		};
		let cache_key = match disposition {
			Some(_) => None,
			None => self.cache_key(&request, &query, &path),
		};
		let (items, cache, status) = match (disposition, cache_key.as_deref()) {
			(None, Some(key)) => {
				let tags = cache::cache_tags(&self.channel.name, query.content_type.as_deref());
				let ttl = Duration::from_secs(self.cfg.cache.ttl_secs);
				let (items, cache, status) = self
					.load_or_compute(key, ttl, &tags, &cancel, || self.compute(&query, &cancel))
					.await;

				(items.as_ref().clone(), cache, status)
			},
			(disposition, _) => {
				let (items, status) = self.compute(&query, &cancel).await;

				(items, disposition.unwrap_or(CacheDisposition::Bypassed), status)
			},
		};
		let diagnostics = QueryDiagnostics {
			status,
			cache,
			cache_key,
			scope: query.scope.kind(),
			language: query.language.clone(),
			notes,
			item_count: items.len(),
			elapsed_ms: started.elapsed().as_millis() as u64,
		};

		tracing::debug!(
			path = %path,
			scope = diagnostics.scope,
			cache = ?diagnostics.cache,
			items = diagnostics.item_count,
			elapsed_ms = diagnostics.elapsed_ms,
			"Dynamic content query finished."
		);

		QueryOutcome { items, diagnostics }
	}

	/// Looks `key` up and, on a miss, runs `factory` and stores a successful result.
	///
	/// Concurrent misses on one key each run the factory unless `cache.coalesce_misses` is set.
	/// Waiting for another caller's computation on the same key is bounded by the query deadline
	/// and by `cancel`.
	pub async fn load_or_compute<F, Fut>(
		&self,
		key: &str,
		ttl: Duration,
		tags: &[String],
		cancel: &CancellationToken,
		factory: F,
	) -> (CachedItems, CacheDisposition, QueryStatus)
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = (Vec<NormalizedItem>, QueryStatus)>,
	{
		let _inflight = if self.cfg.cache.coalesce_misses {
			let deadline = Duration::from_millis(self.cfg.query.deadline_ms);
			let waited = guard::guarded(deadline, cancel, |_| self.inflight.acquire(key)).await;
			let status = match waited {
				Guarded::Completed(held) => Ok(held),
				Guarded::TimedOut => Err(QueryStatus::TimedOut),
				Guarded::Cancelled => Err(QueryStatus::Cancelled),
			};

			match status {
				Ok(held) => Some(held),
				Err(status) => {
					tracing::warn!(
						cache_key_prefix = cache_key_prefix(key),
						status = ?status,
						"Gave up waiting for an in-flight computation; returning an empty result."
					);

					return (Arc::new(Vec::new()), CacheDisposition::Miss, status);
				},
			}
		} else {
			None
		};

		match self.cache.get(key).await {
			Ok(Some(items)) => {
				tracing::info!(
					cache_key_prefix = cache_key_prefix(key),
					hit = true,
					items = items.len(),
					"Cache hit."
				);

				return (items, CacheDisposition::Hit, QueryStatus::Ok);
			},
			Ok(None) => {
				tracing::info!(
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					"Cache miss."
				);
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_key_prefix = cache_key_prefix(key),
					"Cache read failed."
				);
			},
		}

		let (items, status) = factory().await;
		let items = Arc::new(items);

		if status.is_ok() {
			match self.cache.put_with_tags(key, items.clone(), ttl, tags).await {
				Ok(()) => {
					tracing::info!(
						cache_key_prefix = cache_key_prefix(key),
						items = items.len(),
						ttl_secs = ttl.as_secs(),
						"Cache stored."
					);
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_key_prefix = cache_key_prefix(key),
						"Cache write failed."
					);
				},
			}
		}

		(items, CacheDisposition::Miss, status)
	}

	/// Runs the engine under the deadline guard and normalizes the records.
	async fn compute(
		&self,
		query: &StructuredQuery,
		cancel: &CancellationToken,
	) -> (Vec<NormalizedItem>, QueryStatus) {
		let options = self.channel.execution_options();
		let deadline = Duration::from_millis(self.cfg.query.deadline_ms);
		let outcome =
			guard::guarded(deadline, cancel, |token| self.engine.run(query, &options, token)).await;

		match outcome {
			Guarded::Completed(Ok(records)) =>
				(self.normalizer.normalize_all(records), QueryStatus::Ok),
			Guarded::Completed(Err(err)) => {
				tracing::error!(
					error = %err,
					scope = query.scope.kind(),
					"Content query failed; returning an empty result."
				);

				(Vec::new(), QueryStatus::Failed { message: err.to_string() })
			},
			Guarded::TimedOut => {
				tracing::warn!(
					deadline_ms = self.cfg.query.deadline_ms,
					scope = query.scope.kind(),
					"Content query timed out; returning an empty result."
				);

				(Vec::new(), QueryStatus::TimedOut)
			},
			Guarded::Cancelled => {
				tracing::warn!(
					scope = query.scope.kind(),
					"Content query cancelled; returning an empty result."
				);

				(Vec::new(), QueryStatus::Cancelled)
			},
		}
	}

	/// The explicit key when one is supplied, otherwise a hash of the paging dimensions.
	fn cache_key(
		&self,
		request: &QueryRequest,
		query: &StructuredQuery,
		path: &str,
	) -> Option<String> {
		if let Some(key) =
			request.cache_key.as_deref().map(str::trim).filter(|key| !key.is_empty())
		{
			return Some(key.to_string());
		}

		match cache::build_content_cache_key(
			&self.channel.name,
			query.content_type.as_deref(),
			path,
			&query.language,
			request.skip,
			request.take,
		) {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, "Cache key build failed; running uncached.");

				None
			},
		}
	}
}
