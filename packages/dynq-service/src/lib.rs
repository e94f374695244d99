pub mod blocking;
pub mod cache;
pub mod guard;
pub mod normalize;
pub mod query;

mod error;

pub use cache::{CacheStats, CachedItems, MemoryCache, build_content_cache_key};
pub use error::{Error, Result};
pub use guard::{Guarded, guarded};
pub use normalize::{NormalizedItem, ResultNormalizer};
pub use query::{CacheDisposition, QueryDiagnostics, QueryOutcome, QueryStatus};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use dynq_config::{Channel, Config};
use dynq_domain::{ContentTypeRegistry, QueryDefaults, RawContentRecord, StructuredQuery};
use dynq_storage::{ContentStore, ExecutionOptions};

use crate::query::InflightLocks;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs structured queries against a content store.
pub trait ExecutionEngine
where
	Self: Send + Sync,
{
	fn run<'a>(
		&'a self,
		query: &'a StructuredQuery,
		options: &'a ExecutionOptions,
		cancel: CancellationToken,
	) -> BoxFuture<'a, Result<Vec<RawContentRecord>>>;
}

/// Keyed storage for normalized result sets with TTL expiry and tag invalidation.
pub trait CacheService
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CachedItems>>>;

	fn put_with_tags<'a>(
		&'a self,
		key: &'a str,
		value: CachedItems,
		ttl: Duration,
		tags: &'a [String],
	) -> BoxFuture<'a, Result<()>>;

	/// Drops every entry carrying `tag` and returns how many were removed.
	fn invalidate_by_tag<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<usize>>;

	fn invalidate_all(&self) -> BoxFuture<'_, Result<usize>>;
}

/// The channel a service instance answers for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelContext {
	pub name: String,
	pub preview: bool,
	pub include_secured: bool,
	pub default_language: String,
	pub root_path: String,
}
impl ChannelContext {
	pub fn from_config(cfg: &Channel) -> Self {
		Self {
			name: cfg.name.clone(),
			preview: cfg.preview,
			include_secured: cfg.include_secured,
			default_language: cfg.default_language.clone(),
			root_path: cfg.root_path.clone(),
		}
	}

	pub fn execution_options(&self) -> ExecutionOptions {
		ExecutionOptions {
			channel: self.name.clone(),
			preview: self.preview,
			include_secured: self.include_secured,
		}
	}

	pub fn query_defaults(&self) -> QueryDefaults<'_> {
		QueryDefaults { default_language: &self.default_language, root_path: &self.root_path }
	}
}

pub struct DynqService {
	pub cfg: Config,
	pub channel: ChannelContext,
	engine: Arc<dyn ExecutionEngine>,
	cache: Arc<dyn CacheService>,
	normalizer: ResultNormalizer,
	inflight: InflightLocks,
}
impl DynqService {
	/// Opens the configured content store and an in-process cache.
	pub async fn new(cfg: Config) -> Result<Self> {
		let store = ContentStore::open(&cfg.storage).await?;
		let cache = MemoryCache::new(cfg.cache.max_entries);

		Ok(Self::with_components(cfg, Arc::new(store), Arc::new(cache)))
	}

	pub fn with_components(
		cfg: Config,
		engine: Arc<dyn ExecutionEngine>,
		cache: Arc<dyn CacheService>,
	) -> Self {
		let registry = ContentTypeRegistry::from_config(&cfg.content_types);
		let normalizer = ResultNormalizer::new(registry, &cfg.normalizer.excluded_fields);
		let channel = ChannelContext::from_config(&cfg.channel);

		Self { cfg, channel, engine, cache, normalizer, inflight: InflightLocks::default() }
	}

	pub fn normalizer(&self) -> &ResultNormalizer {
		&self.normalizer
	}

	/// Drops cached result sets carrying `tag`; failures are logged and count as zero.
	pub async fn invalidate_cache_tag(&self, tag: &str) -> usize {
		match self.cache.invalidate_by_tag(tag).await {
			Ok(removed) => {
				tracing::info!(tag, removed, "Cache tag invalidated.");

				removed
			},
			Err(err) => {
				tracing::warn!(error = %err, tag, "Cache tag invalidation failed.");

				0
			},
		}
	}

	pub async fn invalidate_cache_all(&self) -> usize {
		match self.cache.invalidate_all().await {
			Ok(removed) => {
				tracing::info!(removed, "Cache cleared.");

				removed
			},
			Err(err) => {
				tracing::warn!(error = %err, "Cache clear failed.");

				0
			},
		}
	}
}

impl ExecutionEngine for ContentStore {
	fn run<'a>(
		&'a self,
		query: &'a StructuredQuery,
		options: &'a ExecutionOptions,
		cancel: CancellationToken,
	) -> BoxFuture<'a, Result<Vec<RawContentRecord>>> {
		Box::pin(async move { Ok(ContentStore::run(self, query, options, &cancel).await?) })
	}
}
