use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Map, json};
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::UnixStream,
	sync::Mutex as AsyncMutex,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use dynq_config::Config;
use dynq_domain::{
	Direction, PageIdentity, Pagination, QueryRequest, RawContentRecord, ScopeFilter,
	StructuredQuery, TreePath,
};
use dynq_service::{
	BoxFuture, CacheDisposition, DynqService, Error, ExecutionEngine, MemoryCache, QueryStatus,
	Result,
};
use dynq_storage::ExecutionOptions;

const BASE_CONFIG: &str = r#"
[service]
http_bind = "127.0.0.1:8080"
admin_bind = "127.0.0.1:8081"
log_level = "info"

[storage]
backend = "memory"

[channel]
name = "site"

[query]
deadline_ms = 5000

[cache]
ttl_secs = 300
max_entries = 64

[security]
bind_localhost_only = true

[[content_types]]
name = "Article"
fields = [
	{ name = "Title", kind = "text" },
	{ name = "PublishDate", kind = "date_time" },
]
"#;

fn config(extra: &str) -> Config {
	let raw = format!("{BASE_CONFIG}\n{extra}");

	dynq_config::parse(&raw).expect("Failed to parse test config.")
}

fn config_with(edit: impl FnOnce(&mut Config)) -> Config {
	let mut cfg = config("");

	edit(&mut cfg);

	cfg
}

fn article(id: i64, tree_path: &str, title: &str) -> RawContentRecord {
	let mut fields = Map::new();

	fields.insert("Title".to_string(), json!(title));

	RawContentRecord {
		content_type: "Article".to_string(),
		language: "en-US".to_string(),
		fields,
		page: Some(PageIdentity {
			id,
			guid: Uuid::new_v4(),
			name: title.to_lowercase(),
			tree_path: tree_path.to_string(),
			order: None,
			parent_id: None,
			level: Some(2),
		}),
	}
}

/// Records every query it receives and answers with a fixed record set.
struct SpyEngine {
	calls: AtomicUsize,
	queries: Mutex<Vec<StructuredQuery>>,
	delay: Option<Duration>,
	/// Only the first call is delayed.
	delay_first_only: bool,
	fail: bool,
}
impl SpyEngine {
	fn new() -> Self {
		Self {
			calls: AtomicUsize::new(0),
			queries: Mutex::new(Vec::new()),
			delay: None,
			delay_first_only: false,
			fail: false,
		}
	}

	fn slow(delay: Duration) -> Self {
		Self { delay: Some(delay), ..Self::new() }
	}

	fn slow_first(delay: Duration) -> Self {
		Self { delay: Some(delay), delay_first_only: true, ..Self::new() }
	}

	fn failing() -> Self {
		Self { fail: true, ..Self::new() }
	}

	fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn last_query(&self) -> StructuredQuery {
		self.queries.lock().expect("lock").last().cloned().expect("engine was called")
	}
}
impl ExecutionEngine for SpyEngine {
	fn run<'a>(
		&'a self,
		query: &'a StructuredQuery,
		_options: &'a ExecutionOptions,
		_cancel: CancellationToken,
	) -> BoxFuture<'a, Result<Vec<RawContentRecord>>> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);
		let delay = self.delay.filter(|_| call == 0 || !self.delay_first_only);

		self.queries.lock().expect("lock").push(query.clone());

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}
			if self.fail {
				return Err(Error::Engine { message: "store unavailable".to_string() });
			}

			let records = vec![
				article(1, "/News/a", "Alpha"),
				article(2, "/News/b", "Beta"),
				article(3, "/News/c", "Gamma"),
			];

			Ok(query.pagination.apply(records))
		})
	}
}

/// Answers only after reading one byte from a socket registered with the test runtime.
struct SocketEngine {
	stream: AsyncMutex<UnixStream>,
	completed: AtomicUsize,
}
impl ExecutionEngine for SocketEngine {
	fn run<'a>(
		&'a self,
		_query: &'a StructuredQuery,
		_options: &'a ExecutionOptions,
		_cancel: CancellationToken,
	) -> BoxFuture<'a, Result<Vec<RawContentRecord>>> {
		Box::pin(async move {
			let mut byte = [0_u8; 1];

			self.stream
				.lock()
				.await
				.read_exact(&mut byte)
				.await
				.map_err(|err| Error::Engine { message: err.to_string() })?;
			self.completed.fetch_add(1, Ordering::SeqCst);

			Ok(vec![article(1, "/News/a", "Alpha")])
		})
	}
}

fn service(cfg: Config, engine: Arc<SpyEngine>) -> DynqService {
	DynqService::with_components(cfg, engine, Arc::new(MemoryCache::new(64)))
}

fn listing() -> QueryRequest {
	QueryRequest {
		content_type: Some("Article".to_string()),
		order_by: Some("PublishDate DESC".to_string()),
		take: 3,
		..QueryRequest::at_path("/News")
	}
}

#[tokio::test]
async fn news_listing_builds_a_descending_subtree_query() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let items = service.query_dynamic_content(listing()).await;
	let query = engine.last_query();

	assert!(items.len() <= 3);
	assert_eq!(query.scope, ScopeFilter::Subtree(TreePath::parse("/News").expect("path")));
	assert_eq!(query.order.map(|order| order.direction), Some(Direction::Descending));
	assert_eq!(query.pagination, Pagination::Window { skip: 0, take: 3 });
	assert_eq!(items[0].get("ID"), Some(&json!(1)));
	assert_eq!(items[0].get("Title"), Some(&json!("Alpha")));
}

#[tokio::test]
async fn only_this_page_builds_a_single_scope() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let request = QueryRequest { only_this_page: true, ..QueryRequest::at_path("/News/item1") };

	service.query_dynamic_content(request).await;

	assert_eq!(
		engine.last_query().scope,
		ScopeFilter::Single(TreePath::parse("/News/item1").expect("path"))
	);
}

#[tokio::test]
async fn cached_results_skip_the_engine_within_ttl() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let first = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;
	let second = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;

	assert_eq!(engine.count(), 1);
	assert_eq!(first.diagnostics.cache, CacheDisposition::Miss);
	assert_eq!(second.diagnostics.cache, CacheDisposition::Hit);
	assert_eq!(first.items, second.items);
	assert_eq!(first.diagnostics.cache_key, second.diagnostics.cache_key);
}

#[tokio::test]
async fn bypass_always_reaches_the_engine() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let request = QueryRequest { bypass_cache: true, ..listing() };
	let outcome =
		service.query_dynamic_content_with(request.clone(), CancellationToken::new()).await;

	service.query_dynamic_content(request).await;

	assert_eq!(engine.count(), 2);
	assert_eq!(outcome.diagnostics.cache, CacheDisposition::Bypassed);
	assert!(outcome.diagnostics.cache_key.is_none());

	// Bypassed results are not stored either.
	service.query_dynamic_content(listing()).await;

	assert_eq!(engine.count(), 3);
}

#[tokio::test]
async fn disabled_cache_behaves_like_bypass() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config_with(|cfg| cfg.cache.enabled = false), engine.clone());
	let outcome = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;

	service.query_dynamic_content(listing()).await;

	assert_eq!(engine.count(), 2);
	assert_eq!(outcome.diagnostics.cache, CacheDisposition::Disabled);
}

#[tokio::test]
async fn paging_changes_the_cache_key() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let next_page = QueryRequest { skip: 3, ..listing() };

	service.query_dynamic_content(listing()).await;
	service.query_dynamic_content(next_page).await;

	assert_eq!(engine.count(), 2);
}

#[tokio::test]
async fn explicit_cache_key_overrides_the_derived_key() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let keyed = |path: &str| QueryRequest {
		cache_key: Some(" shared-menu ".to_string()),
		..QueryRequest::at_path(path)
	};
	let first = service.query_dynamic_content_with(keyed("/News"), CancellationToken::new()).await;
	let second = service.query_dynamic_content_with(keyed("/Blog"), CancellationToken::new()).await;

	assert_eq!(engine.count(), 1);
	assert_eq!(first.diagnostics.cache_key.as_deref(), Some("shared-menu"));
	assert_eq!(second.diagnostics.cache, CacheDisposition::Hit);
}

#[tokio::test(start_paused = true)]
async fn cache_entries_expire_after_ttl() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());

	service.query_dynamic_content(listing()).await;
	tokio::time::advance(Duration::from_secs(301)).await;
	service.query_dynamic_content(listing()).await;

	assert_eq!(engine.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn timeouts_return_empty_and_do_not_poison_later_calls() {
	let engine = Arc::new(SpyEngine::slow_first(Duration::from_secs(10)));
	let service = service(config(""), engine.clone());
	let timed_out = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;

	assert!(timed_out.items.is_empty());
	assert_eq!(timed_out.diagnostics.status, QueryStatus::TimedOut);

	let outcome = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;

	assert_eq!(outcome.diagnostics.status, QueryStatus::Ok);
	assert_eq!(outcome.diagnostics.cache, CacheDisposition::Miss);
	assert_eq!(outcome.items.len(), 3);
	assert_eq!(engine.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn timed_out_results_are_not_cached() {
	let engine = Arc::new(SpyEngine::slow(Duration::from_secs(10)));
	let service = service(config(""), engine.clone());

	service.query_dynamic_content(listing()).await;
	service.query_dynamic_content(listing()).await;

	assert_eq!(engine.count(), 2);
}

#[tokio::test]
async fn caller_cancellation_returns_empty() {
	let engine = Arc::new(SpyEngine::slow(Duration::from_secs(1)));
	let service = service(config(""), engine.clone());
	let cancel = CancellationToken::new();

	cancel.cancel();

	let outcome = service.query_dynamic_content_with(listing(), cancel).await;

	assert!(outcome.items.is_empty());
	assert_eq!(outcome.diagnostics.status, QueryStatus::Cancelled);
}

#[tokio::test]
async fn engine_failures_are_swallowed() {
	let engine = Arc::new(SpyEngine::failing());
	let service = service(config(""), engine.clone());
	let outcome = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;

	assert!(outcome.items.is_empty());
	assert!(matches!(outcome.diagnostics.status, QueryStatus::Failed { .. }));

	service.query_dynamic_content(listing()).await;

	assert_eq!(engine.count(), 2);
}

#[tokio::test]
async fn malformed_clauses_surface_as_notes() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let request = QueryRequest {
		filter: Some("Price>100".to_string()),
		order_by: Some("1; DROP".to_string()),
		..QueryRequest::at_path("/News")
	};
	let outcome = service.query_dynamic_content_with(request, CancellationToken::new()).await;
	let codes = outcome.diagnostics.notes.iter().map(|note| note.code).collect::<Vec<_>>();

	assert_eq!(codes, vec!["order.invalid_field", "filter.range_as_equality"]);
	assert_eq!(engine.last_query().predicates.len(), 1);
}

#[tokio::test]
async fn tag_invalidation_forces_recompute() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());

	service.query_dynamic_content(listing()).await;

	assert_eq!(service.invalidate_cache_tag("content_type:site:article").await, 1);

	service.query_dynamic_content(listing()).await;

	assert_eq!(engine.count(), 2);
	assert_eq!(service.invalidate_cache_all().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coalesced_misses_reach_the_engine_once() {
	let engine = Arc::new(SpyEngine::slow(Duration::from_millis(50)));
	let service =
		Arc::new(service(config_with(|cfg| cfg.cache.coalesce_misses = true), engine.clone()));
	let tasks = (0..4)
		.map(|_| {
			let service = service.clone();

			tokio::spawn(async move { service.query_dynamic_content(listing()).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		assert_eq!(task.await.expect("task").len(), 3);
	}

	assert_eq!(engine.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_each_recompute_by_default() {
	let engine = Arc::new(SpyEngine::slow(Duration::from_millis(200)));
	let service = Arc::new(service(config(""), engine.clone()));
	let tasks = (0..4)
		.map(|_| {
			let service = service.clone();

			tokio::spawn(async move { service.query_dynamic_content(listing()).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		assert_eq!(task.await.expect("task").len(), 3);
	}

	assert_eq!(engine.count(), 4);

	let outcome = service.query_dynamic_content_with(listing(), CancellationToken::new()).await;

	assert_eq!(outcome.diagnostics.cache, CacheDisposition::Hit);
	assert_eq!(engine.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_stops_queueing_behind_a_coalesced_miss() {
	let engine = Arc::new(SpyEngine::slow(Duration::from_secs(2)));
	let service =
		Arc::new(service(config_with(|cfg| cfg.cache.coalesce_misses = true), engine.clone()));
	let leader = {
		let service = service.clone();

		tokio::spawn(async move { service.query_dynamic_content(listing()).await })
	};

	tokio::time::sleep(Duration::from_millis(10)).await;

	let cancel = CancellationToken::new();
	let waiter = {
		let service = service.clone();
		let cancel = cancel.clone();

		tokio::spawn(async move { service.query_dynamic_content_with(listing(), cancel).await })
	};

	tokio::time::sleep(Duration::from_millis(10)).await;
	cancel.cancel();

	let outcome = waiter.await.expect("task");

	assert_eq!(outcome.diagnostics.status, QueryStatus::Cancelled);
	assert!(outcome.items.is_empty());
	assert!(!leader.is_finished());
	assert_eq!(leader.await.expect("task").len(), 3);
	assert_eq!(engine.count(), 1);
}

#[test]
fn blocking_adapter_works_without_a_runtime() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let items = service.query_dynamic_content_blocking(
		Some("Article"),
		"/News",
		2,
		0,
		Some("Title"),
		Some("DESC"),
	);
	let query = engine.last_query();

	assert_eq!(items.len(), 2);
	assert_eq!(query.scope, ScopeFilter::Subtree(TreePath::parse("/News").expect("path")));
	assert_eq!(query.order.map(|order| order.direction), Some(Direction::Descending));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_adapter_works_inside_a_multi_thread_runtime() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let items = service.query_dynamic_content_blocking(None, "/News", 0, 1, None, None);

	assert_eq!(items.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_adapter_drives_runtime_bound_engine_io() {
	let (reader, mut writer) = UnixStream::pair().expect("Failed to open a socket pair.");

	writer.write_all(&[1]).await.expect("Failed to write to the socket.");

	let engine =
		Arc::new(SocketEngine { stream: AsyncMutex::new(reader), completed: AtomicUsize::new(0) });
	let service =
		DynqService::with_components(config(""), engine.clone(), Arc::new(MemoryCache::new(64)));
	let items = service.query_dynamic_content_blocking(None, "/News", 0, 0, None, None);

	assert_eq!(items.len(), 1);
	assert_eq!(engine.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocking_adapter_refuses_a_current_thread_runtime() {
	let engine = Arc::new(SpyEngine::new());
	let service = service(config(""), engine.clone());
	let items = service.query_dynamic_content_blocking(None, "/News", 1, 0, None, None);

	assert!(items.is_empty());
	assert_eq!(engine.count(), 0);
}
