use std::{
	cmp::Ordering,
	fs,
	path::Path,
	sync::{
		RwLock,
		atomic::{AtomicI64, Ordering as AtomicOrdering},
	},
};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dynq_domain::{
	Direction, IdentityField, OrderSpec, PageIdentity, RawContentRecord, StructuredQuery,
	TreePath,
};

use crate::{Error, ExecutionOptions, Result, models::ContentItem};

#[derive(Clone, Debug)]
struct StoredItem {
	id: i64,
	item: ContentItem,
	/// Normalized tree path, level and parent id for pages.
	node: Option<(TreePath, i32, Option<i64>)>,
}
impl StoredItem {
	fn tree_path(&self) -> Option<&str> {
		self.node.as_ref().map(|(path, _, _)| path.as_str())
	}

	fn identity(&self) -> Option<PageIdentity> {
		let page = self.item.page.as_ref()?;
		let (path, level, parent_id) = self.node.as_ref()?;

		Some(PageIdentity {
			id: self.id,
			guid: self.item.guid,
			name: page.name.clone(),
			tree_path: path.to_string(),
			order: page.order,
			parent_id: *parent_id,
			level: Some(*level),
		})
	}

	fn sort_value(&self, field: &str) -> Option<Value> {
		match IdentityField::from_name(field) {
			Some(IdentityField::Id) => Some(Value::from(self.id)),
			Some(IdentityField::Guid) => Some(Value::String(self.item.guid.to_string())),
			Some(identity) => self.identity().and_then(|page| identity.value_of(&page)),
			None => self.item.fields.get(field).cloned(),
		}
	}

	fn to_record(&self) -> RawContentRecord {
		RawContentRecord {
			content_type: self.item.content_type.clone(),
			language: self.item.language.clone(),
			fields: self.item.fields.clone(),
			page: self.identity(),
		}
	}
}

/// An in-process content store with the same query semantics as the Postgres store.
#[derive(Debug)]
pub struct MemoryContentStore {
	items: RwLock<Vec<StoredItem>>,
	next_id: AtomicI64,
}
impl MemoryContentStore {
	/// Loads a JSON array of content items.
	pub fn from_seed_file(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path)
			.map_err(|err| Error::Seed { path: path.to_path_buf(), message: err.to_string() })?;
		let items: Vec<ContentItem> = serde_json::from_str(&raw)
			.map_err(|err| Error::Seed { path: path.to_path_buf(), message: err.to_string() })?;
		let store = Self::default();

		for item in items {
			store.insert(item).map_err(|err| Error::Seed {
				path: path.to_path_buf(),
				message: err.to_string(),
			})?;
		}

		tracing::info!(path = %path.display(), items = store.len(), "Content seed loaded.");

		Ok(store)
	}

	/// Inserts an item, deriving its tree level and parent from the page path.
	pub fn insert(&self, item: ContentItem) -> Result<i64> {
		let mut items = self
			.items
			.write()
			.map_err(|_| Error::InvalidArgument("Content store lock is poisoned.".to_string()))?;
		let node = match item.page.as_ref() {
			Some(page) => {
				let path = TreePath::parse(&page.tree_path).ok_or_else(|| {
					Error::InvalidArgument(format!(
						"Page {} must not sit at the channel root.",
						item.guid
					))
				})?;
				let parent_id = path.parent().and_then(|parent| {
					items
						.iter()
						.find(|stored| {
							stored.item.channel == item.channel
								&& stored.item.language == item.language
								&& stored.tree_path() == Some(parent.as_str())
						})
						.map(|stored| stored.id)
				});
				let level = path.depth() as i32;

				Some((path, level, parent_id))
			},
			None => None,
		};
		let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);

		items.push(StoredItem { id, item, node });

		Ok(id)
	}

	pub fn len(&self) -> usize {
		self.items.read().map(|items| items.len()).unwrap_or_default()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn run(
		&self,
		query: &StructuredQuery,
		options: &ExecutionOptions,
		cancel: &CancellationToken,
	) -> Result<Vec<RawContentRecord>> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let items = self
			.items
			.read()
			.map_err(|_| Error::InvalidArgument("Content store lock is poisoned.".to_string()))?;
		let mut matched = items
			.iter()
			.filter(|stored| {
				let item = &stored.item;

				item.channel == options.channel
					&& item.language == query.language
					&& (options.preview || item.published)
					&& (options.include_secured || !item.secured)
					&& query
						.content_type
						.as_deref()
						.is_none_or(|content_type| {
							item.content_type.eq_ignore_ascii_case(content_type)
						})
					&& query.scope.matches(stored.tree_path())
					&& query.predicates.iter().all(|predicate| predicate.matches(&item.fields))
			})
			.collect::<Vec<_>>();

		match query.order.as_ref() {
			Some(order) => matched.sort_by(|left, right| compare_items(left, right, order)),
			None => matched.sort_by_key(|stored| stored.id),
		}

		let records =
			query.pagination.apply(matched).into_iter().map(StoredItem::to_record).collect();

		Ok(records)
	}
}
impl Default for MemoryContentStore {
	fn default() -> Self {
		Self { items: RwLock::new(Vec::new()), next_id: AtomicI64::new(1) }
	}
}

/// Missing values sort last in either direction; ties fall back to insertion order.
fn compare_items(left: &StoredItem, right: &StoredItem, order: &OrderSpec) -> Ordering {
	let ordering = match (left.sort_value(&order.field), right.sort_value(&order.field)) {
		(Some(left), Some(right)) => {
			let ordering = compare_json(&left, &right);

			match order.direction {
				Direction::Ascending => ordering,
				Direction::Descending => ordering.reverse(),
			}
		},
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	};

	ordering.then(left.id.cmp(&right.id))
}

/// Orders JSON values the way a `jsonb` btree does: null < string < number < bool < array < object.
fn compare_json(left: &Value, right: &Value) -> Ordering {
	match (left, right) {
		(Value::String(left), Value::String(right)) => left.cmp(right),
		(Value::Number(left), Value::Number(right)) => {
			let left = left.as_f64().unwrap_or_default();
			let right = right.as_f64().unwrap_or_default();

			left.total_cmp(&right)
		},
		(Value::Bool(left), Value::Bool(right)) => left.cmp(right),
		(Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) =>
			left.to_string().cmp(&right.to_string()),
		_ => json_rank(left).cmp(&json_rank(right)),
	}
}

fn json_rank(value: &Value) -> u8 {
	match value {
		Value::Null => 0,
		Value::String(_) => 1,
		Value::Number(_) => 2,
		Value::Bool(_) => 3,
		Value::Array(_) => 4,
		Value::Object(_) => 5,
	}
}
