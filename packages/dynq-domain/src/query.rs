use serde::{Deserialize, Serialize};

use crate::{
	QueryNote,
	params::{self, OrderSpec, Predicate},
	scope::{self, ScopeFilter},
};

/// Loosely-typed caller parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
	pub path: String,
	pub language: Option<String>,
	/// Restrict to the page at `path` instead of its descendants.
	pub only_this_page: bool,
	pub content_type: Option<String>,
	pub nesting_level: i32,
	pub order_by: Option<String>,
	/// Legacy row limit, used only when both `skip` and `take` are zero.
	pub top_n: u32,
	pub skip: u32,
	pub take: u32,
	pub filter: Option<String>,
	pub cache_key: Option<String>,
	pub bypass_cache: bool,
}
impl QueryRequest {
	pub fn at_path(path: impl Into<String>) -> Self {
		Self { path: path.into(), ..Default::default() }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pagination {
	/// `take == 0` means no upper bound after skipping.
	Window { skip: u32, take: u32 },
	TopN { count: u32 },
	Unbounded,
}
impl Pagination {
	pub fn offset(&self) -> u32 {
		match self {
			Self::Window { skip, .. } => *skip,
			Self::TopN { .. } | Self::Unbounded => 0,
		}
	}

	pub fn limit(&self) -> Option<u32> {
		match self {
			Self::Window { take, .. } if *take > 0 => Some(*take),
			Self::Window { .. } | Self::Unbounded => None,
			Self::TopN { count } => Some(*count),
		}
	}

	pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
		let offset = self.offset() as usize;
		let items = items.into_iter().skip(offset);

		match self.limit() {
			Some(limit) => items.take(limit as usize).collect(),
			None => items.collect(),
		}
	}
}

/// The structured query handed to an execution engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructuredQuery {
	pub scope: ScopeFilter,
	pub content_type: Option<String>,
	pub language: String,
	pub predicates: Vec<Predicate>,
	pub order: Option<OrderSpec>,
	pub pagination: Pagination,
}

#[derive(Clone, Debug)]
pub struct QueryBuilder {
	scope: ScopeFilter,
	content_type: Option<String>,
	language: String,
	predicates: Vec<Predicate>,
	order: Option<OrderSpec>,
	pagination: Pagination,
}
impl QueryBuilder {
	pub fn new(language: impl Into<String>) -> Self {
		Self {
			scope: ScopeFilter::None,
			content_type: None,
			language: language.into(),
			predicates: Vec::new(),
			order: None,
			pagination: Pagination::Unbounded,
		}
	}

	pub fn scope(mut self, scope: ScopeFilter) -> Self {
		self.scope = scope;

		self
	}

	pub fn content_type(mut self, content_type: Option<String>) -> Self {
		self.content_type = content_type;

		self
	}

	pub fn predicate(mut self, predicate: Predicate) -> Self {
		self.predicates.push(predicate);

		self
	}

	pub fn order(mut self, order: Option<OrderSpec>) -> Self {
		self.order = order;

		self
	}

	pub fn paginate(mut self, top_n: u32, skip: u32, take: u32) -> Self {
		self.pagination = resolve_pagination(top_n, skip, take);

		self
	}

	pub fn build(self) -> StructuredQuery {
		StructuredQuery {
			scope: self.scope,
			content_type: self.content_type,
			language: self.language,
			predicates: self.predicates,
			order: self.order,
			pagination: self.pagination,
		}
	}
}

/// Channel-level defaults applied while building a query.
#[derive(Clone, Copy, Debug)]
pub struct QueryDefaults<'a> {
	pub default_language: &'a str,
	pub root_path: &'a str,
}

#[derive(Clone, Debug)]
pub struct BuiltQuery {
	pub query: StructuredQuery,
	/// Normalized request path, also used for cache keys.
	pub path: String,
	pub notes: Vec<QueryNote>,
}

/// Skip/take take precedence over the legacy top-N count.
pub fn resolve_pagination(top_n: u32, skip: u32, take: u32) -> Pagination {
	if skip > 0 || take > 0 {
		Pagination::Window { skip, take }
	} else if top_n > 0 {
		Pagination::TopN { count: top_n }
	} else {
		Pagination::Unbounded
	}
}

pub fn build_query(request: &QueryRequest, defaults: QueryDefaults<'_>) -> BuiltQuery {
	let mut notes = Vec::new();
	let path = scope::normalize_path(&request.path);
	let scope = scope::resolve_scope(
		&path,
		defaults.root_path,
		request.only_this_page,
		request.nesting_level,
		&mut notes,
	);
	let language = non_blank(request.language.as_deref())
		.unwrap_or(defaults.default_language)
		.to_string();
	let content_type = non_blank(request.content_type.as_deref()).map(str::to_string);
	let order = request.order_by.as_deref().and_then(|raw| params::parse_order(raw, &mut notes));
	let mut builder = QueryBuilder::new(language)
		.scope(scope)
		.content_type(content_type)
		.order(order)
		.paginate(request.top_n, request.skip, request.take);

	if let Some(predicate) =
		request.filter.as_deref().and_then(|raw| params::parse_filter(raw, &mut notes))
	{
		builder = builder.predicate(predicate);
	}

	BuiltQuery { query: builder.build(), path, notes }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
	raw.map(str::trim).filter(|value| !value.is_empty())
}
