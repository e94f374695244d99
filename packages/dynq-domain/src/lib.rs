pub mod params;
pub mod query;
pub mod record;
pub mod schema;
pub mod scope;

pub use params::{
	Direction, OrderSpec, Predicate, PredicateOp, RangeComparison, parse_filter, parse_order,
};
pub use query::{
	BuiltQuery, Pagination, QueryBuilder, QueryDefaults, QueryRequest, StructuredQuery,
	build_query, resolve_pagination,
};
pub use record::{IdentityField, PageIdentity, RawContentRecord, json_text};
pub use schema::{ContentTypeRegistry, ContentTypeSchema, FieldConversionError, FieldSchema};
pub use scope::{ScopeFilter, TreePath, normalize_path, resolve_scope};

use serde::Serialize;

/// A clause that was dropped or rewritten while turning request parameters into a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryNote {
	pub code: &'static str,
	pub detail: String,
}
impl QueryNote {
	pub fn new(code: &'static str, detail: impl Into<String>) -> Self {
		Self { code, detail: detail.into() }
	}
}

pub(crate) fn is_field_name(raw: &str) -> bool {
	!raw.is_empty()
		&& raw.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
		&& !raw.starts_with('.')
		&& !raw.ends_with('.')
}
