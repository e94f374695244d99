use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio_util::sync::CancellationToken;

use dynq_domain::{
	IdentityField, PredicateOp, RawContentRecord, ScopeFilter, StructuredQuery, TreePath,
};

use crate::{
	Error, ExecutionOptions, Result,
	models::{ContentItem, ContentRow},
};

const SELECT_COLUMNS: &str = "\
SELECT
	item_id,
	item_guid,
	content_type,
	language,
	is_page,
	node_name,
	tree_path,
	node_order,
	parent_id,
	node_level,
	fields
FROM content_items
WHERE channel = ";

pub struct PgContentStore {
	pool: PgPool,
}
impl PgContentStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	pub async fn run(
		&self,
		query: &StructuredQuery,
		options: &ExecutionOptions,
		cancel: &CancellationToken,
	) -> Result<Vec<RawContentRecord>> {
		let mut builder = build_select(query, options);
		let fetch = builder.build_query_as::<ContentRow>().fetch_all(&self.pool);
		let rows = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			rows = fetch => rows?,
		};

		tracing::debug!(
			scope = query.scope.kind(),
			rows = rows.len(),
			"Content query executed against Postgres."
		);

		Ok(rows.into_iter().map(ContentRow::into_record).collect())
	}

	/// Inserts an item, deriving its tree level and parent from the page path.
	pub async fn insert(&self, item: &ContentItem) -> Result<i64> {
		let page = match item.page.as_ref() {
			Some(page) => {
				let path = TreePath::parse(&page.tree_path).ok_or_else(|| {
					Error::InvalidArgument(format!(
						"Page {} must not sit at the channel root.",
						item.guid
					))
				})?;

				Some((page, path))
			},
			None => None,
		};
		let level = page.as_ref().map(|(_, path)| path.depth() as i32);
		let parent_path =
			page.as_ref().and_then(|(_, path)| path.parent()).map(|parent| parent.to_string());
		let item_id: i64 = sqlx::query_scalar(
			"\
INSERT INTO content_items (
	item_guid,
	channel,
	content_type,
	language,
	is_page,
	node_name,
	tree_path,
	node_order,
	parent_id,
	node_level,
	is_published,
	is_secured,
	fields
)
VALUES (
	$1,
	$2,
	$3,
	$4,
	$5,
	$6,
	$7,
	$8,
	(
		SELECT item_id
		FROM content_items
		WHERE channel = $2 AND language = $4 AND is_page AND tree_path = $9
		ORDER BY item_id
		LIMIT 1
	),
	$10,
	$11,
	$12,
	$13
)
RETURNING item_id",
		)
		.bind(item.guid)
		.bind(item.channel.as_str())
		.bind(item.content_type.as_str())
		.bind(item.language.as_str())
		.bind(page.is_some())
		.bind(page.as_ref().map(|(node, _)| node.name.as_str()))
		.bind(page.as_ref().map(|(_, path)| path.as_str()))
		.bind(page.as_ref().and_then(|(node, _)| node.order))
		.bind(parent_path)
		.bind(level)
		.bind(item.published)
		.bind(item.secured)
		.bind(serde_json::Value::Object(item.fields.clone()))
		.fetch_one(&self.pool)
		.await?;

		Ok(item_id)
	}
}

/// Renders a structured query as a parameterized `SELECT`.
///
/// Every caller-supplied value is bound. Field names only ever reach the SQL text as bound
/// JSON keys or through the fixed identity column map.
pub fn build_select<'q>(
	query: &StructuredQuery,
	options: &ExecutionOptions,
) -> QueryBuilder<'q, Postgres> {
	let mut builder = QueryBuilder::new(SELECT_COLUMNS);

	builder.push_bind(options.channel.clone());
	builder.push(" AND language = ").push_bind(query.language.clone());

	if !options.preview {
		builder.push(" AND is_published");
	}
	if !options.include_secured {
		builder.push(" AND NOT is_secured");
	}
	if let Some(content_type) = query.content_type.as_ref() {
		builder.push(" AND lower(content_type) = lower(").push_bind(content_type.clone()).push(")");
	}

	push_scope(&mut builder, &query.scope);

	for predicate in &query.predicates {
		match predicate.op {
			PredicateOp::Equals => {
				builder
					.push(" AND fields ->> ")
					.push_bind(predicate.field.clone())
					.push(" = ")
					.push_bind(predicate.literal.clone());
			},
			PredicateOp::Contains => {
				builder
					.push(" AND strpos(lower(fields ->> ")
					.push_bind(predicate.field.clone())
					.push("), lower(")
					.push_bind(predicate.literal.clone())
					.push(")) > 0");
			},
		}
	}

	match query.order.as_ref() {
		Some(order) => {
			builder.push(" ORDER BY ");

			match IdentityField::from_name(&order.field) {
				Some(field) => {
					builder.push(identity_column(field));
				},
				None => {
					builder.push("fields -> ").push_bind(order.field.clone());
				},
			}

			builder.push(" ").push(order.direction.as_sql()).push(" NULLS LAST, item_id ASC");
		},
		None => {
			builder.push(" ORDER BY item_id ASC");
		},
	}

	let offset = query.pagination.offset();

	if offset > 0 {
		builder.push(" OFFSET ").push_bind(i64::from(offset));
	}
	if let Some(limit) = query.pagination.limit() {
		builder.push(" LIMIT ").push_bind(i64::from(limit));
	}

	builder
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &ScopeFilter) {
	match scope {
		ScopeFilter::Single(path) => {
			builder.push(" AND tree_path = ").push_bind(path.to_string());
		},
		ScopeFilter::Children(path) => {
			let prefix = like_escape(&format!("{path}/"));

			builder
				.push(" AND tree_path LIKE ")
				.push_bind(format!("{prefix}%"))
				.push(" AND tree_path NOT LIKE ")
				.push_bind(format!("{prefix}%/%"));
		},
		ScopeFilter::Subtree(path) => {
			let prefix = like_escape(&format!("{path}/"));

			builder
				.push(" AND (tree_path = ")
				.push_bind(path.to_string())
				.push(" OR tree_path LIKE ")
				.push_bind(format!("{prefix}%"))
				.push(")");
		},
		ScopeFilter::None => {},
	}
}

fn identity_column(field: IdentityField) -> &'static str {
	match field {
		IdentityField::Id => "item_id",
		IdentityField::Guid => "item_guid",
		IdentityField::Name => "node_name",
		IdentityField::TreePath => "tree_path",
		IdentityField::Order => "node_order",
		IdentityField::ParentId => "parent_id",
		IdentityField::Level => "node_level",
	}
}

fn like_escape(raw: &str) -> String {
	let mut escaped = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '\\' | '%' | '_') {
			escaped.push('\\');
		}

		escaped.push(ch);
	}

	escaped
}
