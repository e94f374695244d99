use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use dynq_domain::{PageIdentity, RawContentRecord};

/// Placement of an item in the content tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
	pub name: String,
	pub tree_path: String,
	#[serde(default)]
	pub order: Option<i32>,
}

/// An item as written to a content store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
	#[serde(default = "Uuid::new_v4")]
	pub guid: Uuid,
	pub channel: String,
	pub content_type: String,
	pub language: String,
	#[serde(default)]
	pub page: Option<PageNode>,
	#[serde(default = "default_published")]
	pub published: bool,
	#[serde(default)]
	pub secured: bool,
	#[serde(default)]
	pub fields: Map<String, Value>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ContentRow {
	pub item_id: i64,
	pub item_guid: Uuid,
	pub content_type: String,
	pub language: String,
	pub is_page: bool,
	pub node_name: Option<String>,
	pub tree_path: Option<String>,
	pub node_order: Option<i32>,
	pub parent_id: Option<i64>,
	pub node_level: Option<i32>,
	pub fields: Value,
}
impl ContentRow {
	pub fn into_record(self) -> RawContentRecord {
		let fields = match self.fields {
			Value::Object(map) => map,
			other => {
				tracing::warn!(
					item_id = self.item_id,
					kind = json_kind(&other),
					"Content row fields are not an object; exposing identity only."
				);

				Map::new()
			},
		};
		let page = match (self.is_page, self.tree_path) {
			(true, Some(tree_path)) => Some(PageIdentity {
				id: self.item_id,
				guid: self.item_guid,
				name: self.node_name.unwrap_or_default(),
				tree_path,
				order: self.node_order,
				parent_id: self.parent_id,
				level: self.node_level,
			}),
			_ => None,
		};

		RawContentRecord { content_type: self.content_type, language: self.language, fields, page }
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

fn default_published() -> bool {
	true
}
