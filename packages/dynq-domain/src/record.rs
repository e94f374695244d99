use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// System identity carried by records that live in the content tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIdentity {
	pub id: i64,
	pub guid: Uuid,
	pub name: String,
	pub tree_path: String,
	#[serde(default)]
	pub order: Option<i32>,
	#[serde(default)]
	pub parent_id: Option<i64>,
	#[serde(default)]
	pub level: Option<i32>,
}

/// A record as produced by an execution engine, before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawContentRecord {
	pub content_type: String,
	pub language: String,
	#[serde(default)]
	pub fields: Map<String, Value>,
	#[serde(default)]
	pub page: Option<PageIdentity>,
}
impl RawContentRecord {
	pub fn is_page(&self) -> bool {
		self.page.is_some()
	}

	pub fn tree_path(&self) -> Option<&str> {
		self.page.as_ref().map(|page| page.tree_path.as_str())
	}
}

/// Page identity fields as exposed on normalized items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityField {
	Id,
	Guid,
	Name,
	TreePath,
	Order,
	ParentId,
	Level,
}
impl IdentityField {
	pub const ALL: [Self; 7] =
		[
			Self::Id,
			Self::Guid,
			Self::Name,
			Self::TreePath,
			Self::Order,
			Self::ParentId,
			Self::Level,
		];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Id => "ID",
			Self::Guid => "GUID",
			Self::Name => "Name",
			Self::TreePath => "TreePath",
			Self::Order => "Order",
			Self::ParentId => "ParentID",
			Self::Level => "Level",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|field| field.as_str().eq_ignore_ascii_case(name))
	}

	/// The identity value of a page, `None` when the page does not carry it.
	pub fn value_of(self, page: &PageIdentity) -> Option<Value> {
		match self {
			Self::Id => Some(Value::from(page.id)),
			Self::Guid => Some(Value::String(page.guid.to_string())),
			Self::Name => Some(Value::String(page.name.clone())),
			Self::TreePath => Some(Value::String(page.tree_path.clone())),
			Self::Order => page.order.map(Value::from),
			Self::ParentId => page.parent_id.map(Value::from),
			Self::Level => page.level.map(Value::from),
		}
	}

	/// The value exposed for records outside the content tree, `None` when omitted.
	pub fn default_value(self) -> Option<Value> {
		match self {
			Self::Id => Some(Value::from(0)),
			Self::Guid | Self::Name | Self::TreePath => Some(Value::String(String::new())),
			Self::Order | Self::ParentId | Self::Level => None,
		}
	}
}

/// Renders a scalar JSON value the way a `->>` projection does. Null renders as `None`.
pub fn json_text(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::String(text) => Some(text.clone()),
		Value::Bool(flag) => Some(flag.to_string()),
		Value::Number(number) => Some(number.to_string()),
		other => Some(other.to_string()),
	}
}
