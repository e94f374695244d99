use std::collections::HashMap;

use serde_json::{Number, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use dynq_config::{ContentType, FieldKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConversionError {
	pub field: String,
	pub kind: FieldKind,
	pub message: String,
}
impl std::fmt::Display for FieldConversionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({:?}): {}", self.field, self.kind, self.message)
	}
}

impl std::error::Error for FieldConversionError {}

#[derive(Debug, Clone)]
pub struct FieldSchema {
	pub name: String,
	pub kind: FieldKind,
}
impl FieldSchema {
	pub fn is_exposed(&self) -> bool {
		!matches!(self.kind, FieldKind::Reference)
	}

	/// Converts a raw value to the declared kind. Null passes through unchanged.
	pub fn convert(&self, value: &Value) -> Result<Value, FieldConversionError> {
		if value.is_null() {
			return Ok(Value::Null);
		}

		let converted = match self.kind {
			FieldKind::Text => match value {
				Value::String(_) => Some(value.clone()),
				Value::Number(number) => Some(Value::String(number.to_string())),
				Value::Bool(flag) => Some(Value::String(flag.to_string())),
				_ => None,
			},
			FieldKind::Integer => match value {
				Value::Number(number) => number
					.as_i64()
					.or_else(|| number.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
					.map(Value::from),
				Value::String(text) => text.trim().parse::<i64>().ok().map(Value::from),
				_ => None,
			},
			FieldKind::Decimal => match value {
				Value::Number(_) => Some(value.clone()),
				Value::String(text) => text
					.trim()
					.parse::<f64>()
					.ok()
					.and_then(Number::from_f64)
					.map(Value::Number),
				_ => None,
			},
			FieldKind::Boolean => match value {
				Value::Bool(_) => Some(value.clone()),
				Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
					"true" => Some(Value::Bool(true)),
					"false" => Some(Value::Bool(false)),
					_ => None,
				},
				Value::Number(number) => match number.as_i64() {
					Some(0) => Some(Value::Bool(false)),
					Some(1) => Some(Value::Bool(true)),
					_ => None,
				},
				_ => None,
			},
			FieldKind::DateTime => value
				.as_str()
				.and_then(|text| OffsetDateTime::parse(text.trim(), &Rfc3339).ok())
				.and_then(|parsed| parsed.format(&Rfc3339).ok())
				.map(Value::String),
			FieldKind::Guid => value
				.as_str()
				.and_then(|text| Uuid::parse_str(text.trim()).ok())
				.map(|guid| Value::String(guid.to_string())),
			FieldKind::Json => Some(value.clone()),
			FieldKind::Reference => None,
		};

		converted.ok_or_else(|| FieldConversionError {
			field: self.name.clone(),
			kind: self.kind,
			message: format!("cannot convert {value} to {:?}.", self.kind),
		})
	}
}

#[derive(Debug, Clone)]
pub struct ContentTypeSchema {
	pub name: String,
	pub fields: Vec<FieldSchema>,
}

/// Content types known at startup, looked up case-insensitively by name.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeRegistry {
	types: HashMap<String, ContentTypeSchema>,
}
impl ContentTypeRegistry {
	pub fn from_config(content_types: &[ContentType]) -> Self {
		let types = content_types
			.iter()
			.map(|content_type| {
				let schema = ContentTypeSchema {
					name: content_type.name.clone(),
					fields: content_type
						.fields
						.iter()
						.map(|field| FieldSchema { name: field.name.clone(), kind: field.kind })
						.collect(),
				};

				(content_type.name.to_ascii_lowercase(), schema)
			})
			.collect();

		Self { types }
	}

	pub fn get(&self, name: &str) -> Option<&ContentTypeSchema> {
		self.types.get(&name.to_ascii_lowercase())
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}
}
