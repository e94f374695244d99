use std::collections::HashSet;

use serde_json::{Map, Value};

use dynq_domain::{ContentTypeRegistry, IdentityField, RawContentRecord};

/// A flattened record: identity fields first, then content fields, in insertion order.
pub type NormalizedItem = Map<String, Value>;

pub struct ResultNormalizer {
	registry: ContentTypeRegistry,
	excluded_fields: HashSet<String>,
}
impl ResultNormalizer {
	pub fn new(registry: ContentTypeRegistry, excluded_fields: &[String]) -> Self {
		Self { registry, excluded_fields: excluded_fields.iter().cloned().collect() }
	}

	pub fn registry(&self) -> &ContentTypeRegistry {
		&self.registry
	}

	pub fn normalize_all(&self, records: Vec<RawContentRecord>) -> Vec<NormalizedItem> {
		records.into_iter().map(|record| self.normalize(record)).collect()
	}

	pub fn normalize(&self, record: RawContentRecord) -> NormalizedItem {
		let mut item = identity_fields(&record);
		let RawContentRecord { content_type, mut fields, .. } = record;

		match self.registry.get(&content_type) {
			Some(schema) =>
				for field in schema.fields.iter().filter(|field| field.is_exposed()) {
					if item.contains_key(&field.name) {
						continue;
					}

					let Some(value) = fields.remove(&field.name) else {
						continue;
					};

					match field.convert(&value) {
						Ok(converted) => {
							item.insert(field.name.clone(), converted);
						},
						Err(err) => {
							tracing::debug!(
								content_type = %content_type,
								field = %err.field,
								error = %err,
								"Field dropped; value does not match its declared kind."
							);
						},
					}
				},
			None =>
				for (name, value) in fields {
					if item.contains_key(&name) || self.excluded_fields.contains(&name) {
						continue;
					}

					item.insert(name, value);
				},
		}

		item
	}
}

/// Identity values of hierarchical records win over same-named content fields.
fn identity_fields(record: &RawContentRecord) -> NormalizedItem {
	let mut item = Map::new();

	for field in IdentityField::ALL {
		let value = match record.page.as_ref() {
			Some(page) => field.value_of(page),
			None => field.default_value(),
		};

		if let Some(value) = value {
			item.insert(field.as_str().to_string(), value);
		}
	}

	item
}
