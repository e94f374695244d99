use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{QueryNote, is_field_name, record};

const FILTER_OPERATORS: [(&str, FilterOperator); 4] = [
	("=", FilterOperator::Equals),
	(">", FilterOperator::GreaterThan),
	("<", FilterOperator::LessThan),
	("Contains", FilterOperator::Contains),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
	#[default]
	Ascending,
	Descending,
}
impl Direction {
	pub fn as_sql(self) -> &'static str {
		match self {
			Self::Ascending => "ASC",
			Self::Descending => "DESC",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderSpec {
	pub field: String,
	pub direction: Direction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
	Equals,
	Contains,
}

/// The comparison a caller asked for before it was narrowed to equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeComparison {
	GreaterThan,
	LessThan,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Predicate {
	pub field: String,
	pub op: PredicateOp,
	pub literal: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub degraded_from: Option<RangeComparison>,
}
impl Predicate {
	pub fn equals(field: impl Into<String>, literal: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			op: PredicateOp::Equals,
			literal: literal.into(),
			degraded_from: None,
		}
	}

	pub fn contains(field: impl Into<String>, literal: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			op: PredicateOp::Contains,
			literal: literal.into(),
			degraded_from: None,
		}
	}

	/// Evaluates the predicate against a record's field bag.
	///
	/// Values are compared by their text rendering, the same way a JSON `->>` projection
	/// renders them. `Contains` is case-insensitive. Missing and null fields never match.
	pub fn matches(&self, fields: &Map<String, Value>) -> bool {
		let Some(text) = fields.get(&self.field).and_then(record::json_text) else {
			return false;
		};

		match self.op {
			PredicateOp::Equals => text == self.literal,
			PredicateOp::Contains => text.to_lowercase().contains(&self.literal.to_lowercase()),
		}
	}
}

#[derive(Clone, Copy, Debug)]
enum FilterOperator {
	Equals,
	GreaterThan,
	LessThan,
	Contains,
}

/// Parses `"<field> [ASC|DESC]"`.
///
/// Only a second token equal to `DESC` (any case) flips the direction.
pub fn parse_order(raw: &str, notes: &mut Vec<QueryNote>) -> Option<OrderSpec> {
	let mut tokens = raw.split_whitespace();
	let field = tokens.next()?;

	if !is_field_name(field) {
		tracing::warn!(order_by = raw, "Order expression ignored; field is not an identifier.");
		notes.push(QueryNote::new("order.invalid_field", raw));

		return None;
	}

	let direction = match tokens.next() {
		Some(token) if token.eq_ignore_ascii_case("desc") => Direction::Descending,
		_ => Direction::Ascending,
	};

	Some(OrderSpec { field: field.to_string(), direction })
}

/// Parses a single `field <op> literal` clause.
///
/// Operators are searched in the fixed order `=`, `>`, `<`, `Contains`; the first one found in
/// the input wins. `>` and `<` are accepted but produce an equality predicate on the raw literal.
/// Anything unparseable is dropped with a note and never reported as an error.
pub fn parse_filter(raw: &str, notes: &mut Vec<QueryNote>) -> Option<Predicate> {
	let raw = raw.trim();

	if raw.is_empty() {
		return None;
	}

	let Some((token, operator)) =
		FILTER_OPERATORS.iter().copied().find(|(token, _)| raw.contains(token))
	else {
		tracing::warn!(filter = raw, "Filter ignored; no supported operator found.");
		notes.push(QueryNote::new("filter.no_operator", raw));

		return None;
	};
	let parts = raw.split(token).collect::<Vec<_>>();
	let [field, literal] = parts.as_slice() else {
		tracing::debug!(filter = raw, parts = parts.len(), "Filter ignored; operand split failed.");
		notes.push(QueryNote::new("filter.split_count", raw));

		return None;
	};
	let field = field.trim();

	if !is_field_name(field) {
		tracing::warn!(filter = raw, "Filter ignored; field is not an identifier.");
		notes.push(QueryNote::new("filter.invalid_field", raw));

		return None;
	}

	let literal = strip_quotes(literal.trim());

	match operator {
		FilterOperator::Equals => Some(Predicate::equals(field, literal)),
		FilterOperator::Contains => Some(Predicate::contains(field, literal)),
		FilterOperator::GreaterThan | FilterOperator::LessThan => {
			let comparison = match operator {
				FilterOperator::GreaterThan => RangeComparison::GreaterThan,
				_ => RangeComparison::LessThan,
			};

			notes.push(QueryNote::new(
				"filter.range_as_equality",
				format!("{field} compared by equality to {literal:?} ({}).", literal_kind(literal)),
			));

			Some(Predicate {
				field: field.to_string(),
				op: PredicateOp::Equals,
				literal: literal.to_string(),
				degraded_from: Some(comparison),
			})
		},
	}
}

fn strip_quotes(raw: &str) -> &str {
	for quote in ['"', '\''] {
		if raw.len() >= 2
			&& let Some(inner) = raw.strip_prefix(quote).and_then(|rest| rest.strip_suffix(quote))
		{
			return inner;
		}
	}

	raw
}

fn literal_kind(literal: &str) -> &'static str {
	if literal.parse::<f64>().is_ok() {
		"numeric literal"
	} else if OffsetDateTime::parse(literal, &Rfc3339).is_ok() {
		"date literal"
	} else {
		"text literal"
	}
}
