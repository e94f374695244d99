use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::QueryNote;

/// A normalized, non-root tree path such as `/News/2024`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TreePath(String);
impl TreePath {
	/// Returns `None` for the root path.
	pub fn parse(raw: &str) -> Option<Self> {
		let normalized = normalize_path(raw);

		if normalized == "/" { None } else { Some(Self(normalized)) }
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Number of path segments; `/News/2024` has depth 2.
	pub fn depth(&self) -> usize {
		self.0.split('/').filter(|segment| !segment.is_empty()).count()
	}

	/// The enclosing path, or `None` when the parent is the root.
	pub fn parent(&self) -> Option<Self> {
		let (parent, _) = self.0.rsplit_once('/')?;

		Self::parse(parent)
	}

	fn descendant_prefix(&self) -> String {
		format!("{}/", self.0)
	}
}
impl Display for TreePath {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ScopeFilter {
	/// Exactly the page at the path.
	Single(TreePath),
	/// Direct descendants of the path.
	Children(TreePath),
	/// The page at the path and every descendant.
	Subtree(TreePath),
	/// No path restriction.
	None,
}
impl ScopeFilter {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Single(_) => "single",
			Self::Children(_) => "children",
			Self::Subtree(_) => "subtree",
			Self::None => "none",
		}
	}

	pub fn path(&self) -> Option<&TreePath> {
		match self {
			Self::Single(path) | Self::Children(path) | Self::Subtree(path) => Some(path),
			Self::None => None,
		}
	}

	/// Whether a record at `tree_path` falls inside this scope.
	///
	/// Records without a tree path only match [`ScopeFilter::None`].
	pub fn matches(&self, tree_path: Option<&str>) -> bool {
		let Some(tree_path) = tree_path else {
			return matches!(self, Self::None);
		};

		match self {
			Self::Single(path) => tree_path == path.as_str(),
			Self::Children(path) => tree_path
				.strip_prefix(&path.descendant_prefix())
				.map(|rest| !rest.is_empty() && !rest.contains('/'))
				.unwrap_or(false),
			Self::Subtree(path) =>
				tree_path == path.as_str() || tree_path.starts_with(&path.descendant_prefix()),
			Self::None => true,
		}
	}
}

/// Trims whitespace, collapses empty segments, enforces a leading `/` and drops a trailing one.
pub fn normalize_path(raw: &str) -> String {
	let segments = raw.trim().split('/').filter(|segment| !segment.is_empty()).collect::<Vec<_>>();

	if segments.is_empty() { "/".to_string() } else { format!("/{}", segments.join("/")) }
}

/// Maps the caller's path and traversal hints to a tree scope.
///
/// `nesting_level` only switches between children and subtree; it is not a depth bound.
pub fn resolve_scope(
	path: &str,
	root_path: &str,
	only_this_page: bool,
	nesting_level: i32,
	notes: &mut Vec<QueryNote>,
) -> ScopeFilter {
	let normalized = normalize_path(path);
	let is_root = normalized == "/" || normalized == normalize_path(root_path);
	let tree_path = if is_root { None } else { TreePath::parse(&normalized) };

	match tree_path {
		Some(path) if only_this_page => ScopeFilter::Single(path),
		None => {
			if only_this_page {
				tracing::warn!(
					path = %normalized,
					"Single-page scope requested at the channel root."
				);
				notes.push(QueryNote::new(
					"scope.single_at_root",
					format!("{normalized} is the channel root; no path restriction applied."),
				));
			}

			ScopeFilter::None
		},
		Some(path) if nesting_level > 0 => ScopeFilter::Children(path),
		Some(path) => ScopeFilter::Subtree(path),
	}
}
