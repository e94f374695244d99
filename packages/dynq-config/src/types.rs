use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub channel: Channel,
	#[serde(default)]
	pub query: Query,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub normalizer: Normalizer,
	pub security: Security,
	#[serde(default)]
	pub content_types: Vec<ContentType>,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub backend: StorageBackend,
	pub postgres: Option<Postgres>,
	#[serde(default)]
	pub memory: Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
	Postgres,
	Memory,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct Memory {
	/// Optional JSON file with the records the in-memory store starts with.
	pub seed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
	pub name: String,
	#[serde(default = "default_language")]
	pub default_language: String,
	#[serde(default = "default_root_path")]
	pub root_path: String,
	#[serde(default)]
	pub preview: bool,
	#[serde(default = "default_true")]
	pub include_secured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Query {
	/// Upper bound for a single execution engine call.
	pub deadline_ms: u64,
}
impl Default for Query {
	fn default() -> Self {
		Self { deadline_ms: 5_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub ttl_secs: u64,
	pub max_entries: usize,
	/// Serialize concurrent misses on the same key so only one of them reaches the engine.
	pub coalesce_misses: bool,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: true, ttl_secs: 300, max_entries: 1_024, coalesce_misses: false }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Normalizer {
	/// Field names that are never copied from an unregistered record's field bag.
	pub excluded_fields: Vec<String>,
}
impl Default for Normalizer {
	fn default() -> Self {
		Self { excluded_fields: vec!["SystemFields".to_string(), "LinkedItems".to_string()] }
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	#[serde(default)]
	pub enforce_api_key: bool,
	pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentType {
	pub name: String,
	#[serde(default)]
	pub fields: Vec<ContentField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentField {
	pub name: String,
	pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
	Text,
	Integer,
	Decimal,
	Boolean,
	DateTime,
	Guid,
	Json,
	/// Internal back-reference to another record. Never exposed.
	Reference,
}

fn default_language() -> String {
	"en-US".to_string()
}

fn default_root_path() -> String {
	"/".to_string()
}

fn default_true() -> bool {
	true
}
