pub mod db;
pub mod memory;
pub mod models;
pub mod pg;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

use tokio_util::sync::CancellationToken;

use dynq_config::{Storage, StorageBackend};
use dynq_domain::{RawContentRecord, StructuredQuery};

use crate::{db::Db, memory::MemoryContentStore, pg::PgContentStore};

/// Visibility flags derived from the active channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOptions {
	pub channel: String,
	/// Include unpublished items.
	pub preview: bool,
	pub include_secured: bool,
}

/// The configured content store backend.
pub enum ContentStore {
	Postgres(PgContentStore),
	Memory(MemoryContentStore),
}
impl ContentStore {
	pub async fn open(cfg: &Storage) -> Result<Self> {
		match cfg.backend {
			StorageBackend::Postgres => {
				let postgres = cfg.postgres.as_ref().ok_or_else(|| {
					Error::InvalidArgument("storage.postgres is not configured.".to_string())
				})?;
				let db = Db::connect(postgres).await?;

				db.ensure_schema().await?;

				Ok(Self::Postgres(PgContentStore::new(db.pool)))
			},
			StorageBackend::Memory => {
				let store = match cfg.memory.seed_path.as_deref() {
					Some(path) => MemoryContentStore::from_seed_file(path)?,
					None => MemoryContentStore::default(),
				};

				Ok(Self::Memory(store))
			},
		}
	}

	pub async fn run(
		&self,
		query: &StructuredQuery,
		options: &ExecutionOptions,
		cancel: &CancellationToken,
	) -> Result<Vec<RawContentRecord>> {
		match self {
			Self::Postgres(store) => store.run(query, options, cancel).await,
			Self::Memory(store) => store.run(query, options, cancel),
		}
	}
}
