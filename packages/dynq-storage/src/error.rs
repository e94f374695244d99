use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Failed to load content seed at {path:?}: {message}")]
	Seed { path: PathBuf, message: String },
	#[error("Content query was cancelled.")]
	Cancelled,
}
