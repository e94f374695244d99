pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Execution engine error: {message}")]
	Engine { message: String },
	#[error("Cache error: {message}")]
	Cache { message: String },
	#[error("Runtime error: {message}")]
	Runtime { message: String },
}
impl From<dynq_storage::Error> for Error {
	fn from(err: dynq_storage::Error) -> Self {
		match err {
			dynq_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Engine { message: other.to_string() },
		}
	}
}
