#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlite(#[from] rusqlite::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Snapshot rejected: {0}")]
	CorruptSnapshot(String),
	#[error("Migration {version} failed: {message}")]
	Migration { version: u32, message: String },
	#[error("Vector search is unavailable.")]
	VectorUnavailable,
}
