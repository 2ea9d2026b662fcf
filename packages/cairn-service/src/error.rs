#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] cairn_storage::Error),
	#[error(transparent)]
	Provider(#[from] cairn_providers::Error),
	#[error("Document source failed: {message}")]
	Source { message: String },
	#[error("An indexing pass is already running.")]
	AlreadyRunning,
}
