#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Inference worker failed to initialize: {message}")]
	InitFailed { message: String },
	#[error("Inference worker did not become ready within {timeout_ms} ms.")]
	InitTimeout { timeout_ms: u64 },
	#[error("Embedding request {id} timed out after {timeout_ms} ms.")]
	RequestTimeout { id: u64, timeout_ms: u64 },
	#[error("Embedding request {id} was rejected: {message}")]
	Rejected { id: u64, message: String },
	#[error("Embedding engine was disposed.")]
	Disposed,
	#[error("Inference worker exited.")]
	WorkerGone,
}
