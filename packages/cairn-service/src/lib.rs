pub mod content;
pub mod embeddings;
pub mod events;
pub mod indexing;
pub mod ranking;
pub mod source;

mod error;

pub use cairn_providers::BoxFuture;
pub use embeddings::{
	DocumentResult, EmbedOutcome, EmbeddingService, PreparedDocument, PreparedTrace, TraceResult,
};
pub use error::Error;
pub use indexing::{IndexReport, IndexingPhase, IndexingProgress, IndexingQueue};
pub use source::{DocumentEvent, DocumentSource};

use cairn_providers::EmbeddingEngine;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Text-to-vector capability the service depends on.
pub trait Embedder
where
	Self: Send + Sync,
{
	fn model(&self) -> &str;

	fn initialize(&self) -> BoxFuture<'_, Result<()>>;

	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;
}

impl Embedder for EmbeddingEngine {
	fn model(&self) -> &str {
		EmbeddingEngine::model(self)
	}

	fn initialize(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { Ok(EmbeddingEngine::initialize(self).await?) })
	}

	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(EmbeddingEngine::embed(self, text).await?) })
	}
}
