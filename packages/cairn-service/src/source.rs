use crate::{BoxFuture, Result};

/// The document corpus as seen by the embedding pipeline. Ids are stable paths.
pub trait DocumentSource
where
	Self: Send + Sync,
{
	fn list_documents(&self) -> BoxFuture<'_, Result<Vec<String>>>;

	fn read_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<String>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentEvent {
	Created(String),
	Modified(String),
	Deleted(String),
	Renamed { from: String, to: String },
}
