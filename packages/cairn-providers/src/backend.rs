use std::{future::Future, pin::Pin};

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Model runtime hosted inside an in-process sandbox.
pub trait InferenceBackend
where
	Self: Send + Sync,
{
	/// Loads the model. Called once per sandbox before any embedding.
	fn load(&self) -> BoxFuture<'_, Result<()>>;

	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

	fn unload(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}
