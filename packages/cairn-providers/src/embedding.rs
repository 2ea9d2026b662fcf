use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde::Deserialize;
use serde_json::Value;

use crate::{BoxFuture, Error, InferenceBackend, Result};

/// OpenAI-compatible `/embeddings` endpoint.
pub struct HttpBackend {
	client: Client,
	url: String,
	headers: HeaderMap,
	model: String,
	dimensions: u32,
}
impl HttpBackend {
	pub fn new(cfg: &cairn_config::Embedding) -> Result<Self> {
		let Some(http) = cfg.http.as_ref() else {
			return Err(Error::InvalidConfig {
				message: "embedding.http is required for the http backend.".to_string(),
			});
		};
		let client = Client::builder().timeout(Duration::from_millis(http.timeout_ms)).build()?;

		Ok(Self {
			client,
			url: format!("{}{}", http.api_base.trim_end_matches('/'), http.path),
			headers: crate::auth_headers(&http.api_key, &http.default_headers)?,
			model: cfg.model.clone(),
			dimensions: cfg.dimensions,
		})
	}

	async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let body = serde_json::json!({
			"model": self.model,
			"input": texts,
			"dimensions": self.dimensions,
		});
		let res =
			self.client.post(&self.url).headers(self.headers.clone()).json(&body).send().await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_embedding_response(json)
	}
}
impl InferenceBackend for HttpBackend {
	// The remote service owns the model; nothing to load.
	fn load(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(self.request(texts))
	}
}

/// Body of an `/embeddings` reply. Some servers answer 200 with an `error` object instead of data.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingReply {
	Data { data: Vec<EmbeddingItem> },
	Error { error: Value },
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Orders vectors by their `index`, falling back to position when the server omits it. Every
/// slot in `0..data.len()` must be filled exactly once.
pub fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let items = match serde_json::from_value::<EmbeddingReply>(json) {
		Ok(EmbeddingReply::Data { data }) => data,
		Ok(EmbeddingReply::Error { error }) => {
			let message = error.get("message").and_then(Value::as_str).map_or_else(
				|| error.to_string(),
				str::to_string,
			);

			return Err(Error::InvalidResponse {
				message: format!("Embedding server reported an error: {message}"),
			});
		},
		Err(err) => {
			return Err(Error::InvalidResponse {
				message: format!("Embedding reply has no usable data array: {err}."),
			});
		},
	};
	let count = items.len();
	let mut slots: Vec<Option<Vec<f32>>> = vec![None; count];

	for (position, item) in items.into_iter().enumerate() {
		let index = item.index.unwrap_or(position);
		let Some(slot) = slots.get_mut(index) else {
			return Err(Error::InvalidResponse {
				message: format!("Embedding index {index} is outside the {count}-item reply."),
			});
		};

		if slot.replace(item.embedding).is_some() {
			return Err(Error::InvalidResponse {
				message: format!("Embedding index {index} appears more than once."),
			});
		}
	}

	// Lengths match, so no slot can be empty once every index was unique and in range.
	Ok(slots.into_iter().flatten().collect())
}
