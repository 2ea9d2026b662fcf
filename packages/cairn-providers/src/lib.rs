pub mod backend;
pub mod embedding;
pub mod engine;
pub mod protocol;
pub mod sandbox;

mod error;

pub use backend::{BoxFuture, InferenceBackend};
pub use engine::{EmbeddingEngine, Sandbox};
pub use error::Error;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if !api_key.is_empty() {
		headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {api_key}"))?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(raw)?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_bearer_and_default_headers() {
		let mut defaults = Map::new();

		defaults.insert("x-team".to_string(), Value::String("notes".to_string()));

		let headers = auth_headers("secret", &defaults).expect("Failed to build headers.");

		assert_eq!(headers[AUTHORIZATION], "Bearer secret");
		assert_eq!(headers["x-team"], "notes");
	}

	#[test]
	fn rejects_non_string_header_values() {
		let mut defaults = Map::new();

		defaults.insert("x-retries".to_string(), Value::from(3));

		assert!(matches!(auth_headers("", &defaults), Err(Error::InvalidConfig { .. })));
	}
}
