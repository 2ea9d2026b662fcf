use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub embedding: Embedding,
	#[serde(default)]
	pub indexing: Indexing,
	#[serde(default)]
	pub ranking: Ranking,
	pub corpus: Corpus,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	/// Snapshot file. Relative paths resolve against the working directory.
	pub snapshot_path: PathBuf,
	pub vector_dim: u32,
	#[serde(default = "default_autosave_interval_ms")]
	pub autosave_interval_ms: u64,
	#[serde(default = "default_max_page_size")]
	pub max_page_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
	Http,
	Process,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Embedding {
	/// Hard capability switch. When false the embedding service is inert.
	pub enabled: bool,
	pub model: String,
	pub dimensions: u32,
	pub backend: EmbeddingBackend,
	#[serde(default = "default_init_timeout_ms")]
	pub init_timeout_ms: u64,
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
	pub http: Option<HttpBackend>,
	pub process: Option<ProcessBackend>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HttpBackend {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProcessBackend {
	pub program: String,
	#[serde(default)]
	pub args: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Indexing {
	pub yield_ms: u64,
	pub flush_every: u32,
	pub eta_window: u32,
	pub pause_poll_ms: u64,
	pub reembed_debounce_ms: u64,
	pub min_content_chars: u32,
	pub max_content_chars: u32,
}
impl Default for Indexing {
	fn default() -> Self {
		Self {
			yield_ms: 50,
			flush_every: 10,
			eta_window: 20,
			pause_poll_ms: 100,
			reembed_debounce_ms: 10_000,
			min_content_chars: 20,
			max_content_chars: 8_000,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Ranking {
	/// Raw candidates fetched per requested result.
	pub candidate_multiplier: u32,
	pub recency_window_days: f32,
	pub max_recency_boost: f32,
	pub path_match_boost: f32,
	pub term_match_boost: f32,
	pub trace_recency_window_days: f32,
	/// Upper bound on the summed boost so a distance never collapses to zero.
	pub max_total_boost: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			candidate_multiplier: 3,
			recency_window_days: 30.0,
			max_recency_boost: 0.15,
			path_match_boost: 0.25,
			term_match_boost: 0.1,
			trace_recency_window_days: 7.0,
			max_total_boost: 0.9,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Corpus {
	pub root: PathBuf,
	#[serde(default = "default_extensions")]
	pub extensions: Vec<String>,
}

fn default_autosave_interval_ms() -> u64 {
	30_000
}

fn default_max_page_size() -> u32 {
	crate::MAX_PAGE_SIZE
}

fn default_init_timeout_ms() -> u64 {
	60_000
}

fn default_request_timeout_ms() -> u64 {
	30_000
}

fn default_extensions() -> Vec<String> {
	vec!["md".to_string()]
}
