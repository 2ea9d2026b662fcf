mod error;

pub use error::{Error, Result};

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use tempfile::TempDir;
use tokio::time;

use cairn_config::{
	Config, Corpus, Embedding, EmbeddingBackend, Indexing, Ranking, Service, Storage,
};
use cairn_providers::{BoxFuture, InferenceBackend};
use cairn_service::{DocumentSource, Embedder};
use cairn_storage::{Db, migrate::Migrator};

pub const DEFAULT_DIM: u32 = 8;

/// A snapshot location inside a private temp directory, removed on drop.
pub struct TestStore {
	dir: TempDir,
	cfg: Config,
}
impl TestStore {
	pub fn new() -> Result<Self> {
		Self::with_dim(DEFAULT_DIM)
	}

	pub fn with_dim(dim: u32) -> Result<Self> {
		let dir = tempfile::tempdir()?;
		let cfg = test_config(dir.path().join("cairn.sqlite3"), dir.path().join("corpus"), dim);

		Ok(Self { dir, cfg })
	}

	pub fn dir(&self) -> &Path {
		self.dir.path()
	}

	pub fn snapshot_path(&self) -> &Path {
		&self.cfg.storage.snapshot_path
	}

	pub fn config(&self) -> &Config {
		&self.cfg
	}

	pub fn config_mut(&mut self) -> &mut Config {
		&mut self.cfg
	}

	pub async fn open(&self) -> Result<Arc<Db>> {
		Ok(Arc::new(Db::open(&self.cfg.storage).await?))
	}

	pub async fn open_migrated(&self) -> Result<Arc<Db>> {
		let db = self.open().await?;

		Migrator::new(&db).migrate()?;

		Ok(db)
	}
}

/// Configuration with test-friendly pacing: no yield between items.
pub fn test_config(snapshot_path: PathBuf, corpus_root: PathBuf, dim: u32) -> Config {
	Config {
		service: Service { log_level: "debug".to_string() },
		storage: Storage {
			snapshot_path,
			vector_dim: dim,
			autosave_interval_ms: 30_000,
			max_page_size: 200,
		},
		embedding: Embedding {
			enabled: true,
			model: "test-hash".to_string(),
			dimensions: dim,
			backend: EmbeddingBackend::Http,
			init_timeout_ms: 60_000,
			request_timeout_ms: 30_000,
			http: None,
			process: None,
		},
		indexing: Indexing { yield_ms: 0, ..Indexing::default() },
		ranking: Ranking::default(),
		corpus: Corpus { root: corpus_root, extensions: vec!["md".to_string()] },
	}
}

/// Unit-length vector derived from the text. Equal texts map to equal vectors.
pub fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
	let mut bytes = vec![0_u8; dim * 4];

	blake3::Hasher::new().update(text.as_bytes()).finalize_xof().fill(&mut bytes);

	let raw = bytes
		.chunks_exact(4)
		.map(|chunk| {
			let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);

			(value as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
		})
		.collect::<Vec<_>>();
	let norm = raw.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm == 0.0 { raw } else { raw.into_iter().map(|value| value / norm).collect() }
}

/// Scriptable in-process model for engine tests.
#[derive(Default)]
pub struct CountingBackend {
	dim: usize,
	load_delay: Duration,
	embed_delay: Duration,
	text_delays: HashMap<String, Duration>,
	fail_load: Option<String>,
	fail_texts: HashSet<String>,
	loads: AtomicUsize,
	embed_calls: AtomicUsize,
	unloads: AtomicUsize,
}
impl CountingBackend {
	pub fn new(dim: u32) -> Self {
		Self { dim: dim as usize, ..Default::default() }
	}

	pub fn with_load_delay(mut self, delay: Duration) -> Self {
		self.load_delay = delay;

		self
	}

	pub fn with_embed_delay(mut self, delay: Duration) -> Self {
		self.embed_delay = delay;

		self
	}

	/// Overrides the embed delay for batches containing `text`.
	pub fn with_text_delay(mut self, text: &str, delay: Duration) -> Self {
		self.text_delays.insert(text.to_string(), delay);

		self
	}

	pub fn failing_load(mut self, message: &str) -> Self {
		self.fail_load = Some(message.to_string());

		self
	}

	pub fn failing_on(mut self, text: &str) -> Self {
		self.fail_texts.insert(text.to_string());

		self
	}

	pub fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}

	pub fn embed_calls(&self) -> usize {
		self.embed_calls.load(Ordering::SeqCst)
	}

	pub fn unloads(&self) -> usize {
		self.unloads.load(Ordering::SeqCst)
	}
}
impl InferenceBackend for CountingBackend {
	fn load(&self) -> BoxFuture<'_, cairn_providers::Result<()>> {
		Box::pin(async move {
			if !self.load_delay.is_zero() {
				time::sleep(self.load_delay).await;
			}

			self.loads.fetch_add(1, Ordering::SeqCst);

			match &self.fail_load {
				Some(message) => Err(cairn_providers::Error::InvalidConfig { message: message.clone() }),
				None => Ok(()),
			}
		})
	}

	fn embed<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, cairn_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.embed_calls.fetch_add(1, Ordering::SeqCst);

			let delay = texts
				.iter()
				.filter_map(|text| self.text_delays.get(text).copied())
				.max()
				.unwrap_or(self.embed_delay);

			if !delay.is_zero() {
				time::sleep(delay).await;
			}
			if texts.iter().any(|text| self.fail_texts.contains(text)) {
				return Err(cairn_providers::Error::InvalidResponse {
					message: "Test backend rejected the input.".to_string(),
				});
			}

			Ok(texts.iter().map(|text| deterministic_vector(text, self.dim)).collect())
		})
	}

	fn unload(&self) -> BoxFuture<'_, cairn_providers::Result<()>> {
		Box::pin(async move {
			self.unloads.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

/// Direct [`Embedder`] for service tests; skips the worker entirely.
pub struct HashEmbedder {
	model: String,
	dim: usize,
	fail_init: Option<String>,
	fail_markers: Mutex<HashSet<String>>,
	calls: AtomicUsize,
	initializations: AtomicUsize,
}
impl HashEmbedder {
	pub fn new(dim: u32) -> Self {
		Self {
			model: "test-hash".to_string(),
			dim: dim as usize,
			fail_init: None,
			fail_markers: Mutex::new(HashSet::new()),
			calls: AtomicUsize::new(0),
			initializations: AtomicUsize::new(0),
		}
	}

	pub fn failing_init(mut self, message: &str) -> Self {
		self.fail_init = Some(message.to_string());

		self
	}

	/// Every later embed of text containing `marker` fails.
	pub fn fail_containing(&self, marker: &str) {
		lock(&self.fail_markers).insert(marker.to_string());
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn initializations(&self) -> usize {
		self.initializations.load(Ordering::SeqCst)
	}
}
impl Embedder for HashEmbedder {
	fn model(&self) -> &str {
		&self.model
	}

	fn initialize(&self) -> BoxFuture<'_, cairn_service::Result<()>> {
		Box::pin(async move {
			self.initializations.fetch_add(1, Ordering::SeqCst);

			match &self.fail_init {
				Some(message) => Err(cairn_providers::Error::InitFailed { message: message.clone() }.into()),
				None => Ok(()),
			}
		})
	}

	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, cairn_service::Result<Vec<f32>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if lock(&self.fail_markers).iter().any(|marker| text.contains(marker.as_str())) {
				return Err(cairn_providers::Error::Rejected {
					id: 0,
					message: "Test embedder rejected the input.".to_string(),
				}
				.into());
			}

			Ok(deterministic_vector(text, self.dim))
		})
	}
}

/// In-memory corpus keyed by document id.
#[derive(Default)]
pub struct MemoryCorpus {
	docs: Mutex<BTreeMap<String, String>>,
	reads: AtomicUsize,
}
impl MemoryCorpus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_documents<I, K, V>(documents: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let corpus = Self::default();

		for (id, text) in documents {
			corpus.insert(id, text);
		}

		corpus
	}

	pub fn insert(&self, id: impl Into<String>, text: impl Into<String>) {
		lock(&self.docs).insert(id.into(), text.into());
	}

	pub fn remove(&self, id: &str) -> Option<String> {
		lock(&self.docs).remove(id)
	}

	pub fn rename(&self, from: &str, to: &str) {
		let mut docs = lock(&self.docs);

		if let Some(text) = docs.remove(from) {
			docs.insert(to.to_string(), text);
		}
	}

	pub fn reads(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}
}
impl DocumentSource for MemoryCorpus {
	fn list_documents(&self) -> BoxFuture<'_, cairn_service::Result<Vec<String>>> {
		Box::pin(async move { Ok(lock(&self.docs).keys().cloned().collect()) })
	}

	fn read_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, cairn_service::Result<String>> {
		Box::pin(async move {
			self.reads.fetch_add(1, Ordering::SeqCst);

			lock(&self.docs).get(id).cloned().ok_or_else(|| cairn_service::Error::Source {
				message: format!("No document {id}."),
			})
		})
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
