use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use tokio::{
	sync::{mpsc, oneshot},
	task::JoinHandle,
	time,
};

use crate::{
	Error, InferenceBackend, Result,
	embedding::HttpBackend,
	protocol::{WorkerReply, WorkerRequest},
	sandbox::{self, SandboxChannels, SandboxHandle},
};

const DISPOSE_GRACE: Duration = Duration::from_secs(2);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Vec<Vec<f32>>>>>>>;

/// Where the inference worker runs.
#[derive(Clone)]
pub enum Sandbox {
	Task(Arc<dyn InferenceBackend>),
	Process { program: String, args: Vec<String> },
}

/// Produces fixed-dimension vectors through an isolated worker. Requests carry correlation ids, so
/// replies may arrive in any order.
pub struct EmbeddingEngine {
	sandbox: Sandbox,
	model: String,
	dimensions: usize,
	init_timeout: Duration,
	request_timeout: Duration,
	next_id: AtomicU64,
	init_lock: tokio::sync::Mutex<()>,
	worker: Mutex<Option<Worker>>,
}
impl EmbeddingEngine {
	pub fn new(
		sandbox: Sandbox,
		model: impl Into<String>,
		dimensions: u32,
		init_timeout: Duration,
		request_timeout: Duration,
	) -> Self {
		Self {
			sandbox,
			model: model.into(),
			dimensions: dimensions as usize,
			init_timeout,
			request_timeout,
			next_id: AtomicU64::new(1),
			init_lock: tokio::sync::Mutex::new(()),
			worker: Mutex::new(None),
		}
	}

	pub fn from_config(cfg: &cairn_config::Embedding) -> Result<Self> {
		let sandbox = match cfg.backend {
			cairn_config::EmbeddingBackend::Http => Sandbox::Task(Arc::new(HttpBackend::new(cfg)?)),
			cairn_config::EmbeddingBackend::Process => {
				let Some(process) = cfg.process.as_ref() else {
					return Err(Error::InvalidConfig {
						message: "embedding.process is required for the process backend.".to_string(),
					});
				};

				Sandbox::Process { program: process.program.clone(), args: process.args.clone() }
			},
		};

		Ok(Self::new(
			sandbox,
			cfg.model.clone(),
			cfg.dimensions,
			Duration::from_millis(cfg.init_timeout_ms),
			Duration::from_millis(cfg.request_timeout_ms),
		))
	}

	pub fn model(&self) -> &str {
		&self.model
	}

	pub fn dimensions(&self) -> usize {
		self.dimensions
	}

	pub fn is_ready(&self) -> bool {
		lock(&self.worker).as_ref().is_some_and(Worker::is_alive)
	}

	/// Starts the worker once. Concurrent callers wait on the same startup; a worker that exited
	/// is replaced.
	pub async fn initialize(&self) -> Result<()> {
		if self.is_ready() {
			return Ok(());
		}

		let _guard = self.init_lock.lock().await;

		if self.is_ready() {
			return Ok(());
		}

		let stale = lock(&self.worker).take();

		if let Some(stale) = stale {
			tracing::warn!("Inference worker exited. Restarting.");
			stale.shutdown(|| Error::WorkerGone, Duration::ZERO).await;
		}

		let worker = self.start_worker().await?;

		*lock(&self.worker) = Some(worker);

		tracing::info!(model = %self.model, dimensions = self.dimensions, "Embedding engine ready.");

		Ok(())
	}

	pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let mut vectors = self.embed_batch(&[text.to_string()]).await?;

		vectors.pop().ok_or_else(|| Error::InvalidResponse {
			message: "Worker returned no vector.".to_string(),
		})
	}

	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		self.initialize().await?;

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		let pending = {
			let worker = lock(&self.worker);
			let Some(worker) = worker.as_ref() else {
				return Err(Error::Disposed);
			};

			lock(&worker.pending).insert(id, tx);

			if worker.requests.send(WorkerRequest::Embed { id, texts: texts.to_vec() }).is_err() {
				lock(&worker.pending).remove(&id);

				return Err(Error::WorkerGone);
			}

			worker.pending.clone()
		};

		match time::timeout(self.request_timeout, rx).await {
			Ok(Ok(result)) => self.check_vectors(texts.len(), result?),
			Ok(Err(_)) => Err(Error::Disposed),
			Err(_) => {
				lock(&pending).remove(&id);

				tracing::warn!(id, "Embedding request timed out.");

				Err(Error::RequestTimeout { id, timeout_ms: self.request_timeout.as_millis() as u64 })
			},
		}
	}

	/// Unloads and tears down the worker. Safe to call when nothing was started; in-flight
	/// requests fail with [`Error::Disposed`].
	pub async fn dispose(&self) {
		let _guard = self.init_lock.lock().await;
		let worker = lock(&self.worker).take();
		let Some(worker) = worker else {
			tracing::debug!("Embedding engine has no worker to dispose.");

			return;
		};

		worker.shutdown(|| Error::Disposed, DISPOSE_GRACE).await;

		tracing::info!("Embedding engine disposed.");
	}

	async fn start_worker(&self) -> Result<Worker> {
		let SandboxChannels { requests, mut replies, handle } = match &self.sandbox {
			Sandbox::Task(backend) => sandbox::spawn_task(backend.clone()),
			Sandbox::Process { program, args } => sandbox::spawn_process(program, args)?,
		};

		if requests.send(WorkerRequest::Init).is_err() {
			handle.shutdown(Duration::ZERO).await;

			return Err(Error::WorkerGone);
		}

		let ready = time::timeout(self.init_timeout, async {
			loop {
				match replies.recv().await {
					Some(WorkerReply::Ready) => return Ok(()),
					Some(WorkerReply::InitFailed { message }) => return Err(Error::InitFailed { message }),
					Some(other) => tracing::debug!(reply = ?other, "Ignoring reply before ready."),
					None => return Err(Error::WorkerGone),
				}
			}
		})
		.await;

		match ready {
			Ok(Ok(())) => {},
			Ok(Err(err)) => {
				handle.shutdown(Duration::ZERO).await;

				return Err(err);
			},
			Err(_) => {
				let _ = requests.send(WorkerRequest::Unload);

				handle.shutdown(Duration::ZERO).await;

				return Err(Error::InitTimeout { timeout_ms: self.init_timeout.as_millis() as u64 });
			},
		}

		let pending = Pending::default();
		let router = tokio::spawn(route_replies(replies, pending.clone()));

		Ok(Worker { requests, pending, router, handle })
	}

	fn check_vectors(&self, expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
		if vectors.len() != expected {
			return Err(Error::InvalidResponse {
				message: format!("Expected {expected} vectors but the worker returned {}.", vectors.len()),
			});
		}
		if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimensions) {
			return Err(Error::InvalidResponse {
				message: format!(
					"Expected {} dimensions but the worker returned {}.",
					self.dimensions,
					bad.len()
				),
			});
		}

		Ok(vectors)
	}
}

struct Worker {
	requests: mpsc::UnboundedSender<WorkerRequest>,
	pending: Pending,
	router: JoinHandle<()>,
	handle: SandboxHandle,
}
impl Worker {
	fn is_alive(&self) -> bool {
		!self.requests.is_closed() && !self.router.is_finished()
	}

	/// In-flight requests fail with the error `fail` builds.
	async fn shutdown(self, fail: fn() -> Error, grace: Duration) {
		let waiting: Vec<_> = lock(&self.pending).drain().collect();

		for (id, tx) in waiting {
			tracing::debug!(id, "Failing in-flight request on shutdown.");

			let _ = tx.send(Err(fail()));
		}

		let _ = self.requests.send(WorkerRequest::Unload);

		self.router.abort();
		self.handle.shutdown(grace).await;
	}
}

async fn route_replies(mut replies: mpsc::UnboundedReceiver<WorkerReply>, pending: Pending) {
	while let Some(reply) = replies.recv().await {
		let (id, result) = match reply {
			WorkerReply::Embedded { id, vectors } => (id, Ok(vectors)),
			WorkerReply::Failed { id, message } => (id, Err(Error::Rejected { id, message })),
			other => {
				tracing::debug!(reply = ?other, "Ignoring unsolicited worker reply.");

				continue;
			},
		};
		let waiter = lock(&pending).remove(&id);

		match waiter {
			Some(tx) =>
				if tx.send(result).is_err() {
					tracing::debug!(id, "Requester is gone. Dropping reply.");
				},
			None => tracing::debug!(id, "Dropping reply with no waiting request."),
		}
	}

	let orphaned: Vec<_> = lock(&pending).drain().collect();

	if !orphaned.is_empty() {
		tracing::warn!(count = orphaned.len(), "Inference worker exited with requests in flight.");
	}

	for (_, tx) in orphaned {
		let _ = tx.send(Err(Error::WorkerGone));
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
