//! Background corpus (re-)embedding. Work is strictly sequential with a short yield between items
//! so the host stays responsive; pause and cancel are honoured between items only.

use std::{
	collections::VecDeque,
	future::Future,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use serde::Serialize;
use tokio::{
	sync::watch,
	time::{self, Instant},
};

use cairn_config::Indexing;

use crate::{EmbedOutcome, EmbeddingService, Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingPhase {
	Idle,
	LoadingModel,
	Indexing,
	Paused,
	Complete,
	Error,
	Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexingProgress {
	pub phase: IndexingPhase,
	pub total_items: usize,
	pub processed_items: usize,
	pub current_item: Option<String>,
	pub estimated_seconds_remaining: Option<u64>,
	pub error: Option<String>,
}
impl IndexingProgress {
	fn idle() -> Self {
		Self {
			phase: IndexingPhase::Idle,
			total_items: 0,
			processed_items: 0,
			current_item: None,
			estimated_seconds_remaining: None,
			error: None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IndexReport {
	pub phase: IndexingPhase,
	pub total: usize,
	pub processed: usize,
	pub failed: usize,
}

pub struct IndexingQueue {
	service: Arc<EmbeddingService>,
	cfg: Indexing,
	running: AtomicBool,
	paused: AtomicBool,
	cancelled: AtomicBool,
	progress: watch::Sender<IndexingProgress>,
}
impl IndexingQueue {
	pub fn new(service: Arc<EmbeddingService>, cfg: Indexing) -> Self {
		let (progress, _) = watch::channel(IndexingProgress::idle());

		Self {
			service,
			cfg,
			running: AtomicBool::new(false),
			paused: AtomicBool::new(false),
			cancelled: AtomicBool::new(false),
			progress,
		}
	}

	pub fn subscribe(&self) -> watch::Receiver<IndexingProgress> {
		self.progress.subscribe()
	}

	pub fn progress(&self) -> IndexingProgress {
		self.progress.borrow().clone()
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	pub fn pause(&self) {
		self.paused.store(true, Ordering::SeqCst);
	}

	pub fn resume(&self) {
		self.paused.store(false, Ordering::SeqCst);
	}

	/// Cooperative: the item in flight finishes first.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	/// Embeds every document whose preprocessed text no longer matches its stored hash.
	pub async fn start_full_index(&self) -> Result<IndexReport> {
		let _run = self.begin()?;

		if !self.service.enabled() {
			return Ok(self.finish_empty());
		}

		let ids = match self.service.source().list_documents().await {
			Ok(ids) => ids,
			Err(err) => return Err(self.fail(err)),
		};
		let stored = match self.service.db().document_hashes() {
			Ok(stored) => stored,
			Err(err) => return Err(self.fail(err.into())),
		};
		let mut outdated = Vec::new();

		for id in ids {
			if self.cancelled.load(Ordering::SeqCst) {
				break;
			}

			match self.service.prepare_document(&id).await {
				Ok(doc) => {
					let current = stored.get(&doc.id).is_some_and(|hash| *hash == doc.hash);

					// Empty text with nothing stored has nothing to do either.
					if !current && !(doc.text.is_empty() && !stored.contains_key(&doc.id)) {
						outdated.push(doc);
					}
				},
				Err(err) => tracing::warn!(document_id = %id, error = %err, "Failed to read document. Skipping."),
			}
		}

		tracing::info!(outdated = outdated.len(), "Document scan finished.");

		self.drive(
			outdated,
			|doc| doc.id.clone(),
			|doc| {
				let service = self.service.clone();

				async move { service.embed_prepared(&doc).await }
			},
		)
		.await
	}

	/// Embeds stored traces lacking a current embedding. Shares the single-flight guard with
	/// [`Self::start_full_index`].
	pub async fn start_trace_backfill(&self) -> Result<IndexReport> {
		let _run = self.begin()?;

		if !self.service.enabled() {
			return Ok(self.finish_empty());
		}

		let db = self.service.db();
		let (traces, stored) = match db.list_traces().and_then(|t| Ok((t, db.trace_hashes()?))) {
			Ok(found) => found,
			Err(err) => return Err(self.fail(err.into())),
		};
		let outdated = traces
			.into_iter()
			.map(|trace| self.service.prepare_trace(trace))
			.filter(|prepared| {
				!prepared.text.is_empty()
					&& stored.get(&prepared.trace.id).is_none_or(|hash| *hash != prepared.hash)
			})
			.collect::<Vec<_>>();

		tracing::info!(outdated = outdated.len(), "Trace scan finished.");

		self.drive(
			outdated,
			|prepared| prepared.trace.id.clone(),
			|prepared| {
				let service = self.service.clone();

				async move { service.embed_prepared_trace(&prepared).await }
			},
		)
		.await
	}

	async fn drive<T, L, S, F>(&self, items: Vec<T>, label: L, step: S) -> Result<IndexReport>
	where
		L: Fn(&T) -> String,
		S: Fn(T) -> F,
		F: Future<Output = Result<EmbedOutcome>>,
	{
		let total = items.len();

		if self.cancelled.load(Ordering::SeqCst) {
			return Ok(self.finish(IndexingPhase::Cancelled, total, 0, 0));
		}
		if total == 0 {
			return Ok(self.finish_empty());
		}

		self.publish(IndexingProgress {
			phase: IndexingPhase::LoadingModel,
			total_items: total,
			..IndexingProgress::idle()
		});

		if let Err(err) = self.service.embedder().initialize().await {
			return Err(self.fail(err));
		}

		let yield_for = Duration::from_millis(self.cfg.yield_ms);
		let flush_every = self.cfg.flush_every.max(1) as usize;
		let eta_window = self.cfg.eta_window.max(1) as usize;
		let mut durations = VecDeque::with_capacity(eta_window);
		let mut processed = 0;
		let mut failed = 0;

		self.publish(IndexingProgress {
			phase: IndexingPhase::Indexing,
			total_items: total,
			..IndexingProgress::idle()
		});

		for item in items {
			if !self.wait_while_paused(total, processed).await {
				break;
			}

			let current = label(&item);

			self.progress.send_modify(|progress| progress.current_item = Some(current.clone()));

			let started = Instant::now();

			if let Err(err) = step(item).await {
				failed += 1;

				tracing::warn!(item = %current, error = %err, "Failed to index item. Skipping.");
			}

			processed += 1;

			if durations.len() == eta_window {
				durations.pop_front();
			}

			durations.push_back(started.elapsed());

			if processed % flush_every == 0 {
				self.flush().await;
			}

			let average = durations.iter().sum::<Duration>() / durations.len() as u32;
			let eta = average * (total - processed) as u32;

			self.publish(IndexingProgress {
				phase: IndexingPhase::Indexing,
				total_items: total,
				processed_items: processed,
				current_item: Some(current),
				estimated_seconds_remaining: Some(eta.as_secs()),
				error: None,
			});

			if processed < total {
				time::sleep(yield_for).await;
			}
		}

		self.flush().await;

		let phase = if processed < total && self.cancelled.load(Ordering::SeqCst) {
			IndexingPhase::Cancelled
		} else {
			IndexingPhase::Complete
		};

		tracing::info!(?phase, total, processed, failed, "Indexing pass finished.");

		Ok(self.finish(phase, total, processed, failed))
	}

	/// Returns `false` when cancelled, including while paused.
	async fn wait_while_paused(&self, total: usize, processed: usize) -> bool {
		if self.cancelled.load(Ordering::SeqCst) {
			return false;
		}
		if !self.paused.load(Ordering::SeqCst) {
			return true;
		}

		self.progress.send_modify(|progress| progress.phase = IndexingPhase::Paused);

		tracing::info!(total, processed, "Indexing paused.");

		let poll = Duration::from_millis(self.cfg.pause_poll_ms.max(1));

		while self.paused.load(Ordering::SeqCst) {
			if self.cancelled.load(Ordering::SeqCst) {
				return false;
			}

			time::sleep(poll).await;
		}

		self.progress.send_modify(|progress| progress.phase = IndexingPhase::Indexing);

		tracing::info!("Indexing resumed.");

		!self.cancelled.load(Ordering::SeqCst)
	}

	async fn flush(&self) {
		if let Err(err) = self.service.db().save().await {
			tracing::error!(error = %err, "Failed to save snapshot during indexing.");
		}
	}

	fn begin(&self) -> Result<RunGuard<'_>> {
		if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
			return Err(Error::AlreadyRunning);
		}

		self.paused.store(false, Ordering::SeqCst);
		self.cancelled.store(false, Ordering::SeqCst);

		Ok(RunGuard(&self.running))
	}

	fn finish_empty(&self) -> IndexReport {
		self.finish(IndexingPhase::Complete, 0, 0, 0)
	}

	fn finish(&self, phase: IndexingPhase, total: usize, processed: usize, failed: usize) -> IndexReport {
		self.publish(IndexingProgress {
			phase,
			total_items: total,
			processed_items: processed,
			..IndexingProgress::idle()
		});

		IndexReport { phase, total, processed, failed }
	}

	fn fail(&self, err: Error) -> Error {
		tracing::error!(error = %err, "Indexing pass failed.");

		self.progress.send_modify(|progress| {
			progress.phase = IndexingPhase::Error;
			progress.current_item = None;
			progress.estimated_seconds_remaining = None;
			progress.error = Some(err.to_string());
		});

		err
	}

	fn publish(&self, progress: IndexingProgress) {
		self.progress.send_replace(progress);
	}
}

struct RunGuard<'a>(&'a AtomicBool);
impl Drop for RunGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}
