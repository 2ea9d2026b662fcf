//! Reacting to document source notifications. Edits are debounced per document so a burst of
//! saves costs one embedding.

use std::sync::{Arc, Mutex, MutexGuard, atomic::Ordering};

use tokio::time;

use crate::{DocumentEvent, EmbeddingService, Result};

impl EmbeddingService {
	/// Deletions and renames apply immediately; creations and edits are debounced.
	pub fn handle_event(self: &Arc<Self>, event: DocumentEvent) -> Result<()> {
		if !self.enabled() {
			return Ok(());
		}

		match event {
			DocumentEvent::Created(id) | DocumentEvent::Modified(id) => self.schedule(id),
			DocumentEvent::Deleted(id) => {
				self.cancel_scheduled(&id);

				if self.remove_document(&id)? {
					tracing::info!(document_id = %id, "Removed embedding for deleted document.");
				}
			},
			DocumentEvent::Renamed { from, to } => {
				let was_pending = self.cancel_scheduled(&from);

				if self.rename_document(&from, &to)? {
					tracing::info!(from = %from, to = %to, "Moved embedding to renamed document.");
				}
				if was_pending {
					self.schedule(to);
				}
			},
		}

		Ok(())
	}

	pub fn pending_changes(&self) -> usize {
		lock(&self.pending).len()
	}

	/// Drops every scheduled re-embed without running it.
	pub fn cancel_all_pending(&self) {
		for (_, (_, task)) in lock(&self.pending).drain() {
			task.abort();
		}
	}

	fn schedule(self: &Arc<Self>, id: String) {
		let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
		let service = Arc::downgrade(self);
		let delay = self.debounce;
		let document_id = id.clone();
		// Held across the spawn so a zero delay cannot fire before the entry exists.
		let mut pending = lock(&self.pending);
		let task = tokio::spawn(async move {
			time::sleep(delay).await;

			let Some(service) = service.upgrade() else { return };

			{
				let mut pending = lock(&service.pending);

				if !pending.get(&document_id).is_some_and(|(current, _)| *current == generation) {
					return;
				}

				pending.remove(&document_id);
			}

			match service.embed_document(&document_id).await {
				Ok(outcome) => tracing::debug!(document_id = %document_id, ?outcome, "Re-embed finished."),
				Err(err) => tracing::warn!(
					document_id = %document_id,
					error = %err,
					"Failed to re-embed changed document.",
				),
			}
		});

		if let Some((_, previous)) = pending.insert(id, (generation, task)) {
			previous.abort();
		}
	}

	fn cancel_scheduled(&self, id: &str) -> bool {
		match lock(&self.pending).remove(id) {
			Some((_, task)) => {
				task.abort();

				true
			},
			None => false,
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
