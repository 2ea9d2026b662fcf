use std::{
	collections::HashMap,
	sync::{Arc, Mutex, atomic::AtomicU64},
	time::Duration,
};

use serde::Serialize;
use tokio::task::JoinHandle;

use cairn_config::{Config, Ranking};
use cairn_storage::{
	Db,
	embeddings::{DocumentUpsert, TraceUpsert},
	models::Trace,
};

use crate::{
	DocumentSource, Embedder, Result,
	content::{self, Limits},
	ranking,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedOutcome {
	Embedded { row_id: i64 },
	/// Stored hash already matches; no inference happened.
	Unchanged,
	/// Disabled, or too little text after preprocessing.
	Skipped,
}

/// A document read and hashed once, ready to embed without another read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedDocument {
	pub id: String,
	pub text: String,
	pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedTrace {
	pub trace: Trace,
	pub text: String,
	pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentResult {
	pub document_id: String,
	pub row_id: i64,
	pub distance: f64,
	pub score: f64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceResult {
	pub trace_id: String,
	pub session_id: Option<String>,
	pub distance: f64,
	pub score: f64,
	pub created_at: i64,
}

pub struct EmbeddingService {
	db: Arc<Db>,
	embedder: Arc<dyn Embedder>,
	source: Arc<dyn DocumentSource>,
	enabled: bool,
	limits: Limits,
	ranking: Ranking,
	pub(crate) debounce: Duration,
	pub(crate) pending: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
	pub(crate) generation: AtomicU64,
}
impl EmbeddingService {
	pub fn new(
		cfg: &Config,
		db: Arc<Db>,
		embedder: Arc<dyn Embedder>,
		source: Arc<dyn DocumentSource>,
	) -> Self {
		let enabled = cfg.embedding.enabled && db.vector_enabled();

		if !enabled {
			tracing::info!(
				configured = cfg.embedding.enabled,
				vector_enabled = db.vector_enabled(),
				"Embedding service is disabled.",
			);
		}

		Self {
			db,
			embedder,
			source,
			enabled,
			limits: Limits::from_config(&cfg.indexing),
			ranking: cfg.ranking.clone(),
			debounce: Duration::from_millis(cfg.indexing.reembed_debounce_ms),
			pending: Mutex::new(HashMap::new()),
			generation: AtomicU64::new(0),
		}
	}

	pub fn enabled(&self) -> bool {
		self.enabled
	}

	pub fn db(&self) -> &Arc<Db> {
		&self.db
	}

	pub fn embedder(&self) -> &Arc<dyn Embedder> {
		&self.embedder
	}

	pub fn source(&self) -> &Arc<dyn DocumentSource> {
		&self.source
	}

	pub async fn prepare_document(&self, id: &str) -> Result<PreparedDocument> {
		let raw = self.source.read_document(id).await?;
		let text = content::preprocess(&raw, self.limits);
		let hash = if text.is_empty() { String::new() } else { content::content_hash(&text) };

		Ok(PreparedDocument { id: id.to_string(), text, hash })
	}

	pub fn prepare_trace(&self, trace: Trace) -> PreparedTrace {
		let text = content::normalize(&trace.content, self.limits);
		let hash = if text.is_empty() { String::new() } else { content::content_hash(&text) };

		PreparedTrace { trace, text, hash }
	}

	pub async fn embed_document(&self, id: &str) -> Result<EmbedOutcome> {
		if !self.enabled {
			return Ok(EmbedOutcome::Skipped);
		}

		let doc = self.prepare_document(id).await?;

		self.embed_prepared(&doc).await
	}

	pub async fn embed_prepared(&self, doc: &PreparedDocument) -> Result<EmbedOutcome> {
		if !self.enabled {
			return Ok(EmbedOutcome::Skipped);
		}
		if doc.text.is_empty() {
			// A document that shrank below the minimum must not keep matching on old text.
			if self.db.delete_document_embedding(&doc.id)? {
				tracing::debug!(document_id = %doc.id, "Dropped embedding for near-empty document.");
			}

			return Ok(EmbedOutcome::Skipped);
		}
		if let Some(stored) = self.db.document_embedding(&doc.id)?
			&& stored.content_hash == doc.hash
		{
			return Ok(EmbedOutcome::Unchanged);
		}

		let vector = self.embedder.embed(&doc.text).await?;
		let row_id = self.db.upsert_document_embedding(&DocumentUpsert {
			document_id: &doc.id,
			content_hash: &doc.hash,
			model: self.embedder.model(),
			vector: &vector,
		})?;

		tracing::debug!(document_id = %doc.id, row_id, "Document embedded.");

		Ok(EmbedOutcome::Embedded { row_id })
	}

	pub fn remove_document(&self, id: &str) -> Result<bool> {
		if !self.enabled {
			return Ok(false);
		}

		Ok(self.db.delete_document_embedding(id)?)
	}

	pub fn rename_document(&self, old_id: &str, new_id: &str) -> Result<bool> {
		if !self.enabled {
			return Ok(false);
		}

		Ok(self.db.rename_document_embedding(old_id, new_id)?)
	}

	pub async fn similarity_search(&self, query: &str, limit: usize) -> Result<Vec<DocumentResult>> {
		let query = query.trim();

		if !self.enabled || limit == 0 || query.is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.embedder.embed(query).await?;
		let candidates = self.db.nearest_documents(&vector, self.candidate_count(limit))?;
		let now = cairn_storage::now_ms();
		let weighted = candidates
			.into_iter()
			.map(|hit| {
				let boost = ranking::recency_boost(
					now,
					hit.updated_at,
					self.ranking.recency_window_days,
					self.ranking.max_recency_boost,
				) + ranking::lexical_boost(
					query,
					&hit.document_id,
					self.ranking.path_match_boost,
					self.ranking.term_match_boost,
				);
				let distance = hit.distance;

				(hit, distance, boost)
			})
			.collect();

		Ok(ranking::rerank(weighted, self.ranking.max_total_boost, limit)
			.into_iter()
			.map(|scored| DocumentResult {
				document_id: scored.item.document_id,
				row_id: scored.item.row_id,
				distance: scored.distance,
				score: scored.score,
				updated_at: scored.item.updated_at,
			})
			.collect())
	}

	pub async fn embed_trace(&self, trace: &Trace) -> Result<EmbedOutcome> {
		if !self.enabled {
			return Ok(EmbedOutcome::Skipped);
		}

		self.embed_prepared_trace(&self.prepare_trace(trace.clone())).await
	}

	pub async fn embed_prepared_trace(&self, prepared: &PreparedTrace) -> Result<EmbedOutcome> {
		if !self.enabled || prepared.text.is_empty() {
			return Ok(EmbedOutcome::Skipped);
		}
		if let Some(stored) = self.db.trace_embedding(&prepared.trace.id)?
			&& stored.content_hash == prepared.hash
		{
			return Ok(EmbedOutcome::Unchanged);
		}

		let vector = self.embedder.embed(&prepared.text).await?;
		let row_id = self.db.upsert_trace_embedding(&TraceUpsert {
			trace_id: &prepared.trace.id,
			workspace_id: &prepared.trace.workspace_id,
			session_id: prepared.trace.session_id.as_deref(),
			content_hash: &prepared.hash,
			model: self.embedder.model(),
			vector: &vector,
		})?;

		tracing::debug!(trace_id = %prepared.trace.id, row_id, "Trace embedded.");

		Ok(EmbedOutcome::Embedded { row_id })
	}

	/// Recency-only re-rank within one workspace.
	pub async fn search_traces(
		&self,
		query: &str,
		workspace_id: &str,
		limit: usize,
	) -> Result<Vec<TraceResult>> {
		let query = query.trim();

		if !self.enabled || limit == 0 || query.is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.embedder.embed(query).await?;
		let candidates =
			self.db.nearest_traces(&vector, workspace_id, self.candidate_count(limit))?;
		let now = cairn_storage::now_ms();
		let weighted = candidates
			.into_iter()
			.map(|hit| {
				let boost = ranking::recency_boost(
					now,
					hit.created_at,
					self.ranking.trace_recency_window_days,
					self.ranking.max_recency_boost,
				);
				let distance = hit.distance;

				(hit, distance, boost)
			})
			.collect();

		Ok(ranking::rerank(weighted, self.ranking.max_total_boost, limit)
			.into_iter()
			.map(|scored| TraceResult {
				trace_id: scored.item.trace_id,
				session_id: scored.item.session_id,
				distance: scored.distance,
				score: scored.score,
				created_at: scored.item.created_at,
			})
			.collect())
	}

	fn candidate_count(&self, limit: usize) -> usize {
		limit.saturating_mul(self.ranking.candidate_multiplier.max(1) as usize)
	}
}
