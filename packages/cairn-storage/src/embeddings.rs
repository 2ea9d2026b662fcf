//! Embedding metadata rows and their vector rows. Each metadata row owns exactly one vector row
//! sharing its `row_id`.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};

use crate::{
	Db, Error, Result,
	models::{DocumentEmbedding, DocumentMatch, TraceEmbedding, TraceMatch},
	vector,
};

/// Largest `k` the vec0 KNN planner accepts.
const MAX_KNN: usize = 4_096;

pub struct DocumentUpsert<'a> {
	pub document_id: &'a str,
	pub content_hash: &'a str,
	pub model: &'a str,
	pub vector: &'a [f32],
}

pub struct TraceUpsert<'a> {
	pub trace_id: &'a str,
	pub workspace_id: &'a str,
	pub session_id: Option<&'a str>,
	pub content_hash: &'a str,
	pub model: &'a str,
	pub vector: &'a [f32],
}

impl Db {
	pub fn document_embedding(&self, document_id: &str) -> Result<Option<DocumentEmbedding>> {
		self.ensure_vectors()?;
		self.read(|conn| document_embedding(conn, document_id))
	}

	/// Maps every embedded document id to its stored content hash.
	pub fn document_hashes(&self) -> Result<HashMap<String, String>> {
		self.ensure_vectors()?;
		self.read(|conn| hashes(conn, "SELECT document_id, content_hash FROM document_embeddings"))
	}

	/// Inserts or overwrites in place; returns the shared row id.
	pub fn upsert_document_embedding(&self, upsert: &DocumentUpsert<'_>) -> Result<i64> {
		self.ensure_vectors()?;
		self.check_dim(upsert.vector)?;
		self.transaction(|tx| upsert_document_embedding(tx, upsert, crate::now_ms()))
	}

	pub fn delete_document_embedding(&self, document_id: &str) -> Result<bool> {
		self.ensure_vectors()?;
		self.transaction(|tx| delete_document_embedding(tx, document_id))
	}

	/// Re-keys the metadata row. An embedding already stored under `new_id` is replaced.
	pub fn rename_document_embedding(&self, old_id: &str, new_id: &str) -> Result<bool> {
		self.ensure_vectors()?;

		if old_id == new_id {
			return self.read(|conn| Ok(document_embedding(conn, old_id)?.is_some()));
		}

		self.transaction(|tx| {
			if document_embedding(tx, old_id)?.is_none() {
				return Ok(false);
			}

			delete_document_embedding(tx, new_id)?;

			let changes = tx.execute(
				"UPDATE document_embeddings SET document_id = ?2, updated_at = ?3 WHERE document_id = ?1",
				(old_id, new_id, crate::now_ms()),
			)?;

			Ok(changes > 0)
		})
	}

	/// Ascending by distance. `k` is clamped to what the vector index can answer.
	pub fn nearest_documents(&self, query: &[f32], k: usize) -> Result<Vec<DocumentMatch>> {
		self.ensure_vectors()?;
		self.check_dim(query)?;

		if k == 0 {
			return Ok(Vec::new());
		}

		self.query(
			"\
SELECT e.row_id, e.document_id, e.updated_at, v.distance
FROM document_vectors v
JOIN document_embeddings e ON e.row_id = v.rowid
WHERE v.embedding MATCH ?1 AND v.k = ?2
ORDER BY v.distance ASC",
			(vector::encode(query), k.min(MAX_KNN) as i64),
			|row| {
				Ok(DocumentMatch {
					row_id: row.get(0)?,
					document_id: row.get(1)?,
					updated_at: row.get(2)?,
					distance: row.get(3)?,
				})
			},
		)
	}

	pub fn trace_embedding(&self, trace_id: &str) -> Result<Option<TraceEmbedding>> {
		self.ensure_vectors()?;
		self.read(|conn| trace_embedding(conn, trace_id))
	}

	pub fn trace_hashes(&self) -> Result<HashMap<String, String>> {
		self.ensure_vectors()?;
		self.read(|conn| hashes(conn, "SELECT trace_id, content_hash FROM trace_embeddings"))
	}

	pub fn upsert_trace_embedding(&self, upsert: &TraceUpsert<'_>) -> Result<i64> {
		self.ensure_vectors()?;
		self.check_dim(upsert.vector)?;
		self.transaction(|tx| upsert_trace_embedding(tx, upsert, crate::now_ms()))
	}

	/// Exhaustive scan restricted to one workspace, ascending by distance.
	pub fn nearest_traces(
		&self,
		query: &[f32],
		workspace_id: &str,
		k: usize,
	) -> Result<Vec<TraceMatch>> {
		self.ensure_vectors()?;
		self.check_dim(query)?;

		if k == 0 {
			return Ok(Vec::new());
		}

		self.query(
			"\
SELECT e.row_id, e.trace_id, e.session_id, e.created_at,
	vec_distance_l2(v.embedding, ?1) AS distance
FROM trace_embeddings e
JOIN trace_vectors v ON v.rowid = e.row_id
WHERE e.workspace_id = ?2
ORDER BY distance ASC, e.row_id ASC
LIMIT ?3",
			(vector::encode(query), workspace_id, k as i64),
			|row| {
				Ok(TraceMatch {
					row_id: row.get(0)?,
					trace_id: row.get(1)?,
					session_id: row.get(2)?,
					created_at: row.get(3)?,
					distance: row.get(4)?,
				})
			},
		)
	}

	fn ensure_vectors(&self) -> Result<()> {
		if self.vector_enabled() { Ok(()) } else { Err(Error::VectorUnavailable) }
	}

	fn check_dim(&self, vector: &[f32]) -> Result<()> {
		if vector.len() == self.vector_dim() as usize {
			return Ok(());
		}

		Err(Error::InvalidArgument(format!(
			"Vector has {} dimensions but the store expects {}.",
			vector.len(),
			self.vector_dim()
		)))
	}
}

pub fn document_embedding(conn: &Connection, document_id: &str) -> Result<Option<DocumentEmbedding>> {
	let found = conn
		.query_row(
			"\
SELECT row_id, document_id, content_hash, model, created_at, updated_at
FROM document_embeddings
WHERE document_id = ?1",
			[document_id],
			|row| {
				Ok(DocumentEmbedding {
					row_id: row.get(0)?,
					document_id: row.get(1)?,
					content_hash: row.get(2)?,
					model: row.get(3)?,
					created_at: row.get(4)?,
					updated_at: row.get(5)?,
				})
			},
		)
		.optional()?;

	Ok(found)
}

pub fn upsert_document_embedding(
	conn: &Connection,
	upsert: &DocumentUpsert<'_>,
	now: i64,
) -> Result<i64> {
	let row_id = match document_embedding(conn, upsert.document_id)? {
		Some(existing) => {
			conn.execute(
				"\
UPDATE document_embeddings
SET content_hash = ?2, model = ?3, updated_at = ?4
WHERE row_id = ?1",
				(existing.row_id, upsert.content_hash, upsert.model, now),
			)?;

			existing.row_id
		},
		None => {
			conn.execute(
				"\
INSERT INTO document_embeddings (document_id, content_hash, model, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?4)",
				(upsert.document_id, upsert.content_hash, upsert.model, now),
			)?;

			conn.last_insert_rowid()
		},
	};

	write_vector(conn, "document_vectors", row_id, upsert.vector)?;

	Ok(row_id)
}

pub fn delete_document_embedding(conn: &Connection, document_id: &str) -> Result<bool> {
	let Some(existing) = document_embedding(conn, document_id)? else {
		return Ok(false);
	};

	conn.execute("DELETE FROM document_vectors WHERE rowid = ?1", [existing.row_id])?;
	conn.execute("DELETE FROM document_embeddings WHERE row_id = ?1", [existing.row_id])?;

	Ok(true)
}

pub fn trace_embedding(conn: &Connection, trace_id: &str) -> Result<Option<TraceEmbedding>> {
	let found = conn
		.query_row(
			"\
SELECT row_id, trace_id, workspace_id, session_id, model, content_hash, created_at
FROM trace_embeddings
WHERE trace_id = ?1",
			[trace_id],
			|row| {
				Ok(TraceEmbedding {
					row_id: row.get(0)?,
					trace_id: row.get(1)?,
					workspace_id: row.get(2)?,
					session_id: row.get(3)?,
					model: row.get(4)?,
					content_hash: row.get(5)?,
					created_at: row.get(6)?,
				})
			},
		)
		.optional()?;

	Ok(found)
}

pub fn upsert_trace_embedding(
	conn: &Connection,
	upsert: &TraceUpsert<'_>,
	now: i64,
) -> Result<i64> {
	let row_id = match trace_embedding(conn, upsert.trace_id)? {
		Some(existing) => {
			conn.execute(
				"\
UPDATE trace_embeddings
SET workspace_id = ?2, session_id = ?3, model = ?4, content_hash = ?5
WHERE row_id = ?1",
				(
					existing.row_id,
					upsert.workspace_id,
					upsert.session_id,
					upsert.model,
					upsert.content_hash,
				),
			)?;

			existing.row_id
		},
		None => {
			conn.execute(
				"\
INSERT INTO trace_embeddings (trace_id, workspace_id, session_id, model, content_hash, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
				(
					upsert.trace_id,
					upsert.workspace_id,
					upsert.session_id,
					upsert.model,
					upsert.content_hash,
					now,
				),
			)?;

			conn.last_insert_rowid()
		},
	};

	write_vector(conn, "trace_vectors", row_id, upsert.vector)?;

	Ok(row_id)
}

/// vec0 tables do not support upsert, so the row is replaced.
fn write_vector(conn: &Connection, table: &str, row_id: i64, values: &[f32]) -> Result<()> {
	conn.execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [row_id])?;
	conn.execute(
		&format!("INSERT INTO {table} (rowid, embedding) VALUES (?1, ?2)"),
		(row_id, vector::encode(values)),
	)?;

	Ok(())
}

fn hashes(conn: &Connection, sql: &str) -> Result<HashMap<String, String>> {
	let mut stmt = conn.prepare(sql)?;
	let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
	let mut out = HashMap::new();

	for row in rows {
		let (id, hash) = row?;

		out.insert(id, hash);
	}

	Ok(out)
}
