use std::sync::Arc;

use crate::{
	Db, Result,
	models::{MessageHit, NoteHit},
};

/// Full-text lookups over notes and messages. Queries are matched as literal phrases.
#[derive(Clone)]
pub struct FullTextSearch {
	db: Arc<Db>,
}
impl FullTextSearch {
	pub fn new(db: Arc<Db>) -> Self {
		Self { db }
	}

	pub fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<NoteHit>> {
		let Some(phrase) = escape_fts_query(query) else {
			return Ok(Vec::new());
		};

		self.db.query(
			"\
SELECT n.id, n.path, n.title, snippet(notes_fts, 1, '[', ']', '...', 16), rank, n.updated_at
FROM notes_fts
JOIN notes n ON n.rowid = notes_fts.rowid
WHERE notes_fts MATCH ?1
ORDER BY rank ASC, n.updated_at DESC
LIMIT ?2",
			(phrase, limit as i64),
			|row| {
				Ok(NoteHit {
					id: row.get(0)?,
					path: row.get(1)?,
					title: row.get(2)?,
					snippet: row.get(3)?,
					rank: row.get(4)?,
					updated_at: row.get(5)?,
				})
			},
		)
	}

	pub fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<MessageHit>> {
		let Some(phrase) = escape_fts_query(query) else {
			return Ok(Vec::new());
		};

		self.db.query(
			"\
SELECT m.id, m.session_id, m.role, snippet(messages_fts, 0, '[', ']', '...', 16), rank, m.created_at
FROM messages_fts
JOIN messages m ON m.rowid = messages_fts.rowid
WHERE messages_fts MATCH ?1
ORDER BY rank ASC, m.created_at DESC
LIMIT ?2",
			(phrase, limit as i64),
			message_hit,
		)
	}

	pub fn search_session_messages(
		&self,
		session_id: &str,
		query: &str,
		limit: usize,
	) -> Result<Vec<MessageHit>> {
		let Some(phrase) = escape_fts_query(query) else {
			return Ok(Vec::new());
		};

		self.db.query(
			"\
SELECT m.id, m.session_id, m.role, snippet(messages_fts, 0, '[', ']', '...', 16), rank, m.created_at
FROM messages_fts
JOIN messages m ON m.rowid = messages_fts.rowid
WHERE messages_fts MATCH ?1 AND m.session_id = ?2
ORDER BY rank ASC, m.created_at DESC
LIMIT ?3",
			(phrase, session_id, limit as i64),
			message_hit,
		)
	}
}

/// Wraps the raw input as one FTS5 phrase. Blank input yields `None`.
pub fn escape_fts_query(query: &str) -> Option<String> {
	let trimmed = query.trim();

	if trimmed.is_empty() {
		return None;
	}

	Some(format!("\"{}\"", trimmed.replace('"', "\"\"")))
}

fn message_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageHit> {
	Ok(MessageHit {
		id: row.get(0)?,
		session_id: row.get(1)?,
		role: row.get(2)?,
		snippet: row.get(3)?,
		rank: row.get(4)?,
		created_at: row.get(5)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wraps_query_as_phrase() {
		assert_eq!(escape_fts_query("rust AND go").as_deref(), Some("\"rust AND go\""));
	}

	#[test]
	fn doubles_embedded_quotes() {
		assert_eq!(escape_fts_query("say \"hi\"").as_deref(), Some("\"say \"\"hi\"\"\""));
	}

	#[test]
	fn blank_query_is_skipped() {
		assert_eq!(escape_fts_query("   \t"), None);
	}
}
