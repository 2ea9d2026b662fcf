//! Log-derived primary records. Replay applies these inside one transaction per event, so every
//! writer takes a plain connection.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::{
	Db, Result,
	models::{Message, Note, Page, PageRequest, Session, Trace},
};

const NOTE_COLUMNS: &str = "id, path, title, content, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";
const TRACE_COLUMNS: &str = "id, workspace_id, session_id, content, created_at";

impl Db {
	pub fn upsert_note(&self, note: &Note) -> Result<()> {
		self.transaction(|tx| upsert_note(tx, note))
	}

	pub fn delete_note(&self, id: &str) -> Result<bool> {
		self.transaction(|tx| delete_note(tx, id))
	}

	/// Archived notes stay searchable; the flag is for callers that hide them.
	pub fn set_note_archived(&self, id: &str, archived: bool) -> Result<bool> {
		self.transaction(|tx| set_note_archived(tx, id, archived))
	}

	pub fn note(&self, id: &str) -> Result<Option<Note>> {
		self.query_one(
			&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
			[id],
			note_from_row,
		)
	}

	pub fn notes_page(&self, request: PageRequest) -> Result<Page<Note>> {
		self.query_paginated(
			&format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC, id ASC"),
			"SELECT count(*) FROM notes",
			request,
			&[],
			note_from_row,
		)
	}

	pub fn upsert_session(&self, session: &Session) -> Result<()> {
		self.transaction(|tx| upsert_session(tx, session))
	}

	pub fn delete_session(&self, id: &str) -> Result<bool> {
		self.transaction(|tx| delete_session(tx, id))
	}

	pub fn insert_message(&self, message: &Message) -> Result<()> {
		self.transaction(|tx| insert_message(tx, message))
	}

	pub fn session_messages_page(
		&self,
		session_id: &str,
		request: PageRequest,
	) -> Result<Page<Message>> {
		self.query_paginated(
			&format!(
				"SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 \
				 ORDER BY created_at ASC, id ASC"
			),
			"SELECT count(*) FROM messages WHERE session_id = ?1",
			request,
			&[&session_id],
			message_from_row,
		)
	}

	pub fn insert_trace(&self, trace: &Trace) -> Result<()> {
		self.transaction(|tx| insert_trace(tx, trace))
	}

	pub fn trace(&self, id: &str) -> Result<Option<Trace>> {
		self.read(|conn| trace(conn, id))
	}

	pub fn list_traces(&self) -> Result<Vec<Trace>> {
		self.read(list_traces)
	}
}

pub fn upsert_note(conn: &Connection, note: &Note) -> Result<()> {
	conn.execute(
		"\
INSERT INTO notes (id, path, title, content, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(id) DO UPDATE SET
	path = excluded.path,
	title = excluded.title,
	content = excluded.content,
	updated_at = excluded.updated_at",
		(&note.id, &note.path, &note.title, &note.content, note.created_at, note.updated_at),
	)?;

	Ok(())
}

pub fn delete_note(conn: &Connection, id: &str) -> Result<bool> {
	Ok(conn.execute("DELETE FROM notes WHERE id = ?1", [id])? > 0)
}

pub fn set_note_archived(conn: &Connection, id: &str, archived: bool) -> Result<bool> {
	Ok(conn.execute("UPDATE notes SET archived = ?2 WHERE id = ?1", (id, archived))? > 0)
}

pub fn upsert_session(conn: &Connection, session: &Session) -> Result<()> {
	conn.execute(
		"\
INSERT INTO sessions (id, workspace_id, title, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(id) DO UPDATE SET
	workspace_id = excluded.workspace_id,
	title = excluded.title,
	updated_at = excluded.updated_at",
		(&session.id, &session.workspace_id, &session.title, session.created_at, session.updated_at),
	)?;

	Ok(())
}

/// Messages are not tied to sessions by a foreign key so replay can deliver them in any order.
pub fn delete_session(conn: &Connection, id: &str) -> Result<bool> {
	conn.execute("DELETE FROM messages WHERE session_id = ?1", [id])?;

	Ok(conn.execute("DELETE FROM sessions WHERE id = ?1", [id])? > 0)
}

pub fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
	conn.execute(
		"\
INSERT INTO messages (id, session_id, role, content, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(id) DO UPDATE SET
	role = excluded.role,
	content = excluded.content",
		(&message.id, &message.session_id, &message.role, &message.content, message.created_at),
	)?;

	Ok(())
}

pub fn insert_trace(conn: &Connection, trace: &Trace) -> Result<()> {
	conn.execute(
		"\
INSERT INTO traces (id, workspace_id, session_id, content, created_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(id) DO UPDATE SET content = excluded.content",
		(&trace.id, &trace.workspace_id, &trace.session_id, &trace.content, trace.created_at),
	)?;

	Ok(())
}

pub fn trace(conn: &Connection, id: &str) -> Result<Option<Trace>> {
	let trace = conn
		.query_row(&format!("SELECT {TRACE_COLUMNS} FROM traces WHERE id = ?1"), [id], trace_from_row)
		.optional()?;

	Ok(trace)
}

pub fn list_traces(conn: &Connection) -> Result<Vec<Trace>> {
	let mut stmt =
		conn.prepare(&format!("SELECT {TRACE_COLUMNS} FROM traces ORDER BY created_at ASC, id ASC"))?;
	let traces = stmt.query_map([], trace_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;

	Ok(traces)
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
	Ok(Note {
		id: row.get(0)?,
		path: row.get(1)?,
		title: row.get(2)?,
		content: row.get(3)?,
		created_at: row.get(4)?,
		updated_at: row.get(5)?,
	})
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
	Ok(Message {
		id: row.get(0)?,
		session_id: row.get(1)?,
		role: row.get(2)?,
		content: row.get(3)?,
		created_at: row.get(4)?,
	})
}

fn trace_from_row(row: &Row<'_>) -> rusqlite::Result<Trace> {
	Ok(Trace {
		id: row.get(0)?,
		workspace_id: row.get(1)?,
		session_id: row.get(2)?,
		content: row.get(3)?,
		created_at: row.get(4)?,
	})
}
