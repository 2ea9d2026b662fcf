//! Relational layout. The baseline is what a fresh image starts with; everything after it is
//! reached through [`crate::migrate`].

/// Tables whose presence marks a pre-ledger install.
pub const PRIMARY_TABLES: [&str; 4] = ["notes", "sessions", "messages", "traces"];

/// Tables wiped by a full rebuild from the record log.
pub const LOG_DERIVED_TABLES: [&str; 8] = [
	"messages",
	"sessions",
	"notes",
	"traces",
	"trace_embeddings",
	"trace_vectors",
	"applied_events",
	"sync_state",
];

pub const LEDGER_TABLE: &str = "schema_version";

pub const BASELINE: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
	id TEXT PRIMARY KEY,
	path TEXT NOT NULL,
	title TEXT NOT NULL,
	content TEXT NOT NULL,
	created_at INTEGER NOT NULL,
	updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updated_at);

CREATE TABLE IF NOT EXISTS sessions (
	id TEXT PRIMARY KEY,
	workspace_id TEXT NOT NULL,
	title TEXT NOT NULL,
	created_at INTEGER NOT NULL,
	updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON sessions(workspace_id, updated_at);

CREATE TABLE IF NOT EXISTS messages (
	id TEXT PRIMARY KEY,
	session_id TEXT NOT NULL,
	role TEXT NOT NULL,
	content TEXT NOT NULL,
	created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session_created_at ON messages(session_id, created_at);

CREATE TABLE IF NOT EXISTS traces (
	id TEXT PRIMARY KEY,
	workspace_id TEXT NOT NULL,
	session_id TEXT,
	content TEXT NOT NULL,
	created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_traces_workspace ON traces(workspace_id, created_at);

CREATE TABLE IF NOT EXISTS applied_events (
	event_id TEXT PRIMARY KEY,
	applied_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_applied_events_applied_at ON applied_events(applied_at);

CREATE TABLE IF NOT EXISTS sync_state (
	device_id TEXT PRIMARY KEY,
	last_event_timestamp INTEGER NOT NULL,
	file_timestamps TEXT NOT NULL DEFAULT '{}'
);

CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
	title,
	content,
	content='notes',
	content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS notes_fts_insert AFTER INSERT ON notes BEGIN
	INSERT INTO notes_fts(rowid, title, content) VALUES (new.rowid, new.title, new.content);
END;

CREATE TRIGGER IF NOT EXISTS notes_fts_delete AFTER DELETE ON notes BEGIN
	INSERT INTO notes_fts(notes_fts, rowid, title, content)
	VALUES ('delete', old.rowid, old.title, old.content);
END;

CREATE TRIGGER IF NOT EXISTS notes_fts_update AFTER UPDATE ON notes BEGIN
	INSERT INTO notes_fts(notes_fts, rowid, title, content)
	VALUES ('delete', old.rowid, old.title, old.content);
	INSERT INTO notes_fts(rowid, title, content) VALUES (new.rowid, new.title, new.content);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
	content,
	content='messages',
	content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS messages_fts_insert AFTER INSERT ON messages BEGIN
	INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_fts_delete AFTER DELETE ON messages BEGIN
	INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_fts_update AFTER UPDATE ON messages BEGIN
	INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
	INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#;

pub const LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
	version INTEGER PRIMARY KEY,
	applied_at INTEGER NOT NULL
);
"#;

pub const DOCUMENT_EMBEDDINGS: &str = r#"
CREATE TABLE IF NOT EXISTS document_embeddings (
	row_id INTEGER PRIMARY KEY AUTOINCREMENT,
	document_id TEXT NOT NULL UNIQUE,
	content_hash TEXT NOT NULL,
	model TEXT NOT NULL,
	created_at INTEGER NOT NULL,
	updated_at INTEGER NOT NULL
);
"#;

pub const TRACE_EMBEDDINGS: &str = r#"
CREATE TABLE IF NOT EXISTS trace_embeddings (
	row_id INTEGER PRIMARY KEY AUTOINCREMENT,
	trace_id TEXT NOT NULL UNIQUE,
	workspace_id TEXT NOT NULL,
	session_id TEXT,
	model TEXT NOT NULL,
	content_hash TEXT NOT NULL,
	created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trace_embeddings_workspace ON trace_embeddings(workspace_id);
"#;

pub fn render_vector_table(table: &str, vector_dim: u32) -> String {
	format!("CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(embedding float[{vector_dim}]);")
}
