use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunResult {
	pub changes: usize,
	pub last_insert_row_id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
	pub page: u32,
	pub page_size: u32,
}
impl Default for PageRequest {
	fn default() -> Self {
		Self { page: 1, page_size: 50 }
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub page: u32,
	pub page_size: u32,
	pub total_items: u64,
	pub total_pages: u32,
	pub has_next_page: bool,
	pub has_previous_page: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
	pub id: String,
	pub path: String,
	pub title: String,
	pub content: String,
	pub created_at: i64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	pub id: String,
	pub workspace_id: String,
	pub title: String,
	pub created_at: i64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub id: String,
	pub session_id: String,
	pub role: String,
	pub content: String,
	pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
	pub id: String,
	pub workspace_id: String,
	pub session_id: Option<String>,
	pub content: String,
	pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaVersion {
	pub version: u32,
	pub applied_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedEvent {
	pub event_id: String,
	pub applied_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncState {
	pub device_id: String,
	pub last_event_timestamp: i64,
	pub file_timestamps: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentEmbedding {
	pub row_id: i64,
	pub document_id: String,
	pub content_hash: String,
	pub model: String,
	pub created_at: i64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEmbedding {
	pub row_id: i64,
	pub trace_id: String,
	pub workspace_id: String,
	pub session_id: Option<String>,
	pub model: String,
	pub content_hash: String,
	pub created_at: i64,
}

/// Raw nearest-neighbour hit joined with its metadata row.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentMatch {
	pub row_id: i64,
	pub document_id: String,
	pub updated_at: i64,
	pub distance: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceMatch {
	pub row_id: i64,
	pub trace_id: String,
	pub session_id: Option<String>,
	pub created_at: i64,
	pub distance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NoteHit {
	pub id: String,
	pub path: String,
	pub title: String,
	pub snippet: String,
	pub rank: f64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageHit {
	pub id: String,
	pub session_id: String,
	pub role: String,
	pub snippet: String,
	pub rank: f64,
	pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableCount {
	pub table: String,
	pub rows: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Statistics {
	pub tables: Vec<TableCount>,
	pub table_count: u64,
	pub snapshot_bytes: u64,
	pub vector_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Stats {
	pub notes: u64,
	pub documents_embedded: u64,
	pub traces_embedded: u64,
	pub snapshot_bytes: u64,
}
