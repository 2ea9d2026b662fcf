//! Replay idempotency and per-device sync progress.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};

use crate::{
	Db, Result,
	models::{AppliedEvent, SyncState},
};

impl Db {
	pub fn is_event_applied(&self, event_id: &str) -> Result<bool> {
		self.read(|conn| is_event_applied(conn, event_id))
	}

	/// Returns `true` when the event was not recorded before.
	pub fn mark_event_applied(&self, event_id: &str) -> Result<bool> {
		self.transaction(|tx| mark_event_applied(tx, event_id, crate::now_ms()))
	}

	pub fn applied_events_after(&self, timestamp: i64) -> Result<Vec<AppliedEvent>> {
		self.query(
			"SELECT event_id, applied_at FROM applied_events WHERE applied_at > ?1 \
			 ORDER BY applied_at ASC, event_id ASC",
			[timestamp],
			|row| Ok(AppliedEvent { event_id: row.get(0)?, applied_at: row.get(1)? }),
		)
	}

	pub fn sync_state(&self, device_id: &str) -> Result<Option<SyncState>> {
		self.read(|conn| sync_state(conn, device_id))
	}

	pub fn update_sync_state(
		&self,
		device_id: &str,
		last_event_timestamp: i64,
		file_timestamps: &BTreeMap<String, i64>,
	) -> Result<()> {
		let encoded = serde_json::to_string(file_timestamps)?;

		self.run(
			"\
INSERT INTO sync_state (device_id, last_event_timestamp, file_timestamps, updated_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(device_id) DO UPDATE SET
	last_event_timestamp = excluded.last_event_timestamp,
	file_timestamps = excluded.file_timestamps,
	updated_at = excluded.updated_at",
			(device_id, last_event_timestamp, encoded, crate::now_ms()),
		)?;

		Ok(())
	}
}

pub fn is_event_applied(conn: &Connection, event_id: &str) -> Result<bool> {
	let found: Option<i64> = conn
		.query_row("SELECT 1 FROM applied_events WHERE event_id = ?1", [event_id], |row| row.get(0))
		.optional()?;

	Ok(found.is_some())
}

pub fn mark_event_applied(conn: &Connection, event_id: &str, applied_at: i64) -> Result<bool> {
	let changes = conn.execute(
		"INSERT OR IGNORE INTO applied_events (event_id, applied_at) VALUES (?1, ?2)",
		(event_id, applied_at),
	)?;

	Ok(changes > 0)
}

pub fn sync_state(conn: &Connection, device_id: &str) -> Result<Option<SyncState>> {
	let row: Option<(String, i64, String)> = conn
		.query_row(
			"SELECT device_id, last_event_timestamp, file_timestamps FROM sync_state WHERE device_id = ?1",
			[device_id],
			|row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
		)
		.optional()?;
	let Some((device_id, last_event_timestamp, raw)) = row else {
		return Ok(None);
	};
	let file_timestamps = if raw.trim().is_empty() { BTreeMap::new() } else { serde_json::from_str(&raw)? };

	Ok(Some(SyncState { device_id, last_event_timestamp, file_timestamps }))
}
