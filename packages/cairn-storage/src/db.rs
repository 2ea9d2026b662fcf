use std::{
	path::{Path, PathBuf},
	ptr::NonNull,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use rusqlite::{
	Connection, DatabaseName, OptionalExtension, Params, Row, ToSql, Transaction, ffi,
	serialize::OwnedData,
};
use tokio::{
	task::{self, JoinHandle},
	time::{self, MissedTickBehavior},
};

use crate::{
	Error, Result,
	models::{Page, PageRequest, RunResult, Statistics, Stats, TableCount},
	schema, snapshot, vector,
};

/// Tables reported by [`Db::statistics`], in display order.
const REPORTED_TABLES: [&str; 9] = [
	"notes",
	"sessions",
	"messages",
	"traces",
	"applied_events",
	"sync_state",
	"document_embeddings",
	"trace_embeddings",
	"schema_version",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotSource {
	/// No snapshot existed, or it was empty.
	Fresh,
	Loaded,
	/// The snapshot was unreadable or corrupt and has been replaced by an empty image.
	Recovered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenReport {
	pub source: SnapshotSource,
	pub vector_enabled: bool,
}

/// The single in-memory image plus the snapshot file that persists it.
pub struct Db {
	conn: Mutex<Connection>,
	snapshot_path: PathBuf,
	vector_dim: u32,
	max_page_size: u32,
	vector_enabled: bool,
	dirty: AtomicBool,
	save_lock: tokio::sync::Mutex<()>,
	report: OpenReport,
}
impl Db {
	pub async fn open(cfg: &cairn_config::Storage) -> Result<Self> {
		vector::register_extension();

		if let Some(parent) = cfg.snapshot_path.parent()
			&& !parent.as_os_str().is_empty()
		{
			tokio::fs::create_dir_all(parent).await?;
		}

		let path = cfg.snapshot_path.clone();
		let (conn, source) = match snapshot::read(&path).await {
			Ok(None) => (fresh_connection()?, SnapshotSource::Fresh),
			Ok(Some(bytes)) => match load_image(bytes).await {
				Ok(conn) => (conn, SnapshotSource::Loaded),
				Err(err) => {
					tracing::warn!(
						error = %err,
						path = %path.display(),
						"Snapshot is corrupt. Rebuilding an empty store.",
					);

					if let Err(err) = snapshot::discard(&path).await {
						tracing::warn!(error = %err, "Failed to discard corrupt snapshot.");
					}

					(fresh_connection()?, SnapshotSource::Recovered)
				},
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					path = %path.display(),
					"Snapshot is unreadable. Starting from an empty store.",
				);

				(fresh_connection()?, SnapshotSource::Recovered)
			},
		};
		let vector_enabled = vector::extension_version(&conn).is_some();
		let db = Self {
			conn: Mutex::new(conn),
			snapshot_path: path,
			vector_dim: cfg.vector_dim,
			max_page_size: cfg.max_page_size,
			vector_enabled,
			dirty: AtomicBool::new(false),
			save_lock: tokio::sync::Mutex::new(()),
			report: OpenReport { source, vector_enabled },
		};

		if source == SnapshotSource::Recovered
			&& let Err(err) = db.save().await
		{
			tracing::error!(error = %err, "Failed to write replacement snapshot.");
			db.mark_dirty();
		}

		tracing::info!(
			path = %db.snapshot_path.display(),
			source = ?source,
			vector_enabled,
			"Storage engine ready.",
		);

		Ok(db)
	}

	pub fn report(&self) -> OpenReport {
		self.report
	}

	pub fn snapshot_path(&self) -> &Path {
		&self.snapshot_path
	}

	pub fn vector_dim(&self) -> u32 {
		self.vector_dim
	}

	pub fn vector_enabled(&self) -> bool {
		self.vector_enabled
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty.load(Ordering::SeqCst)
	}

	/// Serializes the whole image and replaces the snapshot file with it.
	pub async fn save(&self) -> Result<()> {
		let _guard = self.save_lock.lock().await;
		let bytes = {
			let conn = self.lock();

			self.dirty.store(false, Ordering::SeqCst);

			match conn.serialize(DatabaseName::Main) {
				Ok(data) => data.to_vec(),
				Err(err) => {
					self.mark_dirty();

					return Err(err.into());
				},
			}
		};

		if let Err(err) = snapshot::write(&self.snapshot_path, &bytes).await {
			self.mark_dirty();

			return Err(err);
		}

		tracing::debug!(bytes = bytes.len(), "Snapshot saved.");

		Ok(())
	}

	/// Returns whether a save happened.
	pub async fn flush_if_dirty(&self) -> Result<bool> {
		if !self.is_dirty() {
			return Ok(false);
		}

		self.save().await?;

		Ok(true)
	}

	/// Flushes on a fixed interval while the handle is alive. Clean images are never rewritten.
	pub fn spawn_autosave(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
		let db = Arc::downgrade(self);

		tokio::spawn(async move {
			let mut ticker = time::interval(every);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(db) = db.upgrade() else { break };

				if let Err(err) = db.flush_if_dirty().await {
					tracing::error!(error = %err, "Auto-save failed.");
				}
			}
		})
	}

	/// Executes one or more statements without parameter binding.
	pub fn exec(&self, sql: &str) -> Result<()> {
		let conn = self.lock();

		conn.execute_batch(sql)?;
		self.mark_dirty();

		Ok(())
	}

	pub fn run<P>(&self, sql: &str, params: P) -> Result<RunResult>
	where
		P: Params,
	{
		let conn = self.lock();
		let changes = conn.prepare_cached(sql)?.execute(params)?;
		let last_insert_row_id = conn.last_insert_rowid();

		if changes > 0 {
			self.mark_dirty();
		}

		Ok(RunResult { changes, last_insert_row_id })
	}

	pub fn query<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
	where
		P: Params,
		F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
	{
		let conn = self.lock();
		let mut stmt = conn.prepare_cached(sql)?;
		let rows = stmt.query_map(params, map)?.collect::<rusqlite::Result<Vec<_>>>()?;

		Ok(rows)
	}

	pub fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
	where
		P: Params,
		F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
	{
		let conn = self.lock();
		let mut stmt = conn.prepare_cached(sql)?;
		let row = stmt.query_row(params, map).optional()?;

		Ok(row)
	}

	/// Read-only access for callers composing several queries.
	pub fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
	where
		F: FnOnce(&Connection) -> std::result::Result<T, E>,
	{
		let conn = self.lock();

		f(&conn)
	}

	/// Commits when `f` succeeds; rolls back and returns the error otherwise.
	pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
	where
		E: From<Error>,
		F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
	{
		let mut conn = self.lock();
		let tx = conn.transaction().map_err(|err| E::from(Error::from(err)))?;

		match f(&tx) {
			Ok(value) => {
				tx.commit().map_err(|err| E::from(Error::from(err)))?;
				self.mark_dirty();

				Ok(value)
			},
			Err(err) => {
				if let Err(rollback_err) = tx.rollback() {
					tracing::warn!(error = %rollback_err, "Transaction rollback failed.");
				}

				Err(err)
			},
		}
	}

	/// Runs `count_sql` once, then `data_sql` with `LIMIT ? OFFSET ?` appended after `params`.
	pub fn query_paginated<T, F>(
		&self,
		data_sql: &str,
		count_sql: &str,
		request: PageRequest,
		params: &[&dyn ToSql],
		map: F,
	) -> Result<Page<T>>
	where
		F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
	{
		let page_size = request.page_size.clamp(1, self.max_page_size);
		let page = request.page.max(1);
		let conn = self.lock();
		let total: i64 = conn.query_row(count_sql, params, |row| row.get(0))?;
		let total_items = total.max(0) as u64;
		let total_pages = u32::try_from(total_items.div_ceil(u64::from(page_size)))
			.map_err(|_| Error::InvalidArgument("Page count exceeds u32.".to_string()))?;
		let limit = i64::from(page_size);
		let offset = (i64::from(page) - 1) * limit;
		let sql = format!("{data_sql} LIMIT ? OFFSET ?");
		let mut bound: Vec<&dyn ToSql> = params.to_vec();

		bound.push(&limit);
		bound.push(&offset);

		let mut stmt = conn.prepare(&sql)?;
		let items = stmt.query_map(bound.as_slice(), map)?.collect::<rusqlite::Result<Vec<_>>>()?;

		Ok(Page {
			items,
			page,
			page_size,
			total_items,
			total_pages,
			has_next_page: page < total_pages,
			has_previous_page: page > 1,
		})
	}

	/// Empties every log-derived table ahead of a full replay.
	pub fn clear_all_data(&self) -> Result<()> {
		self.transaction(|tx| {
			for table in schema::LOG_DERIVED_TABLES {
				if table_exists(tx, table)? {
					tx.execute(&format!("DELETE FROM {table}"), [])?;
				}
			}

			Ok::<_, Error>(())
		})?;

		tracing::info!("Cleared all log-derived data.");

		Ok(())
	}

	pub fn rebuild_fts_indexes(&self) -> Result<()> {
		self.exec(
			"\
INSERT INTO notes_fts(notes_fts) VALUES ('rebuild');
INSERT INTO messages_fts(messages_fts) VALUES ('rebuild');",
		)
	}

	/// `VACUUM` may renumber implicit rowids, so the text indexes are rebuilt afterwards.
	pub fn vacuum(&self) -> Result<()> {
		self.exec("VACUUM;")?;
		self.rebuild_fts_indexes()
	}

	pub async fn statistics(&self) -> Result<Statistics> {
		let (tables, table_count) = {
			let conn = self.lock();
			let table_count: i64 = conn.query_row(
				"SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
				[],
				|row| row.get(0),
			)?;
			let mut tables = Vec::with_capacity(REPORTED_TABLES.len());

			for table in REPORTED_TABLES {
				if table_exists(&conn, table)? {
					tables.push(TableCount { table: table.to_string(), rows: count_rows(&conn, table)? });
				}
			}

			(tables, table_count.max(0) as u64)
		};

		Ok(Statistics {
			tables,
			table_count,
			snapshot_bytes: snapshot::size(&self.snapshot_path).await,
			vector_enabled: self.vector_enabled,
		})
	}

	pub async fn stats(&self) -> Result<Stats> {
		let (notes, documents_embedded, traces_embedded) = {
			let conn = self.lock();
			let count = |table: &str| -> Result<u64> {
				if table_exists(&conn, table)? { count_rows(&conn, table) } else { Ok(0) }
			};

			(count("notes")?, count("document_embeddings")?, count("trace_embeddings")?)
		};

		Ok(Stats {
			notes,
			documents_embedded,
			traces_embedded,
			snapshot_bytes: snapshot::size(&self.snapshot_path).await,
		})
	}

	pub(crate) fn mark_dirty(&self) {
		self.dirty.store(true, Ordering::SeqCst);
	}

	fn lock(&self) -> MutexGuard<'_, Connection> {
		self.conn.lock().unwrap_or_else(|err| err.into_inner())
	}
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
	let found: Option<i64> = conn
		.query_row(
			"SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
			[table],
			|row| row.get(0),
		)
		.optional()?;

	Ok(found.is_some())
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
	let rows: i64 = conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))?;

	Ok(rows.max(0) as u64)
}

fn fresh_connection() -> Result<Connection> {
	let conn = Connection::open_in_memory()?;

	conn.execute_batch("PRAGMA foreign_keys = ON;")?;
	conn.execute_batch(schema::BASELINE)?;

	Ok(conn)
}

async fn load_image(mut bytes: Vec<u8>) -> Result<Connection> {
	snapshot::validate(&bytes)?;

	// In-memory databases cannot run in WAL mode; open such images with a rollback journal.
	if bytes[18] == 2 || bytes[19] == 2 {
		bytes[18] = 1;
		bytes[19] = 1;
	}

	task::spawn_blocking(move || {
		let image = sqlite_owned(&bytes)?;

		drop(bytes);

		let mut conn = Connection::open_in_memory()?;

		conn.deserialize(DatabaseName::Main, image, false)?;

		let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

		if verdict != "ok" {
			return Err(Error::CorruptSnapshot(format!("Integrity check failed: {verdict}.")));
		}

		conn.execute_batch("PRAGMA foreign_keys = ON;")?;

		Ok(conn)
	})
	.await
	.map_err(|err| Error::Io(std::io::Error::other(err)))?
}

/// Copies the image into memory allocated by SQLite, which takes ownership on deserialize.
fn sqlite_owned(bytes: &[u8]) -> Result<OwnedData> {
	// SAFETY: a non-null result of `sqlite3_malloc64` is valid for `bytes.len()` writes and does
	// not overlap `bytes`. `OwnedData` releases it with `sqlite3_free`.
	unsafe {
		let Some(ptr) = NonNull::new(ffi::sqlite3_malloc64(bytes.len() as u64).cast::<u8>()) else {
			return Err(Error::Io(std::io::Error::from(std::io::ErrorKind::OutOfMemory)));
		};

		std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());

		Ok(OwnedData::from_raw_nonnull(ptr, bytes.len()))
	}
}
