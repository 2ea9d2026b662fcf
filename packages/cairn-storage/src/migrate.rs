//! Ordered, append-only schema evolution recorded in the `schema_version` ledger.

use rusqlite::{Connection, OptionalExtension};

use crate::{
	Db, Error, Result,
	db::table_exists,
	schema::{self, LEDGER_TABLE, PRIMARY_TABLES},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
	Sql(&'static str),
	/// Skipped when the column already exists.
	AddColumn { table: &'static str, column: &'static str, definition: &'static str },
	/// Rendered with the engine's vector dimension. Skipped when vector support is unavailable.
	VectorTable { table: &'static str },
}

#[derive(Clone, Debug)]
pub struct Migration {
	pub version: u32,
	pub description: &'static str,
	pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
	pub applied: Vec<u32>,
	pub from_version: u32,
	pub to_version: u32,
}

pub fn published() -> Vec<Migration> {
	vec![
		Migration {
			version: 1,
			description: "Baseline notes, sessions, messages, traces and text indexes.",
			statements: vec![Statement::Sql(schema::BASELINE)],
		},
		Migration {
			version: 2,
			description: "Document embedding metadata and vectors.",
			statements: vec![
				Statement::Sql(schema::DOCUMENT_EMBEDDINGS),
				Statement::VectorTable { table: "document_vectors" },
			],
		},
		Migration {
			version: 3,
			description: "Trace embedding metadata and vectors.",
			statements: vec![
				Statement::Sql(schema::TRACE_EMBEDDINGS),
				Statement::VectorTable { table: "trace_vectors" },
			],
		},
		Migration {
			version: 4,
			description: "Note archival flag and sync state timestamps.",
			statements: vec![
				Statement::AddColumn {
					table: "notes",
					column: "archived",
					definition: "INTEGER NOT NULL DEFAULT 0",
				},
				Statement::AddColumn { table: "sync_state", column: "updated_at", definition: "INTEGER" },
			],
		},
	]
}

pub struct Migrator<'a> {
	db: &'a Db,
	migrations: Vec<Migration>,
}
impl<'a> Migrator<'a> {
	pub fn new(db: &'a Db) -> Self {
		Self::with_migrations(db, published())
	}

	pub fn with_migrations(db: &'a Db, mut migrations: Vec<Migration>) -> Self {
		migrations.sort_by_key(|migration| migration.version);

		Self { db, migrations }
	}

	pub fn latest_version(&self) -> u32 {
		self.migrations.last().map(|migration| migration.version).unwrap_or(0)
	}

	pub fn current_version(&self) -> Result<u32> {
		self.db.read(current_version)
	}

	pub fn migrate(&self) -> Result<MigrationReport> {
		let from_version = self.current_version()?;
		let mut report =
			MigrationReport { applied: Vec::new(), from_version, to_version: from_version };

		for migration in self.migrations.iter().filter(|migration| migration.version > from_version) {
			self.apply(migration).map_err(|err| match err {
				Error::Migration { .. } => err,
				other => Error::Migration { version: migration.version, message: other.to_string() },
			})?;

			tracing::info!(
				version = migration.version,
				description = migration.description,
				"Migration applied.",
			);

			report.applied.push(migration.version);
			report.to_version = migration.version;
		}

		if report.applied.is_empty() {
			tracing::debug!(version = from_version, "Schema is up to date.");
		}

		Ok(report)
	}

	fn apply(&self, migration: &Migration) -> Result<()> {
		let vector_enabled = self.db.vector_enabled();
		let vector_dim = self.db.vector_dim();

		self.db.transaction(|tx| {
			tx.execute_batch(schema::LEDGER)?;

			for statement in &migration.statements {
				match statement {
					Statement::Sql(sql) => tx.execute_batch(sql)?,
					Statement::AddColumn { table, column, definition } => {
						if column_exists(tx, table, column)? {
							tracing::debug!(table, column, "Column already present.");
						} else {
							tx.execute_batch(&format!(
								"ALTER TABLE {table} ADD COLUMN {column} {definition};"
							))?;
						}
					},
					Statement::VectorTable { table } => {
						if vector_enabled {
							tx.execute_batch(&schema::render_vector_table(table, vector_dim))?;
						} else {
							tracing::warn!(
								version = migration.version,
								table,
								"Vector extension unavailable. Skipping vector table.",
							);
						}
					},
				}
			}

			tx.execute(
				"INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
				(migration.version, crate::now_ms()),
			)?;

			Ok(())
		})
	}
}

fn current_version(conn: &Connection) -> Result<u32> {
	if !table_exists(conn, LEDGER_TABLE)? {
		for table in PRIMARY_TABLES {
			if table_exists(conn, table)? {
				return Ok(1);
			}
		}

		return Ok(0);
	}

	let max: Option<u32> = conn
		.query_row("SELECT max(version) FROM schema_version", [], |row| row.get(0))
		.optional()?
		.flatten();

	Ok(max.unwrap_or(1))
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
	let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
	let names = stmt.query_map([], |row| row.get::<_, String>(1))?;

	for name in names {
		if name? == column {
			return Ok(true);
		}
	}

	Ok(false)
}
