use rusqlite::Connection;

use cairn_storage::{
	Db, Error, SnapshotSource,
	migrate::{Migration, Migrator, Statement},
	models::Note,
	schema, snapshot,
};
use cairn_testkit::TestStore;

fn note(id: &str, title: &str, content: &str, updated_at: i64) -> Note {
	Note {
		id: id.to_string(),
		path: format!("notes/{id}.md"),
		title: title.to_string(),
		content: content.to_string(),
		created_at: updated_at,
		updated_at,
	}
}

#[tokio::test]
async fn fresh_store_starts_at_baseline_and_migrates_once() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open().await.expect("Failed to open store.");

	assert_eq!(db.report().source, SnapshotSource::Fresh);

	let migrator = Migrator::new(&db);

	assert_eq!(migrator.current_version().expect("Failed to read version."), 1);

	let first = migrator.migrate().expect("Failed to migrate.");

	assert_eq!(first.applied, vec![2, 3, 4]);
	assert_eq!(first.from_version, 1);
	assert_eq!(first.to_version, 4);

	let second = migrator.migrate().expect("Failed to migrate again.");

	assert!(second.applied.is_empty());
	assert_eq!(second.to_version, 4);
	assert_eq!(migrator.current_version().expect("Failed to read version."), 4);
}

#[tokio::test]
async fn add_column_migration_tolerates_existing_column() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let report = Migrator::with_migrations(
		&db,
		vec![Migration {
			version: 5,
			description: "Re-add an existing column.",
			statements: vec![Statement::AddColumn {
				table: "notes",
				column: "archived",
				definition: "INTEGER NOT NULL DEFAULT 0",
			}],
		}],
	)
	.migrate()
	.expect("Failed to migrate.");

	assert_eq!(report.applied, vec![5]);
}

#[tokio::test]
async fn failed_migration_leaves_ledger_at_last_success() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let migrator = Migrator::with_migrations(
		&db,
		vec![
			Migration {
				version: 5,
				description: "Good.",
				statements: vec![Statement::Sql("CREATE TABLE extra (id INTEGER PRIMARY KEY);")],
			},
			Migration {
				version: 6,
				description: "Bad.",
				statements: vec![
					Statement::Sql("CREATE TABLE half_done (id INTEGER);"),
					Statement::Sql("THIS IS NOT SQL;"),
				],
			},
		],
	);
	let err = migrator.migrate().expect_err("Broken migration must fail.");

	assert!(matches!(err, Error::Migration { version: 6, .. }));
	assert_eq!(migrator.current_version().expect("Failed to read version."), 5);

	let half_done: i64 = db
		.query_one(
			"SELECT count(*) FROM sqlite_master WHERE name = 'half_done'",
			[],
			|row| row.get(0),
		)
		.expect("Failed to query schema.")
		.expect("Count row must exist.");

	assert_eq!(half_done, 0);
}

#[tokio::test]
async fn legacy_install_without_ledger_reports_version_one() {
	let store = TestStore::new().expect("Failed to create test store.");

	{
		let conn = Connection::open(store.snapshot_path()).expect("Failed to create legacy file.");

		conn.execute_batch(schema::BASELINE).expect("Failed to create legacy tables.");
		conn.execute(
			"INSERT INTO notes (id, path, title, content, created_at, updated_at) \
			 VALUES ('n1', 'n1.md', 'Old', 'Legacy body text', 1, 1)",
			[],
		)
		.expect("Failed to insert legacy note.");
	}

	let db = store.open().await.expect("Failed to open legacy store.");

	assert_eq!(db.report().source, SnapshotSource::Loaded);

	let migrator = Migrator::new(&db);

	assert_eq!(migrator.current_version().expect("Failed to read version."), 1);

	let report = migrator.migrate().expect("Failed to migrate legacy store.");

	assert_eq!(report.applied, vec![2, 3, 4]);
	assert!(db.note("n1").expect("Failed to read note.").is_some());
}

#[tokio::test]
async fn unrelated_database_without_ledger_reports_version_zero() {
	let store = TestStore::new().expect("Failed to create test store.");

	{
		let conn = Connection::open(store.snapshot_path()).expect("Failed to create file.");

		conn.execute_batch("CREATE TABLE misc (x INTEGER);").expect("Failed to create table.");
	}

	let db = store.open().await.expect("Failed to open store.");
	let migrator = Migrator::new(&db);

	assert_eq!(migrator.current_version().expect("Failed to read version."), 0);
	assert_eq!(migrator.migrate().expect("Failed to migrate.").applied, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn empty_ledger_counts_as_version_one() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open().await.expect("Failed to open store.");

	db.exec(schema::LEDGER).expect("Failed to create ledger.");

	assert_eq!(Migrator::new(&db).current_version().expect("Failed to read version."), 1);
}

#[tokio::test]
async fn save_then_load_returns_identical_results() {
	let store = TestStore::new().expect("Failed to create test store.");
	let before = {
		let db = store.open_migrated().await.expect("Failed to open store.");

		for i in 0..5 {
			db.upsert_note(&note(&format!("n{i}"), &format!("Title {i}"), "garden soil notes", i))
				.expect("Failed to insert note.");
		}

		db.save().await.expect("Failed to save.");

		assert!(!db.is_dirty());

		db.notes_page(Default::default()).expect("Failed to page notes.")
	};
	let db = store.open().await.expect("Failed to reopen store.");

	assert_eq!(db.report().source, SnapshotSource::Loaded);
	assert_eq!(db.notes_page(Default::default()).expect("Failed to page notes."), before);
	assert_eq!(Migrator::new(&db).current_version().expect("Failed to read version."), 4);
}

#[tokio::test]
async fn garbage_snapshot_is_replaced_with_fresh_store() {
	let store = TestStore::new().expect("Failed to create test store.");

	tokio::fs::write(store.snapshot_path(), b"definitely not a database image")
		.await
		.expect("Failed to write garbage.");

	let db = store.open().await.expect("Recovery must not fail.");

	assert_eq!(db.report().source, SnapshotSource::Recovered);
	assert!(db.notes_page(Default::default()).expect("Failed to page notes.").items.is_empty());

	let rewritten = snapshot::read(store.snapshot_path())
		.await
		.expect("Failed to read snapshot.")
		.expect("Recovery must write a snapshot.");

	snapshot::validate(&rewritten).expect("Replacement snapshot must be valid.");
}

#[tokio::test]
async fn truncated_snapshot_is_recovered() {
	let store = TestStore::new().expect("Failed to create test store.");

	{
		let db = store.open_migrated().await.expect("Failed to open store.");

		db.upsert_note(&note("n1", "Kept?", "This note will not survive truncation.", 1))
			.expect("Failed to insert note.");
		db.save().await.expect("Failed to save.");
	}

	let bytes = tokio::fs::read(store.snapshot_path()).await.expect("Failed to read snapshot.");

	tokio::fs::write(store.snapshot_path(), &bytes[..bytes.len() / 2 + 7])
		.await
		.expect("Failed to truncate snapshot.");

	let db = store.open().await.expect("Recovery must not fail.");

	assert_eq!(db.report().source, SnapshotSource::Recovered);
	assert!(db.note("n1").expect("Failed to read note.").is_none());
	assert_eq!(Migrator::new(&db).current_version().expect("Failed to read version."), 1);
}

#[tokio::test]
async fn empty_snapshot_file_is_a_fresh_install() {
	let store = TestStore::new().expect("Failed to create test store.");

	tokio::fs::write(store.snapshot_path(), b"").await.expect("Failed to create empty file.");

	let db = store.open().await.expect("Failed to open store.");

	assert_eq!(db.report().source, SnapshotSource::Fresh);
}

#[tokio::test]
async fn flush_only_writes_when_dirty() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open().await.expect("Failed to open store.");

	assert!(!db.flush_if_dirty().await.expect("Failed to flush."));

	db.upsert_note(&note("n1", "Dirty", "Marks the image as changed.", 1))
		.expect("Failed to insert note.");

	assert!(db.is_dirty());
	assert!(db.flush_if_dirty().await.expect("Failed to flush."));
	assert!(!db.is_dirty());
	assert!(tokio::fs::metadata(store.snapshot_path()).await.is_ok());
}

#[tokio::test]
async fn failed_transaction_rolls_back() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let result: Result<(), Error> = db.transaction(|tx| {
		cairn_storage::records::upsert_note(tx, &note("n1", "Gone", "Rolled back with the rest.", 1))?;

		Err(Error::InvalidArgument("abort".to_string()))
	});

	assert!(result.is_err());
	assert!(db.note("n1").expect("Failed to read note.").is_none());
}

#[tokio::test]
async fn statistics_report_tables_and_snapshot_size() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	db.upsert_note(&note("n1", "One", "First note body text.", 1)).expect("Failed to insert note.");
	db.save().await.expect("Failed to save.");

	let stats = db.statistics().await.expect("Failed to read statistics.");
	let notes = stats.tables.iter().find(|table| table.table == "notes").expect("Notes row.");

	assert_eq!(notes.rows, 1);
	assert!(stats.snapshot_bytes > 0);
	assert!(stats.table_count >= 8);
	assert_eq!(stats.vector_enabled, db.vector_enabled());

	let summary = db.stats().await.expect("Failed to read stats.");

	assert_eq!(summary.notes, 1);
	assert_eq!(summary.documents_embedded, 0);
	assert_eq!(summary.snapshot_bytes, stats.snapshot_bytes);
}

#[tokio::test]
async fn open_creates_missing_parent_directory() {
	let mut store = TestStore::new().expect("Failed to create test store.");
	let nested = store.dir().join("a").join("b").join("cairn.sqlite3");

	store.config_mut().storage.snapshot_path = nested.clone();

	let db = Db::open(&store.config().storage).await.expect("Failed to open store.");

	db.save().await.expect("Failed to save.");

	assert!(nested.exists());
}
