use std::collections::{BTreeMap, HashSet};

use cairn_storage::{
	Error,
	embeddings::{DocumentUpsert, TraceUpsert},
	models::{Message, Note, PageRequest, Session, Trace},
	records,
	search::FullTextSearch,
};
use cairn_testkit::{DEFAULT_DIM, TestStore, deterministic_vector};

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

fn message(id: &str, session_id: &str, content: &str, created_at: i64) -> Message {
	Message {
		id: id.to_string(),
		session_id: session_id.to_string(),
		role: "user".to_string(),
		content: content.to_string(),
		created_at,
	}
}

#[tokio::test]
async fn pages_cover_every_row_exactly_once() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let total = 23;

	for i in 0..total {
		db.upsert_note(&note(&format!("n{i:02}"), "T", "Body text for paging.", i))
			.expect("Failed to insert note.");
	}

	for page_size in 1..=25 {
		let mut seen = HashSet::new();
		let mut page = 1;

		loop {
			let result = db.notes_page(PageRequest { page, page_size }).expect("Failed to page.");

			assert_eq!(result.total_items, total as u64);
			assert_eq!(result.total_pages, (total as u32).div_ceil(page_size));
			assert_eq!(result.has_previous_page, page > 1);
			assert_eq!(result.has_next_page, page < result.total_pages);

			for item in result.items {
				assert!(seen.insert(item.id), "Row returned twice at page size {page_size}.");
			}

			if !result.has_next_page {
				break;
			}

			page += 1;
		}

		assert_eq!(seen.len(), total as usize);
	}
}

#[tokio::test]
async fn page_size_and_number_are_clamped() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	for i in 0..3 {
		db.upsert_note(&note(&format!("n{i}"), "T", "Body text for paging.", i))
			.expect("Failed to insert note.");
	}

	let tiny = db.notes_page(PageRequest { page: 0, page_size: 0 }).expect("Failed to page.");

	assert_eq!(tiny.page, 1);
	assert_eq!(tiny.page_size, 1);
	assert_eq!(tiny.items.len(), 1);

	let huge = db.notes_page(PageRequest { page: 1, page_size: 10_000 }).expect("Failed to page.");

	assert_eq!(huge.page_size, 200);
	assert_eq!(huge.items.len(), 3);
	assert!(!huge.has_next_page);

	let past_end = db.notes_page(PageRequest { page: 9, page_size: 2 }).expect("Failed to page.");

	assert!(past_end.items.is_empty());
	assert!(!past_end.has_next_page);
}

#[tokio::test]
async fn full_text_queries_are_literal_phrases() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	db.upsert_note(&note("a", "Soil", "compost AND mulch keep beds healthy", 1))
		.expect("Failed to insert note.");
	db.upsert_note(&note("b", "Quote", "she said \"hello\" twice", 2)).expect("Failed to insert note.");

	let search = FullTextSearch::new(db.clone());

	assert_eq!(search.search_notes("AND mulch", 10).expect("Failed to search.").len(), 1);
	assert!(search.search_notes("NEAR(", 10).expect("Operators must be escaped.").is_empty());
	assert_eq!(search.search_notes("said \"hello\"", 10).expect("Failed to search.")[0].id, "b");
	assert!(search.search_notes("   ", 10).expect("Blank query must succeed.").is_empty());
}

#[tokio::test]
async fn equal_rank_breaks_ties_by_recency() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	db.upsert_note(&note("old", "Same", "identical tomato text", 10)).expect("Failed to insert.");
	db.upsert_note(&note("new", "Same", "identical tomato text", 20)).expect("Failed to insert.");

	let hits = FullTextSearch::new(db.clone()).search_notes("tomato", 10).expect("Failed to search.");
	let ids = hits.iter().map(|hit| hit.id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["new", "old"]);
}

#[tokio::test]
async fn note_updates_and_deletes_reach_the_text_index() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let search = FullTextSearch::new(db.clone());

	db.upsert_note(&note("n", "Plan", "plant beans in spring", 1)).expect("Failed to insert.");
	db.upsert_note(&note("n", "Plan", "plant garlic in autumn", 2)).expect("Failed to update.");

	assert!(search.search_notes("beans", 10).expect("Failed to search.").is_empty());
	assert_eq!(search.search_notes("garlic", 10).expect("Failed to search.").len(), 1);

	assert!(db.delete_note("n").expect("Failed to delete."));
	assert!(search.search_notes("garlic", 10).expect("Failed to search.").is_empty());
}

#[tokio::test]
async fn session_scoped_message_search() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	// Messages may arrive before their session during replay.
	db.insert_message(&message("m1", "s1", "where is the invoice", 1)).expect("Failed to insert.");
	db.insert_message(&message("m2", "s2", "the invoice was paid", 2)).expect("Failed to insert.");
	db.upsert_session(&Session {
		id: "s1".to_string(),
		workspace_id: "w".to_string(),
		title: "Billing".to_string(),
		created_at: 1,
		updated_at: 1,
	})
	.expect("Failed to insert session.");

	let search = FullTextSearch::new(db.clone());

	assert_eq!(search.search_messages("invoice", 10).expect("Failed to search.").len(), 2);

	let scoped = search.search_session_messages("s1", "invoice", 10).expect("Failed to search.");

	assert_eq!(scoped.len(), 1);
	assert_eq!(scoped[0].id, "m1");

	assert!(db.delete_session("s1").expect("Failed to delete session."));
	assert_eq!(
		db.session_messages_page("s1", PageRequest::default()).expect("Failed to page.").total_items,
		0
	);
	assert_eq!(
		db.session_messages_page("s2", PageRequest::default()).expect("Failed to page.").total_items,
		1
	);
}

#[tokio::test]
async fn event_ledger_is_insert_if_absent() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	assert!(!db.is_event_applied("e1").expect("Failed to check event."));
	assert!(db.mark_event_applied("e1").expect("Failed to mark event."));
	assert!(!db.mark_event_applied("e1").expect("Failed to mark event."));
	assert!(db.is_event_applied("e1").expect("Failed to check event."));

	let all = db.applied_events_after(0).expect("Failed to list events.");

	assert_eq!(all.len(), 1);
	assert!(db.applied_events_after(all[0].applied_at).expect("Failed to list events.").is_empty());
}

#[tokio::test]
async fn sync_state_round_trips_file_timestamps() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let mut files = BTreeMap::new();

	files.insert("notes/a.md".to_string(), 10);
	files.insert("notes/b.md".to_string(), 20);

	assert!(db.sync_state("laptop").expect("Failed to read state.").is_none());

	db.update_sync_state("laptop", 99, &files).expect("Failed to write state.");
	db.update_sync_state("laptop", 120, &files).expect("Failed to overwrite state.");

	let state = db.sync_state("laptop").expect("Failed to read state.").expect("State must exist.");

	assert_eq!(state.last_event_timestamp, 120);
	assert_eq!(state.file_timestamps, files);
}

#[tokio::test]
async fn clear_all_data_wipes_log_derived_tables_only() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	db.upsert_note(&note("n", "T", "Body text to be wiped.", 1)).expect("Failed to insert.");
	db.insert_trace(&Trace {
		id: "t".to_string(),
		workspace_id: "w".to_string(),
		session_id: None,
		content: "trace text".to_string(),
		created_at: 1,
	})
	.expect("Failed to insert trace.");
	db.mark_event_applied("e").expect("Failed to mark event.");
	db.update_sync_state("d", 1, &BTreeMap::new()).expect("Failed to write state.");

	if db.vector_enabled() {
		db.upsert_document_embedding(&DocumentUpsert {
			document_id: "notes/n.md",
			content_hash: "h",
			model: "m",
			vector: &deterministic_vector("n", DEFAULT_DIM as usize),
		})
		.expect("Failed to upsert embedding.");
	}

	db.clear_all_data().expect("Failed to clear.");

	assert!(db.note("n").expect("Failed to read note.").is_none());
	assert!(db.list_traces().expect("Failed to list traces.").is_empty());
	assert!(!db.is_event_applied("e").expect("Failed to check event."));
	assert!(db.sync_state("d").expect("Failed to read state.").is_none());

	if db.vector_enabled() {
		assert!(db.document_embedding("notes/n.md").expect("Failed to read embedding.").is_some());
	}
}

#[tokio::test]
async fn vacuum_keeps_text_index_consistent() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	for i in 0..10 {
		db.upsert_note(&note(&format!("n{i}"), "T", &format!("entry number {i} pepper"), i))
			.expect("Failed to insert.");
	}
	for i in 0..5 {
		db.delete_note(&format!("n{i}")).expect("Failed to delete.");
	}

	db.vacuum().expect("Failed to vacuum.");

	let hits = FullTextSearch::new(db.clone()).search_notes("pepper", 20).expect("Failed to search.");

	assert_eq!(hits.len(), 5);
	assert!(hits.iter().all(|hit| hit.snippet.contains("pepper")));
}

#[tokio::test]
async fn archiving_a_note_sets_its_flag() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	db.upsert_note(&note("n", "T", "Body text to archive.", 1)).expect("Failed to insert.");

	let archived = db
		.transaction(|tx| records::set_note_archived(tx, "n", true))
		.expect("Failed to archive.");

	assert!(archived);
	assert_eq!(
		db.query("SELECT archived FROM notes WHERE id = ?1", ["n"], |row| row.get::<_, bool>(0))
			.expect("Failed to read flag."),
		vec![true]
	);

	assert!(db.set_note_archived("n", false).expect("Failed to unarchive."));
	assert!(!db.set_note_archived("missing", true).expect("Failed to archive."));
	assert_eq!(
		db.query("SELECT archived FROM notes WHERE id = ?1", ["n"], |row| row.get::<_, bool>(0))
			.expect("Failed to read flag."),
		vec![false]
	);
}

#[tokio::test]
async fn traces_are_looked_up_by_id() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");
	let mut trace = Trace {
		id: "t1".to_string(),
		workspace_id: "w1".to_string(),
		session_id: Some("s1".to_string()),
		content: "first draft".to_string(),
		created_at: 5,
	};

	db.insert_trace(&trace).expect("Failed to insert trace.");

	trace.content = "second draft".to_string();

	db.insert_trace(&trace).expect("Failed to update trace.");

	let stored = db.trace("t1").expect("Failed to read trace.").expect("Trace must exist.");

	assert_eq!(stored.content, "second draft");
	assert_eq!(stored.session_id.as_deref(), Some("s1"));
	assert_eq!(stored.created_at, 5);
	assert!(db.trace("t2").expect("Failed to read trace.").is_none());
}

#[tokio::test]
async fn document_vectors_upsert_in_place() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	if !db.vector_enabled() {
		return;
	}

	let dim = DEFAULT_DIM as usize;
	let first = db
		.upsert_document_embedding(&DocumentUpsert {
			document_id: "a.md",
			content_hash: "h1",
			model: "m",
			vector: &deterministic_vector("apple", dim),
		})
		.expect("Failed to insert embedding.");
	let second = db
		.upsert_document_embedding(&DocumentUpsert {
			document_id: "a.md",
			content_hash: "h2",
			model: "m",
			vector: &deterministic_vector("apricot", dim),
		})
		.expect("Failed to update embedding.");

	assert_eq!(first, second);

	db.upsert_document_embedding(&DocumentUpsert {
		document_id: "b.md",
		content_hash: "h3",
		model: "m",
		vector: &deterministic_vector("banana", dim),
	})
	.expect("Failed to insert embedding.");

	let hits =
		db.nearest_documents(&deterministic_vector("apricot", dim), 2).expect("Failed to search.");

	assert_eq!(hits[0].document_id, "a.md");
	assert!(hits[0].distance < 1e-4);
	assert!(hits[0].distance <= hits[1].distance);
	assert_eq!(db.document_hashes().expect("Failed to read hashes.").len(), 2);

	assert!(db.rename_document_embedding("a.md", "c.md").expect("Failed to rename."));
	assert_eq!(
		db.document_embedding("c.md").expect("Failed to read embedding.").map(|e| e.row_id),
		Some(first)
	);
	assert!(db.delete_document_embedding("c.md").expect("Failed to delete."));
	assert_eq!(db.nearest_documents(&deterministic_vector("apricot", dim), 5).expect("Search.").len(), 1);
}

#[tokio::test]
async fn oversized_neighbor_counts_are_clamped() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	if !db.vector_enabled() {
		return;
	}

	let dim = DEFAULT_DIM as usize;

	db.upsert_document_embedding(&DocumentUpsert {
		document_id: "a.md",
		content_hash: "h1",
		model: "m",
		vector: &deterministic_vector("apple", dim),
	})
	.expect("Failed to insert embedding.");

	let hits = db
		.nearest_documents(&deterministic_vector("apple", dim), 10_000)
		.expect("Large k must not fail.");

	assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	if !db.vector_enabled() {
		return;
	}

	let err = db.nearest_documents(&[1.0, 0.0], 3).expect_err("Dimension must be checked.");

	assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn trace_search_is_scoped_to_workspace() {
	let store = TestStore::new().expect("Failed to create test store.");
	let db = store.open_migrated().await.expect("Failed to open store.");

	if !db.vector_enabled() {
		return;
	}

	let dim = DEFAULT_DIM as usize;

	for (id, workspace) in [("t1", "w1"), ("t2", "w1"), ("t3", "w2")] {
		db.upsert_trace_embedding(&TraceUpsert {
			trace_id: id,
			workspace_id: workspace,
			session_id: Some("s"),
			content_hash: id,
			model: "m",
			vector: &deterministic_vector(id, dim),
		})
		.expect("Failed to insert trace embedding.");
	}

	let hits = db
		.nearest_traces(&deterministic_vector("t3", dim), "w1", 10)
		.expect("Failed to search traces.");

	assert_eq!(hits.len(), 2);
	assert!(hits.iter().all(|hit| hit.trace_id != "t3"));
	assert_eq!(hits[0].session_id.as_deref(), Some("s"));
}
