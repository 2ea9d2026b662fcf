pub mod cli;
pub mod corpus;

use std::{sync::Arc, time::Duration};

use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use cairn_config::Config;
use cairn_providers::EmbeddingEngine;
use cairn_service::{EmbeddingService, IndexReport, IndexingPhase, IndexingQueue};
use cairn_storage::{Db, migrate::Migrator, search::FullTextSearch};

pub use crate::cli::{Args, Command};

use crate::corpus::FsSource;

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cairn_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Arc::new(Db::open(&config.storage).await?);
	let report = Migrator::new(&db).migrate()?;

	tracing::info!(
		source = ?db.report().source,
		vector_enabled = db.vector_enabled(),
		from_version = report.from_version,
		to_version = report.to_version,
		"Store ready.",
	);

	let autosave = db.spawn_autosave(Duration::from_millis(config.storage.autosave_interval_ms));
	let engine = if config.embedding.enabled {
		Some(Arc::new(EmbeddingEngine::from_config(&config.embedding)?))
	} else {
		None
	};
	let result = dispatch(&config, &db, engine.as_ref(), args.command).await;

	autosave.abort();

	if let Some(engine) = engine {
		engine.dispose().await;
	}

	if let Err(err) = db.flush_if_dirty().await {
		tracing::error!(error = %err, "Failed to save snapshot on exit.");
	}

	result
}

async fn dispatch(
	config: &Config,
	db: &Arc<Db>,
	engine: Option<&Arc<EmbeddingEngine>>,
	command: Command,
) -> color_eyre::Result<()> {
	let service = || -> color_eyre::Result<Arc<EmbeddingService>> {
		let Some(engine) = engine else {
			eyre::bail!("Embeddings are disabled in the configuration.");
		};
		let source = Arc::new(FsSource::new(&config.corpus));

		Ok(Arc::new(EmbeddingService::new(config, db.clone(), engine.clone(), source)))
	};

	match command {
		Command::Index { skip_traces } => {
			let queue = Arc::new(IndexingQueue::new(service()?, config.indexing.clone()));
			let reporter = tokio::spawn(report_progress(queue.clone()));
			let reports = index(&queue, skip_traces).await;

			reporter.abort();

			print_json(&reports?)
		},
		Command::Search { query, limit } =>
			print_json(&service()?.similarity_search(&query, limit).await?),
		Command::Notes { query, limit } =>
			print_json(&FullTextSearch::new(db.clone()).search_notes(&query, limit)?),
		Command::Traces { query, workspace, limit } =>
			print_json(&service()?.search_traces(&query, &workspace, limit).await?),
		Command::Stats => print_json(&db.statistics().await?),
		Command::Vacuum => {
			db.vacuum()?;
			db.save().await?;

			print_json(&db.stats().await?)
		},
	}
}

async fn index(queue: &IndexingQueue, skip_traces: bool) -> cairn_service::Result<Vec<IndexReport>> {
	let mut reports = vec![queue.start_full_index().await?];

	if !skip_traces {
		reports.push(queue.start_trace_backfill().await?);
	}

	Ok(reports)
}

async fn report_progress(queue: Arc<IndexingQueue>) {
	let mut progress = queue.subscribe();

	while progress.changed().await.is_ok() {
		let snapshot = progress.borrow_and_update().clone();

		match snapshot.phase {
			IndexingPhase::Indexing | IndexingPhase::Paused => tracing::info!(
				phase = ?snapshot.phase,
				processed = snapshot.processed_items,
				total = snapshot.total_items,
				eta_seconds = ?snapshot.estimated_seconds_remaining,
				"Indexing progress.",
			),
			_ => tracing::debug!(phase = ?snapshot.phase, "Indexing phase changed."),
		}
	}
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: serde::Serialize,
{
	let json = serde_json::to_string_pretty(value)?;

	println!("{json}");

	Ok(())
}
