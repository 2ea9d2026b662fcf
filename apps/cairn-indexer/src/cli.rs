use std::path::PathBuf;

use clap::{
	Parser, Subcommand,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};

const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

#[derive(Debug, Parser)]
#[command(version = VERSION, rename_all = "kebab", styles = styles())]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
	/// Embed every changed document, then backfill trace embeddings.
	Index {
		#[arg(long)]
		skip_traces: bool,
	},
	/// Semantic search over embedded documents.
	Search {
		#[arg(long, short = 'q', value_name = "TEXT")]
		query: String,
		#[arg(long, short = 'n', default_value_t = 10, value_parser = limit)]
		limit: usize,
	},
	/// Full-text search over notes.
	Notes {
		#[arg(long, short = 'q', value_name = "TEXT")]
		query: String,
		#[arg(long, short = 'n', default_value_t = 20, value_parser = limit)]
		limit: usize,
	},
	/// Semantic search over one workspace's traces.
	Traces {
		#[arg(long, short = 'q', value_name = "TEXT")]
		query: String,
		#[arg(long, short = 'w', value_name = "ID")]
		workspace: String,
		#[arg(long, short = 'n', default_value_t = 10, value_parser = limit)]
		limit: usize,
	},
	/// Print row counts, vector state and snapshot size as JSON.
	Stats,
	/// Compact the store and rebuild its full-text indexes.
	Vacuum,
}

/// Results are printed as JSON, so headers stay muted and values stand out.
fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::BrightBlue.on_default() | Effects::BOLD | Effects::UNDERLINE)
		.usage(AnsiColor::BrightBlue.on_default() | Effects::BOLD)
		.literal(AnsiColor::BrightWhite.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::BrightBlack.on_default() | Effects::ITALIC)
		.valid(AnsiColor::Green.on_default())
		.invalid(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}

fn limit(raw: &str) -> Result<usize, String> {
	match raw.parse::<usize>() {
		Ok(0) => Err("Limit must be at least 1.".to_string()),
		Ok(limit) => Ok(limit),
		Err(err) => Err(format!("Limit must be a positive integer: {err}.")),
	}
}
