pub mod db;
pub mod embeddings;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod records;
pub mod schema;
pub mod search;
pub mod snapshot;
pub mod vector;

mod error;

pub use db::{Db, OpenReport, SnapshotSource};
pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Current wall clock as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
	let now = time::OffsetDateTime::now_utc();

	(now.unix_timestamp_nanos() / 1_000_000) as i64
}
