use std::sync::Once;

use rusqlite::{Connection, ffi::sqlite3_auto_extension};

static REGISTER: Once = Once::new();

/// Registers sqlite-vec for every connection opened afterwards in this process.
pub fn register_extension() {
	REGISTER.call_once(|| {
		// SAFETY: `sqlite3_vec_init` is the statically linked extension entry point. Its
		// signature matches the auto-extension callback that SQLite invokes per connection.
		unsafe {
			#[allow(clippy::missing_transmute_annotations)]
			sqlite3_auto_extension(Some(std::mem::transmute(
				sqlite_vec::sqlite3_vec_init as *const (),
			)));
		}
	});
}

/// Returns the extension version when vector functions work on this connection.
pub fn extension_version(conn: &Connection) -> Option<String> {
	match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
		Ok(version) => Some(version),
		Err(err) => {
			tracing::warn!(error = %err, "Vector extension unavailable. Vector search is disabled.");

			None
		},
	}
}

pub fn encode(vector: &[f32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(vector.len() * size_of::<f32>());

	for value in vector {
		out.extend_from_slice(&value.to_le_bytes());
	}

	out
}

pub fn decode(blob: &[u8]) -> Option<Vec<f32>> {
	if blob.len() % size_of::<f32>() != 0 {
		return None;
	}

	Some(
		blob.chunks_exact(size_of::<f32>())
			.map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
			.collect(),
	)
}
