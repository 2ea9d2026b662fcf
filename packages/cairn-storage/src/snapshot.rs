//! Whole-image snapshot files. A snapshot is a complete SQLite database image; there is no
//! incremental format.

use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
};

use tokio::fs;

use crate::{Error, Result};

const HEADER_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const HEADER_LEN: usize = 100;

/// Returns `None` when there is no snapshot or it holds no bytes.
pub async fn read(path: &Path) -> Result<Option<Vec<u8>>> {
	match fs::read(path).await {
		Ok(bytes) if bytes.is_empty() => Ok(None),
		Ok(bytes) => Ok(Some(bytes)),
		Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
		Err(err) => Err(err.into()),
	}
}

/// Replaces the snapshot wholesale through a sibling temp file and a rename.
pub async fn write(path: &Path, bytes: &[u8]) -> Result<()> {
	if let Some(parent) = path.parent()
		&& !parent.as_os_str().is_empty()
	{
		fs::create_dir_all(parent).await?;
	}

	let tmp = temp_path(path);

	fs::write(&tmp, bytes).await?;

	if let Err(err) = fs::rename(&tmp, path).await {
		let _ = fs::remove_file(&tmp).await;

		return Err(err.into());
	}

	Ok(())
}

pub async fn discard(path: &Path) -> Result<()> {
	match fs::remove_file(path).await {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
		Err(err) => Err(err.into()),
	}
}

pub async fn size(path: &Path) -> u64 {
	fs::metadata(path).await.map(|meta| meta.len()).unwrap_or(0)
}

/// Structural checks on the raw image before SQLite is asked to open it.
pub fn validate(bytes: &[u8]) -> Result<()> {
	if bytes.len() < HEADER_LEN {
		return Err(Error::CorruptSnapshot(format!(
			"Image is {} bytes, shorter than the {HEADER_LEN}-byte header.",
			bytes.len()
		)));
	}
	if &bytes[..HEADER_MAGIC.len()] != HEADER_MAGIC {
		return Err(Error::CorruptSnapshot("Image header magic does not match.".to_string()));
	}

	let page_size = match u16::from_be_bytes([bytes[16], bytes[17]]) {
		1 => 65_536_usize,
		raw => raw as usize,
	};

	if !page_size.is_power_of_two() || !(512..=65_536).contains(&page_size) {
		return Err(Error::CorruptSnapshot(format!("Invalid page size {page_size}.")));
	}
	if bytes.len() % page_size != 0 {
		return Err(Error::CorruptSnapshot(format!(
			"Image length {} is not a multiple of the page size {page_size}.",
			bytes.len()
		)));
	}

	let page_count = u32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]) as usize;

	if page_count != 0 && page_count * page_size != bytes.len() {
		return Err(Error::CorruptSnapshot(format!(
			"Header declares {page_count} pages but the image holds {}.",
			bytes.len() / page_size
		)));
	}

	Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();

	name.push(".tmp");

	path.with_file_name(name)
}
