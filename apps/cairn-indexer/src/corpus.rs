//! Markdown corpus on the local filesystem. Document ids are `/`-separated paths relative to the
//! corpus root.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use cairn_service::{BoxFuture, DocumentSource, Error, Result};

pub struct FsSource {
	root: PathBuf,
	extensions: Vec<String>,
}
impl FsSource {
	pub fn new(cfg: &cairn_config::Corpus) -> Self {
		let extensions =
			cfg.extensions.iter().map(|ext| ext.trim_start_matches('.').to_ascii_lowercase()).collect();

		Self { root: cfg.root.clone(), extensions }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Resolves an id to a path under the root. Ids that would escape the root are rejected.
	pub fn resolve(&self, id: &str) -> Result<PathBuf> {
		let relative = Path::new(id);

		if id.is_empty()
			|| relative.components().any(|part| !matches!(part, Component::Normal(_)))
		{
			return Err(Error::Source { message: format!("Document id {id:?} is not a corpus path.") });
		}

		Ok(self.root.join(relative))
	}

	fn scan(root: &Path, extensions: &[String]) -> Result<Vec<String>> {
		let mut ids = Vec::new();

		for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
			let entry = entry.map_err(|err| Error::Source {
				message: format!("Failed to walk corpus at {}: {err}", root.display()),
			})?;

			if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
				continue;
			}

			let Ok(relative) = entry.path().strip_prefix(root) else { continue };
			let Some(id) = document_id(relative) else {
				tracing::warn!(path = %entry.path().display(), "Skipping non-UTF-8 corpus path.");

				continue;
			};

			ids.push(id);
		}

		Ok(ids)
	}
}
impl DocumentSource for FsSource {
	fn list_documents(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move {
			if !self.root.exists() {
				tracing::warn!(root = %self.root.display(), "Corpus root does not exist.");

				return Ok(Vec::new());
			}

			let root = self.root.clone();
			let extensions = self.extensions.clone();

			tokio::task::spawn_blocking(move || Self::scan(&root, &extensions)).await.map_err(|err| {
				Error::Source { message: format!("Corpus scan task failed: {err}") }
			})?
		})
	}

	fn read_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			let path = self.resolve(id)?;

			tokio::fs::read_to_string(&path).await.map_err(|err| Error::Source {
				message: format!("Failed to read {}: {err}", path.display()),
			})
		})
	}
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

fn document_id(relative: &Path) -> Option<String> {
	let parts = relative
		.components()
		.map(|part| match part {
			Component::Normal(part) => part.to_str(),
			_ => None,
		})
		.collect::<Option<Vec<_>>>()?;

	Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn source(root: &Path) -> FsSource {
		FsSource::new(&cairn_config::Corpus {
			root: root.to_path_buf(),
			extensions: vec![".MD".to_string()],
		})
	}

	#[tokio::test]
	async fn lists_matching_files_by_relative_id() {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");

		std::fs::create_dir_all(dir.path().join("daily")).expect("Failed to create dir.");
		std::fs::write(dir.path().join("b.md"), "b").expect("Failed to write file.");
		std::fs::write(dir.path().join("daily").join("a.md"), "a").expect("Failed to write file.");
		std::fs::write(dir.path().join("image.png"), "png").expect("Failed to write file.");

		let ids = source(dir.path()).list_documents().await.expect("Failed to list documents.");

		assert_eq!(ids, vec!["b.md".to_string(), "daily/a.md".to_string()]);
	}

	#[tokio::test]
	async fn missing_root_lists_nothing() {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");
		let ids = source(&dir.path().join("absent")).list_documents().await.expect("Listing failed.");

		assert!(ids.is_empty());
	}

	#[tokio::test]
	async fn ids_cannot_escape_the_root() {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");
		let source = source(dir.path());

		assert!(source.resolve("../secret.md").is_err());
		assert!(source.resolve("/etc/passwd").is_err());
		assert!(source.resolve("").is_err());
		assert!(matches!(
			source.read_document("missing.md").await,
			Err(Error::Source { .. })
		));
	}
}
