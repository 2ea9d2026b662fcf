mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Corpus, Embedding, EmbeddingBackend, HttpBackend, Indexing, ProcessBackend, Ranking,
	Service, Storage,
};

use std::{fs, path::Path};

/// Upper bound on rows returned by one paginated query.
pub const MAX_PAGE_SIZE: u32 = 200;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.snapshot_path.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.snapshot_path must be non-empty.".to_string(),
		});
	}
	if cfg.storage.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.autosave_interval_ms == 0 {
		return Err(Error::Validation {
			message: "storage.autosave_interval_ms must be greater than zero.".to_string(),
		});
	}
	if !(1..=MAX_PAGE_SIZE).contains(&cfg.storage.max_page_size) {
		return Err(Error::Validation {
			message: format!("storage.max_page_size must be between 1 and {MAX_PAGE_SIZE}."),
		});
	}
	if cfg.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::Validation {
			message: "embedding.dimensions must match storage.vector_dim.".to_string(),
		});
	}
	if cfg.embedding.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "embedding.model must be non-empty.".to_string(),
		});
	}
	if cfg.embedding.init_timeout_ms == 0 || cfg.embedding.request_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "embedding timeouts must be greater than zero.".to_string(),
		});
	}

	validate_backend(cfg)?;
	validate_indexing(cfg)?;
	validate_ranking(cfg)?;

	if cfg.corpus.extensions.iter().any(|ext| ext.trim().is_empty()) {
		return Err(Error::Validation {
			message: "corpus.extensions must not contain empty entries.".to_string(),
		});
	}

	Ok(())
}

fn validate_backend(cfg: &Config) -> Result<()> {
	if !cfg.embedding.enabled {
		return Ok(());
	}

	match cfg.embedding.backend {
		EmbeddingBackend::Http => {
			let Some(http) = cfg.embedding.http.as_ref() else {
				return Err(Error::Validation {
					message: "embedding.http must be set when embedding.backend is http."
						.to_string(),
				});
			};

			for (label, value) in [
				("embedding.http.api_base", &http.api_base),
				("embedding.http.api_key", &http.api_key),
				("embedding.http.path", &http.path),
			] {
				if value.trim().is_empty() {
					return Err(Error::Validation { message: format!("{label} must be non-empty.") });
				}
			}

			if http.timeout_ms == 0 {
				return Err(Error::Validation {
					message: "embedding.http.timeout_ms must be greater than zero.".to_string(),
				});
			}
		},
		EmbeddingBackend::Process => {
			let Some(process) = cfg.embedding.process.as_ref() else {
				return Err(Error::Validation {
					message: "embedding.process must be set when embedding.backend is process."
						.to_string(),
				});
			};

			if process.program.trim().is_empty() {
				return Err(Error::Validation {
					message: "embedding.process.program must be non-empty.".to_string(),
				});
			}
		},
	}

	Ok(())
}

fn validate_indexing(cfg: &Config) -> Result<()> {
	let indexing = &cfg.indexing;

	if indexing.flush_every == 0 {
		return Err(Error::Validation {
			message: "indexing.flush_every must be greater than zero.".to_string(),
		});
	}
	if indexing.eta_window == 0 {
		return Err(Error::Validation {
			message: "indexing.eta_window must be greater than zero.".to_string(),
		});
	}
	if indexing.pause_poll_ms == 0 {
		return Err(Error::Validation {
			message: "indexing.pause_poll_ms must be greater than zero.".to_string(),
		});
	}
	if indexing.max_content_chars == 0 {
		return Err(Error::Validation {
			message: "indexing.max_content_chars must be greater than zero.".to_string(),
		});
	}
	if indexing.min_content_chars >= indexing.max_content_chars {
		return Err(Error::Validation {
			message: "indexing.min_content_chars must be less than indexing.max_content_chars."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	if ranking.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "ranking.candidate_multiplier must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("ranking.recency_window_days", ranking.recency_window_days),
		("ranking.trace_recency_window_days", ranking.trace_recency_window_days),
	] {
		if !value.is_finite() || value <= 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number greater than zero."),
			});
		}
	}
	for (label, value) in [
		("ranking.max_recency_boost", ranking.max_recency_boost),
		("ranking.path_match_boost", ranking.path_match_boost),
		("ranking.term_match_boost", ranking.term_match_boost),
		("ranking.max_total_boost", ranking.max_total_boost),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0 (inclusive) to 1.0 (exclusive)."),
			});
		}
	}

	if ranking.term_match_boost > ranking.path_match_boost {
		return Err(Error::Validation {
			message: "ranking.term_match_boost must not exceed ranking.path_match_boost."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if let Some(process) = cfg.embedding.process.as_mut() {
		process.args.retain(|arg| !arg.trim().is_empty());
	}

	for ext in &mut cfg.corpus.extensions {
		*ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
	}

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
