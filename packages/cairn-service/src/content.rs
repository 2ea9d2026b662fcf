//! Turns raw document text into the exact string that gets embedded and hashed.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static FRONT_MATTER: LazyLock<Result<Regex, regex::Error>> =
	LazyLock::new(|| Regex::new(r"(?s)\A\s*---[ \t]*\r?\n.*?\r?\n---[ \t]*(?:\r?\n|\z)"));
static EMBED_LINK: LazyLock<Result<Regex, regex::Error>> =
	LazyLock::new(|| Regex::new(r"!\[\[([^\]|]*)(?:\|([^\]]*))?\]\]"));
static IMAGE_LINK: LazyLock<Result<Regex, regex::Error>> =
	LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
	pub min_chars: usize,
	pub max_chars: usize,
}
impl Limits {
	pub fn from_config(cfg: &cairn_config::Indexing) -> Self {
		Self { min_chars: cfg.min_content_chars as usize, max_chars: cfg.max_content_chars as usize }
	}
}
impl Default for Limits {
	fn default() -> Self {
		Self { min_chars: 20, max_chars: 8_000 }
	}
}

/// Returns an empty string when too little text remains to be worth embedding.
pub fn preprocess(raw: &str, limits: Limits) -> String {
	let mut text = raw.to_string();

	if let Some(re) = pattern(&FRONT_MATTER) {
		text = re.replace(&text, "").into_owned();
	}
	if let Some(re) = pattern(&EMBED_LINK) {
		text = re
			.replace_all(&text, |caps: &Captures<'_>| {
				caps.get(2).map(|alias| alias.as_str().to_string()).unwrap_or_default()
			})
			.into_owned();
	}
	if let Some(re) = pattern(&IMAGE_LINK) {
		text = re.replace_all(&text, "$1").into_owned();
	}

	limit(&collapse_whitespace(&text), limits)
}

/// Whitespace collapse and length limits only. Used for trace text.
pub fn normalize(raw: &str, limits: Limits) -> String {
	limit(&collapse_whitespace(raw), limits)
}

/// Hex BLAKE3 digest. Only ever compared for equality.
pub fn content_hash(text: &str) -> String {
	blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn limit(text: &str, limits: Limits) -> String {
	let count = text.chars().count();

	if count < limits.min_chars {
		return String::new();
	}
	if count > limits.max_chars {
		return text.chars().take(limits.max_chars).collect();
	}

	text.to_string()
}

fn pattern(cell: &'static LazyLock<Result<Regex, regex::Error>>) -> Option<&'static Regex> {
	match LazyLock::force(cell) {
		Ok(re) => Some(re),
		Err(err) => {
			tracing::error!(error = %err, "Failed to compile preprocessing pattern.");

			None
		},
	}
}
