const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Scored<T> {
	pub item: T,
	pub distance: f64,
	pub boost: f32,
	pub score: f64,
}

/// Linear decay from `max_boost` at age zero to nothing at `window_days`.
pub fn recency_boost(now_ms: i64, timestamp_ms: i64, window_days: f32, max_boost: f32) -> f32 {
	let window_ms = f64::from(window_days) * MS_PER_DAY;

	if window_ms <= 0.0 {
		return 0.0;
	}

	let age_ms = (now_ms - timestamp_ms).max(0) as f64;
	let boost = f64::from(max_boost) * (1.0 - age_ms / window_ms);

	(boost as f32).clamp(0.0, max_boost.max(0.0))
}

/// Whole-query containment in the document id beats single-term containment.
pub fn lexical_boost(query: &str, document_id: &str, path_boost: f32, term_boost: f32) -> f32 {
	let query = normalize_query(query);

	if query.is_empty() {
		return 0.0;
	}

	let document_id = document_id.to_lowercase();

	if document_id.contains(&query) {
		return path_boost;
	}
	if query
		.split(' ')
		.filter(|term| term.chars().count() >= 2)
		.any(|term| document_id.contains(term))
	{
		return term_boost;
	}

	0.0
}

/// Scores each `(item, distance, boost)` as `distance × (1 − min(boost, max_total_boost))`, sorts
/// ascending (stable for ties) and keeps `limit`.
pub fn rerank<T>(candidates: Vec<(T, f64, f32)>, max_total_boost: f32, limit: usize) -> Vec<Scored<T>> {
	let cap = f64::from(max_total_boost.clamp(0.0, 1.0));
	let mut scored = candidates
		.into_iter()
		.map(|(item, distance, boost)| {
			let applied = f64::from(boost.max(0.0)).min(cap);

			Scored { item, distance, boost, score: distance * (1.0 - applied) }
		})
		.collect::<Vec<_>>();

	scored.sort_by(|a, b| a.score.total_cmp(&b.score));
	scored.truncate(limit);

	scored
}

fn normalize_query(query: &str) -> String {
	query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
