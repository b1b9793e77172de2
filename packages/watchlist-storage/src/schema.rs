use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
	Ac,
	Vector,
	Patterns,
}
impl IndexKind {
	pub const ALL: [IndexKind; 3] = [IndexKind::Ac, IndexKind::Vector, IndexKind::Patterns];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ac => "ac",
			Self::Vector => "vector",
			Self::Patterns => "patterns",
		}
	}

	pub fn index_name(self, cfg: &watchlist_config::Storage) -> &str {
		match self {
			Self::Ac => &cfg.ac_index,
			Self::Vector => &cfg.vector_index,
			Self::Patterns => &cfg.patterns_index,
		}
	}
}

/// Renders the create-index body for `kind` with configured vector settings.
pub fn render_mapping(kind: IndexKind, cfg: &watchlist_config::Storage) -> Result<Value> {
	let template = match kind {
		IndexKind::Ac => include_str!("../mappings/ac_index.json"),
		IndexKind::Vector => include_str!("../mappings/vector_index.json"),
		IndexKind::Patterns => include_str!("../mappings/patterns_index.json"),
	};
	let rendered = template
		.replace("<VECTOR_DIM>", &cfg.vector_dim.to_string())
		.replace("<VECTOR_FIELD>", &cfg.vector_field)
		.replace("<SIMILARITY>", &cfg.similarity);

	serde_json::from_str(&rendered).map_err(|err| Error::InvalidConfig {
		message: format!("Failed to render {} mapping: {err}.", kind.as_str()),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_mapping_carries_dimension_and_similarity() {
		let cfg = watchlist_config::Storage {
			vector_dim: 768,
			vector_field: "embedding".to_string(),
			similarity: "dot_product".to_string(),
			..Default::default()
		};
		let mapping = render_mapping(IndexKind::Vector, &cfg).expect("Failed to render mapping.");
		let field = &mapping["mappings"]["properties"]["embedding"];

		assert_eq!(field["type"], "dense_vector");
		assert_eq!(field["dims"], 768);
		assert_eq!(field["similarity"], "dot_product");
		assert_eq!(mapping["mappings"]["properties"]["dob_anchor"]["type"], "keyword");
	}

	#[test]
	fn ac_mapping_has_tier_sub_fields() {
		let mapping = render_mapping(IndexKind::Ac, &watchlist_config::Storage::default())
			.expect("Failed to render mapping.");

		for name in ["normalized_text", "aliases", "legal_names"] {
			let fields = mapping["mappings"]["properties"][name]["fields"]
				.as_object()
				.expect("Expected sub-fields.");
			let mut subs: Vec<&str> = fields.keys().map(String::as_str).collect();

			subs.sort();

			assert_eq!(subs, vec!["edge_ngram", "keyword"], "Unexpected sub-fields on {name}.");
		}
	}

	#[test]
	fn patterns_mapping_uses_two_to_twenty_grams() {
		let mapping = render_mapping(IndexKind::Patterns, &watchlist_config::Storage::default())
			.expect("Failed to render mapping.");
		let filter = &mapping["settings"]["analysis"]["filter"]["pattern_edge_ngram"];

		assert_eq!(filter["min_gram"], 2);
		assert_eq!(filter["max_gram"], 20);
		assert_eq!(mapping["mappings"]["properties"]["pattern"]["fields"]["edge"]["type"], "text");
		assert_eq!(mapping["mappings"]["properties"]["tier"]["type"], "integer");
	}

	#[test]
	fn index_names_follow_config() {
		let cfg = watchlist_config::Storage::default();

		assert_eq!(IndexKind::Ac.index_name(&cfg), "watchlist_ac");
		assert_eq!(IndexKind::Patterns.index_name(&cfg), "watchlist_ac_patterns");
	}
}
