use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use watchlist_domain::anchors;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub country: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub country_code: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dob: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gender: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub doc_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub entity_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub confidence: Option<f32>,
}
impl EntityMetadata {
	/// Flat view used for `meta_filters` equality checks.
	pub fn to_map(&self) -> Map<String, Value> {
		match serde_json::to_value(self) {
			Ok(Value::Object(map)) => map,
			_ => Map::new(),
		}
	}
}

/// Source document of the AC index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcDocument {
	pub entity_id: String,
	pub entity_type: String,
	pub normalized_text: String,
	#[serde(default)]
	pub aliases: Vec<String>,
	#[serde(default)]
	pub legal_names: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub original_text: Option<String>,
	#[serde(default)]
	pub metadata: EntityMetadata,
}
impl AcDocument {
	/// Builds a document with folded names so the keyword tier compares like with like.
	pub fn new(entity_id: &str, entity_type: &str, name: &str) -> Self {
		Self {
			entity_id: entity_id.to_string(),
			entity_type: entity_type.to_string(),
			normalized_text: watchlist_domain::fold(name),
			aliases: Vec::new(),
			legal_names: Vec::new(),
			original_text: Some(name.to_string()),
			metadata: EntityMetadata {
				entity_id: Some(entity_id.to_string()),
				..Default::default()
			},
		}
	}

	pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.aliases =
			aliases.into_iter().map(|alias| watchlist_domain::fold(alias.as_ref())).collect();

		self
	}

	pub fn with_legal_names<I, S>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.legal_names =
			names.into_iter().map(|name| watchlist_domain::fold(name.as_ref())).collect();

		self
	}

	pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
		let entity_id = metadata.entity_id.clone().or_else(|| Some(self.entity_id.clone()));

		self.metadata = EntityMetadata { entity_id, ..metadata };

		self
	}
}

/// Source document of the vector index. The embedding lives under the configured field name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
	pub entity_id: String,
	pub entity_type: String,
	pub text: String,
	pub normalized_text: String,
	#[serde(default)]
	pub aliases: Vec<String>,
	#[serde(default)]
	pub metadata: EntityMetadata,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dob_anchor: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_anchor: Option<String>,
	#[serde(skip)]
	pub vector: Vec<f32>,
}
impl VectorDocument {
	pub fn new(entity_id: &str, entity_type: &str, name: &str, vector: Vec<f32>) -> Self {
		Self {
			entity_id: entity_id.to_string(),
			entity_type: entity_type.to_string(),
			text: name.to_string(),
			normalized_text: watchlist_domain::fold(name),
			aliases: Vec::new(),
			metadata: EntityMetadata {
				entity_id: Some(entity_id.to_string()),
				..Default::default()
			},
			dob_anchor: None,
			id_anchor: None,
			vector,
		}
	}

	/// Sets metadata and derives the date-of-birth and document anchors from it.
	pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
		self.dob_anchor = metadata.dob.as_deref().and_then(anchors::normalize_date);
		self.id_anchor = metadata
			.doc_id
			.as_deref()
			.map(anchors::normalize_id)
			.filter(|id| !id.is_empty());

		let entity_id = metadata.entity_id.clone().or_else(|| Some(self.entity_id.clone()));

		self.metadata = EntityMetadata { entity_id, ..metadata };

		self
	}

	pub fn to_source(&self, vector_field: &str) -> Value {
		let mut source = match serde_json::to_value(self) {
			Ok(Value::Object(map)) => map,
			_ => Map::new(),
		};

		source.insert(
			vector_field.to_string(),
			Value::Array(self.vector.iter().map(|value| Value::from(*value as f64)).collect()),
		);

		Value::Object(source)
	}
}

/// Source document of the AC-patterns index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternDocument {
	pub pattern: String,
	/// 0 exact, 1 phrase, 2 n-gram, 3 weak.
	pub tier: u8,
	#[serde(default)]
	pub meta: PatternMeta,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternMeta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pattern_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
	pub confidence: f32,
	pub boost_score: f32,
	pub context_required: bool,
	pub min_match_length: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub entity_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub entity_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub canonical: Option<String>,
}
impl Default for PatternMeta {
	fn default() -> Self {
		Self {
			pattern_type: None,
			language: None,
			confidence: 1.0,
			boost_score: 1.0,
			context_required: false,
			min_match_length: 0,
			entity_id: None,
			entity_type: None,
			canonical: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ac_document_folds_names() {
		let doc = AcDocument::new("person_001", "person", "Иван ПЕТРОВ")
			.with_aliases(["Ivan Petróv"]);

		assert_eq!(doc.normalized_text, "иван петров");
		assert_eq!(doc.aliases, vec!["ivan petrov"]);
		assert_eq!(doc.metadata.entity_id.as_deref(), Some("person_001"));
	}

	#[test]
	fn vector_source_carries_named_vector_and_anchors() {
		let doc = VectorDocument::new("person_001", "person", "Иван Петров", vec![1.0, 0.0])
			.with_metadata(EntityMetadata {
				dob: Some("12.03.1975".to_string()),
				doc_id: Some("mk-123 456".to_string()),
				..Default::default()
			});
		let source = doc.to_source("name_vector");

		assert_eq!(source["name_vector"], serde_json::json!([1.0, 0.0]));
		assert_eq!(source["dob_anchor"], "1975-03-12");
		assert_eq!(source["id_anchor"], "MK123456");
		assert_eq!(source["metadata"]["entity_id"], "person_001");
	}

	#[test]
	fn pattern_meta_defaults_apply() {
		let doc: PatternDocument =
			serde_json::from_value(serde_json::json!({ "pattern": "петров", "tier": 2 }))
				.expect("Failed to parse pattern document.");

		assert_eq!(doc.meta.confidence, 1.0);
		assert_eq!(doc.meta.boost_score, 1.0);
		assert!(!doc.meta.context_required);
	}

	#[test]
	fn metadata_map_skips_missing_fields() {
		let meta = EntityMetadata { country: Some("RU".to_string()), ..Default::default() };
		let map = meta.to_map();

		assert_eq!(map.len(), 1);
		assert_eq!(map["country"], "RU");
	}
}
