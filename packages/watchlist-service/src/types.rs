use std::collections::BTreeMap;

use serde_json::{Map, Value};

use watchlist_domain::Language;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	Ac,
	Vector,
	Hybrid,
	FallbackAc,
	FallbackVector,
}
impl SearchMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ac => "ac",
			Self::Vector => "vector",
			Self::Hybrid => "hybrid",
			Self::FallbackAc => "fallback_ac",
			Self::FallbackVector => "fallback_vector",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
			"ac" => Some(Self::Ac),
			"vector" => Some(Self::Vector),
			"hybrid" => Some(Self::Hybrid),
			"fallback_ac" => Some(Self::FallbackAc),
			"fallback_vector" => Some(Self::FallbackVector),
			_ => None,
		}
	}
}

/// Per-call search options. The engine never mutates them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchOpts {
	pub top_k: u32,
	pub threshold: f32,
	pub search_mode: SearchMode,
	pub enable_escalation: bool,
	#[serde(default)]
	pub entity_type: Option<String>,
	#[serde(default)]
	pub country_filter: Option<String>,
	#[serde(default)]
	pub meta_filters: BTreeMap<String, Value>,
}
impl SearchOpts {
	pub fn from_config(cfg: &watchlist_config::Search) -> Self {
		Self {
			top_k: cfg.default_top_k,
			threshold: cfg.default_threshold,
			..Self::default()
		}
	}

	pub fn with_mode(mut self, mode: SearchMode) -> Self {
		self.search_mode = mode;

		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.top_k == 0 {
			return Err(Error::InvalidRequest { message: "top_k must be greater than zero.".into() });
		}
		if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
			return Err(Error::InvalidRequest {
				message: "threshold must be a finite value in the range 0.0-1.0.".into(),
			});
		}

		Ok(())
	}

	/// Whether results need filtering that the k-NN query cannot express.
	pub fn has_post_filters(&self) -> bool {
		self.country_filter.is_some() || !self.meta_filters.is_empty()
	}
}
impl Default for SearchOpts {
	fn default() -> Self {
		Self {
			top_k: 50,
			threshold: 0.5,
			search_mode: SearchMode::Hybrid,
			enable_escalation: true,
			entity_type: None,
			country_filter: None,
			meta_filters: BTreeMap::new(),
		}
	}
}

/// Identity and metadata of a watchlist entity as stored in the indices.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EntityRecord {
	pub entity_id: String,
	pub entity_type: String,
	pub normalized_name: String,
	#[serde(default)]
	pub aliases: Vec<String>,
	#[serde(default)]
	pub country: Option<String>,
	#[serde(default)]
	pub dob: Option<String>,
	#[serde(default)]
	pub meta: Map<String, Value>,
}
impl EntityRecord {
	pub fn context_required(&self) -> bool {
		self.meta.get("context_required").and_then(Value::as_bool).unwrap_or(false)
	}

	pub fn doc_id(&self) -> Option<&str> {
		self.meta.get("doc_id").and_then(Value::as_str)
	}
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AcType {
	Exact,
	Phrase,
	Ngram,
	Weak,
}
impl AcType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Exact => "exact",
			Self::Phrase => "phrase",
			Self::Ngram => "ngram",
			Self::Weak => "weak",
		}
	}

	/// Lower is more specific.
	pub fn specificity(self) -> u8 {
		self as u8
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AcScore {
	pub entity: EntityRecord,
	pub ac_score: f32,
	pub ac_type: AcType,
	pub matched_field: String,
	pub matched_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VectorHit {
	pub entity: EntityRecord,
	pub vector_score: f32,
	pub matched_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
	Exact,
	Phrase,
	Ngram,
	Weak,
	Vector,
	Fusion,
}
impl SearchType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Exact => "exact",
			Self::Phrase => "phrase",
			Self::Ngram => "ngram",
			Self::Weak => "weak",
			Self::Vector => "vector",
			Self::Fusion => "fusion",
		}
	}
}
impl From<AcType> for SearchType {
	fn from(value: AcType) -> Self {
		match value {
			AcType::Exact => Self::Exact,
			AcType::Phrase => Self::Phrase,
			AcType::Ngram => Self::Ngram,
			AcType::Weak => Self::Weak,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateFeatures {
	pub exact_match: bool,
	pub dob_match: bool,
	pub id_match: bool,
	pub multi_tier: bool,
	pub context_required: bool,
	pub context_present: bool,
	pub context_penalized: bool,
	pub matched_tiers: Vec<AcType>,
	pub best_ac_type: Option<AcType>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
	pub entity: EntityRecord,
	pub final_score: f32,
	pub ac_score: f32,
	pub vector_score: f32,
	pub matched_text: Option<String>,
	pub features: CandidateFeatures,
	pub search_type: SearchType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryVectorSource {
	Request,
	Provider,
	None,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchMetadata {
	pub mode: SearchMode,
	pub planned_stages: Vec<String>,
	pub ac_executed: bool,
	pub vector_executed: bool,
	pub escalated: bool,
	pub fallback_triggered: bool,
	pub ac_disabled: bool,
	pub exact_matches_unavailable: bool,
	pub query_vector_source: QueryVectorSource,
	pub ac_time_ms: u64,
	pub vector_time_ms: u64,
	pub fusion_time_ms: u64,
	pub normalized_query: String,
	pub language: Option<Language>,
}
impl SearchMetadata {
	pub fn new(mode: SearchMode) -> Self {
		Self {
			mode,
			planned_stages: Vec::new(),
			ac_executed: false,
			vector_executed: false,
			escalated: false,
			fallback_triggered: false,
			ac_disabled: false,
			exact_matches_unavailable: false,
			query_vector_source: QueryVectorSource::None,
			ac_time_ms: 0,
			vector_time_ms: 0,
			fusion_time_ms: 0,
			normalized_query: String::new(),
			language: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
	pub normalized_name: String,
	#[serde(default)]
	pub original_text: String,
	#[serde(default)]
	pub language: Option<Language>,
	#[serde(default)]
	pub tokens: Option<Vec<String>>,
	/// Extra candidate strings from the normalization layer.
	#[serde(default)]
	pub variants: Vec<String>,
	#[serde(default)]
	pub query_vector: Option<Vec<f32>>,
	pub opts: SearchOpts,
}
impl SearchRequest {
	pub fn new(normalized_name: &str, opts: SearchOpts) -> Self {
		Self {
			normalized_name: normalized_name.to_string(),
			original_text: normalized_name.to_string(),
			language: None,
			tokens: None,
			variants: Vec::new(),
			query_vector: None,
			opts,
		}
	}

	pub fn with_original_text(mut self, text: &str) -> Self {
		self.original_text = text.to_string();

		self
	}

	pub fn with_query_vector(mut self, vector: Vec<f32>) -> Self {
		self.query_vector = Some(vector);

		self
	}

	pub fn with_variants<I, S>(mut self, variants: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.variants = variants.into_iter().map(Into::into).collect();

		self
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchResult {
	pub candidates: Vec<Candidate>,
	pub ac_results: Vec<AcScore>,
	pub vector_results: Vec<VectorHit>,
	pub search_metadata: SearchMetadata,
	pub processing_time_ms: u64,
	pub success: bool,
	pub errors: Vec<String>,
}
impl SearchResult {
	pub fn failed(mode: SearchMode, errors: Vec<String>) -> Self {
		Self {
			candidates: Vec::new(),
			ac_results: Vec::new(),
			vector_results: Vec::new(),
			search_metadata: SearchMetadata::new(mode),
			processing_time_ms: 0,
			success: false,
			errors,
		}
	}
}
