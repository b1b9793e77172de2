use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	#[serde(default)]
	pub storage: Storage,
	#[serde(default)]
	pub resilience: Resilience,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub monitoring: Monitoring,
	#[serde(default)]
	pub providers: Providers,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: "info".to_string() }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Storage {
	/// Explicit host list. Empty means resolve from the environment and deployment context.
	pub hosts: Vec<String>,
	pub username: Option<String>,
	pub password: Option<String>,
	pub api_key: Option<String>,
	pub use_tls: bool,
	pub tls_verify: bool,
	pub ca_cert_path: Option<PathBuf>,
	pub ac_index: String,
	pub vector_index: String,
	pub patterns_index: String,
	pub vector_dim: u32,
	pub vector_field: String,
	/// One of cosine, dot_product, or l2_norm.
	pub similarity: String,
	/// Hostnames of machines that should talk to `production_hosts`.
	pub production_hostnames: Vec<String>,
	pub production_hosts: Vec<String>,
	pub timeouts: StorageTimeouts,
}
impl Default for Storage {
	fn default() -> Self {
		Self {
			hosts: Vec::new(),
			username: None,
			password: None,
			api_key: None,
			use_tls: false,
			tls_verify: true,
			ca_cert_path: None,
			ac_index: "watchlist_ac".to_string(),
			vector_index: "watchlist_vectors".to_string(),
			patterns_index: "watchlist_ac_patterns".to_string(),
			vector_dim: 384,
			vector_field: "name_vector".to_string(),
			similarity: "cosine".to_string(),
			production_hostnames: Vec::new(),
			production_hosts: Vec::new(),
			timeouts: StorageTimeouts::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageTimeouts {
	pub health_ms: u64,
	pub search_ms: u64,
	pub index_ms: u64,
}
impl Default for StorageTimeouts {
	fn default() -> Self {
		Self { health_ms: 5_000, search_ms: 30_000, index_ms: 60_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Resilience {
	pub max_retries: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
	pub jitter_ratio: f32,
	pub failure_threshold: u32,
	pub cooldown_ms: u64,
	pub health_ttl_ms: u64,
}
impl Default for Resilience {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_backoff_ms: 100,
			max_backoff_ms: 5_000,
			jitter_ratio: 0.2,
			failure_threshold: 3,
			cooldown_ms: 30_000,
			health_ttl_ms: 30_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_top_k: u32,
	pub default_threshold: f32,
	pub ac_weight: f32,
	pub vector_weight: f32,
	/// Run the vector tier next to AC in hybrid mode even when AC is strong.
	pub hybrid_vector_enrichment: bool,
	pub ac_patterns_enabled: bool,
	/// Candidate pool handed to the k-NN query.
	pub num_candidates: u32,
	/// Minimum entity overlap expected across case and diacritic variants of one query.
	pub variant_overlap: f32,
	pub tiers: SearchTiers,
	pub thresholds: SearchThresholds,
	pub escalation: SearchEscalation,
	pub bonuses: SearchBonuses,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_top_k: 50,
			default_threshold: 0.5,
			ac_weight: 0.55,
			vector_weight: 0.45,
			hybrid_vector_enrichment: true,
			ac_patterns_enabled: false,
			num_candidates: 100,
			variant_overlap: 0.8,
			tiers: SearchTiers::default(),
			thresholds: SearchThresholds::default(),
			escalation: SearchEscalation::default(),
			bonuses: SearchBonuses::default(),
		}
	}
}

/// Score bands for the AC tiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchTiers {
	pub exact_score: f32,
	pub phrase_floor: f32,
	pub phrase_ceiling: f32,
	pub ngram_floor: f32,
	pub ngram_ceiling: f32,
	pub weak_cutoff: f32,
}
impl Default for SearchTiers {
	fn default() -> Self {
		Self {
			exact_score: 2.0,
			phrase_floor: 1.0,
			phrase_ceiling: 1.9,
			ngram_floor: 0.6,
			ngram_ceiling: 0.95,
			weak_cutoff: 0.7,
		}
	}
}

/// Minimum contributing score per tier. An infinite value disables the tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchThresholds {
	pub exact: f32,
	pub phrase: f32,
	pub ngram: f32,
	pub weak: f32,
	pub vector: f32,
}
impl Default for SearchThresholds {
	fn default() -> Self {
		Self { exact: 2.0, phrase: 1.0, ngram: 0.7, weak: 0.6, vector: 0.0 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchEscalation {
	pub ac_empty_threshold: f32,
	pub ac_weak_threshold: f32,
}
impl Default for SearchEscalation {
	fn default() -> Self {
		Self { ac_empty_threshold: 0.5, ac_weak_threshold: 1.0 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchBonuses {
	pub dob_match: f32,
	pub id_match: f32,
	pub multi_tier: f32,
	/// Multiplier applied to an AC score whose pattern requires context that the text lacks.
	pub context_penalty: f32,
}
impl Default for SearchBonuses {
	fn default() -> Self {
		Self { dob_match: 0.1, id_match: 0.15, multi_tier: 0.05, context_penalty: 0.5 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Monitoring {
	pub window_size: usize,
	pub min_samples: usize,
	pub p95_warn_ms: f64,
	pub p95_critical_ms: f64,
	pub error_rate_warn: f64,
	pub error_rate_critical: f64,
}
impl Default for Monitoring {
	fn default() -> Self {
		Self {
			window_size: 1_000,
			min_samples: 20,
			p95_warn_ms: 200.0,
			p95_critical_ms: 1_000.0,
			error_rate_warn: 0.05,
			error_rate_critical: 0.2,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Providers {
	pub embedding: Option<EmbeddingProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}
