mod env;
mod error;
mod types;

pub use env::{apply_overrides, split_list};
pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Monitoring, Providers, Resilience, Search, SearchBonuses,
	SearchEscalation, SearchThresholds, SearchTiers, Service, Storage, StorageTimeouts,
};

use std::{fs, path::Path};

pub const SIMILARITIES: [&str; 3] = ["cosine", "dot_product", "l2_norm"];

pub fn load(path: &Path) -> Result<Config> {
	load_with_env(path, |name| std::env::var(name).ok())
}

pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Config>
where
	F: Fn(&str) -> Option<String>,
{
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_overrides(&mut cfg, lookup)?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

/// Builds a config from defaults plus process environment overrides.
pub fn from_env() -> Result<Config> {
	let mut cfg = Config::default();

	apply_overrides(&mut cfg, |name| std::env::var(name).ok())?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for host in &cfg.storage.hosts {
		if host.trim().is_empty() || host.chars().any(char::is_whitespace) {
			return Err(Error::Validation {
				message: format!("storage.hosts contains an invalid host {host:?}."),
			});
		}
	}

	if cfg.storage.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.vector_dim must be greater than zero.".to_string(),
		});
	}
	if !SIMILARITIES.contains(&cfg.storage.similarity.as_str()) {
		return Err(Error::Validation {
			message: "storage.similarity must be one of cosine, dot_product, or l2_norm."
				.to_string(),
		});
	}

	for (label, value) in [
		("storage.ac_index", &cfg.storage.ac_index),
		("storage.vector_index", &cfg.storage.vector_index),
		("storage.patterns_index", &cfg.storage.patterns_index),
		("storage.vector_field", &cfg.storage.vector_field),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}
	for (label, value) in [
		("storage.timeouts.health_ms", cfg.storage.timeouts.health_ms),
		("storage.timeouts.search_ms", cfg.storage.timeouts.search_ms),
		("storage.timeouts.index_ms", cfg.storage.timeouts.index_ms),
		("resilience.base_backoff_ms", cfg.resilience.base_backoff_ms),
		("resilience.cooldown_ms", cfg.resilience.cooldown_ms),
		("resilience.health_ttl_ms", cfg.resilience.health_ttl_ms),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.resilience.failure_threshold == 0 {
		return Err(Error::Validation {
			message: "resilience.failure_threshold must be greater than zero.".to_string(),
		});
	}
	if cfg.resilience.max_backoff_ms < cfg.resilience.base_backoff_ms {
		return Err(Error::Validation {
			message: "resilience.max_backoff_ms must be at least resilience.base_backoff_ms."
				.to_string(),
		});
	}
	if !cfg.resilience.jitter_ratio.is_finite() || !(0.0..=1.0).contains(&cfg.resilience.jitter_ratio)
	{
		return Err(Error::Validation {
			message: "resilience.jitter_ratio must be in the range 0.0-1.0.".to_string(),
		});
	}

	validate_search(&cfg.search)?;

	if cfg.monitoring.window_size == 0 {
		return Err(Error::Validation {
			message: "monitoring.window_size must be greater than zero.".to_string(),
		});
	}
	if cfg.monitoring.p95_critical_ms < cfg.monitoring.p95_warn_ms {
		return Err(Error::Validation {
			message: "monitoring.p95_critical_ms must be at least monitoring.p95_warn_ms."
				.to_string(),
		});
	}
	if cfg.monitoring.error_rate_critical < cfg.monitoring.error_rate_warn {
		return Err(Error::Validation {
			message: "monitoring.error_rate_critical must be at least monitoring.error_rate_warn."
				.to_string(),
		});
	}

	if let Some(embedding) = cfg.providers.embedding.as_ref() {
		if embedding.dimensions == 0 {
			return Err(Error::Validation {
				message: "providers.embedding.dimensions must be greater than zero.".to_string(),
			});
		}
		if embedding.dimensions != cfg.storage.vector_dim {
			return Err(Error::Validation {
				message: "providers.embedding.dimensions must match storage.vector_dim."
					.to_string(),
			});
		}
		if embedding.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: "Provider embedding api_key must be non-empty.".to_string(),
			});
		}
		if embedding.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn validate_search(search: &crate::Search) -> Result<()> {
	if search.default_top_k == 0 {
		return Err(Error::Validation {
			message: "search.default_top_k must be greater than zero.".to_string(),
		});
	}
	if search.num_candidates == 0 {
		return Err(Error::Validation {
			message: "search.num_candidates must be greater than zero.".to_string(),
		});
	}
	if !search.default_threshold.is_finite() || !(0.0..=1.0).contains(&search.default_threshold) {
		return Err(Error::Validation {
			message: "search.default_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}

	for (label, weight) in
		[("search.ac_weight", search.ac_weight), ("search.vector_weight", search.vector_weight)]
	{
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&weight) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if search.ac_weight + search.vector_weight <= 0.0 {
		return Err(Error::Validation {
			message: "search.ac_weight and search.vector_weight must not both be zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&search.variant_overlap) {
		return Err(Error::Validation {
			message: "search.variant_overlap must be in the range 0.0-1.0.".to_string(),
		});
	}

	let tiers = &search.tiers;

	for (label, value) in [
		("search.tiers.exact_score", tiers.exact_score),
		("search.tiers.phrase_floor", tiers.phrase_floor),
		("search.tiers.phrase_ceiling", tiers.phrase_ceiling),
		("search.tiers.ngram_floor", tiers.ngram_floor),
		("search.tiers.ngram_ceiling", tiers.ngram_ceiling),
		("search.tiers.weak_cutoff", tiers.weak_cutoff),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
	}

	if tiers.exact_score < 2.0 {
		return Err(Error::Validation {
			message: "search.tiers.exact_score must be 2.0 or greater.".to_string(),
		});
	}
	if !(tiers.ngram_floor > 0.0
		&& tiers.ngram_floor <= tiers.ngram_ceiling
		&& tiers.ngram_ceiling < tiers.phrase_floor
		&& tiers.phrase_floor <= tiers.phrase_ceiling
		&& tiers.phrase_ceiling < tiers.exact_score)
	{
		return Err(Error::Validation {
			message: "search.tiers bands must be ordered ngram < phrase < exact without overlap."
				.to_string(),
		});
	}
	if !(tiers.ngram_floor..=tiers.ngram_ceiling).contains(&tiers.weak_cutoff) {
		return Err(Error::Validation {
			message: "search.tiers.weak_cutoff must lie inside the ngram band.".to_string(),
		});
	}

	let thresholds = &search.thresholds;

	for (label, value) in [
		("search.thresholds.exact", thresholds.exact),
		("search.thresholds.phrase", thresholds.phrase),
		("search.thresholds.ngram", thresholds.ngram),
		("search.thresholds.weak", thresholds.weak),
		("search.thresholds.vector", thresholds.vector),
	] {
		if value.is_nan() {
			return Err(Error::Validation { message: format!("{label} must be a number.") });
		}
		if value < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}
	for (label, value) in [
		("search.escalation.ac_empty_threshold", search.escalation.ac_empty_threshold),
		("search.escalation.ac_weak_threshold", search.escalation.ac_weak_threshold),
		("search.bonuses.dob_match", search.bonuses.dob_match),
		("search.bonuses.id_match", search.bonuses.id_match),
		("search.bonuses.multi_tier", search.bonuses.multi_tier),
	] {
		if !value.is_finite() || value < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}

	if !(0.0..=1.0).contains(&search.bonuses.context_penalty) {
		return Err(Error::Validation {
			message: "search.bonuses.context_penalty must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for slot in [&mut cfg.storage.username, &mut cfg.storage.password, &mut cfg.storage.api_key] {
		if slot.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
			*slot = None;
		}
	}

	if cfg.storage.ca_cert_path.as_ref().map(|path| path.as_os_str().is_empty()).unwrap_or(false) {
		cfg.storage.ca_cert_path = None;
	}

	cfg.storage.hosts = cfg
		.storage
		.hosts
		.iter()
		.map(|host| host.trim().to_string())
		.filter(|host| !host.is_empty())
		.collect();
	cfg.storage.similarity = cfg.storage.similarity.trim().to_ascii_lowercase();
}
