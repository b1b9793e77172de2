use std::str::FromStr;

use crate::{Config, Error, Result};

/// Applies `WATCHLIST_*` overrides read through `lookup`.
///
/// Host lists are resolved by the storage layer, which owns the host precedence rules. Blank
/// values are ignored. A value that does not parse fails the whole load so a typo never
/// falls back silently to a default.
pub fn apply_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	let read = |name: &str| lookup(name).map(|raw| raw.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(value) = read("WATCHLIST_ES_USERNAME") {
		cfg.storage.username = Some(value);
	}
	if let Some(value) = read("WATCHLIST_ES_PASSWORD") {
		cfg.storage.password = Some(value);
	}
	if let Some(value) = read("WATCHLIST_ES_API_KEY") {
		cfg.storage.api_key = Some(value);
	}
	if let Some(value) = read("WATCHLIST_ES_USE_TLS") {
		cfg.storage.use_tls = parse_bool("WATCHLIST_ES_USE_TLS", &value)?;
	}
	if let Some(value) = read("WATCHLIST_ES_TLS_VERIFY") {
		cfg.storage.tls_verify = parse_bool("WATCHLIST_ES_TLS_VERIFY", &value)?;
	}
	if let Some(value) = read("WATCHLIST_VECTOR_DIM") {
		cfg.storage.vector_dim = parse("WATCHLIST_VECTOR_DIM", &value)?;
	}
	if let Some(value) = read("WATCHLIST_SIMILARITY") {
		cfg.storage.similarity = value;
	}
	if let Some(value) = read("WATCHLIST_AC_WEIGHT") {
		cfg.search.ac_weight = parse("WATCHLIST_AC_WEIGHT", &value)?;
	}
	if let Some(value) = read("WATCHLIST_VECTOR_WEIGHT") {
		cfg.search.vector_weight = parse("WATCHLIST_VECTOR_WEIGHT", &value)?;
	}
	if let Some(value) = read("WATCHLIST_DEFAULT_TOP_K") {
		cfg.search.default_top_k = parse("WATCHLIST_DEFAULT_TOP_K", &value)?;
	}
	if let Some(value) = read("WATCHLIST_THRESHOLD_EXACT") {
		cfg.search.thresholds.exact = parse("WATCHLIST_THRESHOLD_EXACT", &value)?;
	}
	if let Some(value) = read("WATCHLIST_THRESHOLD_PHRASE") {
		cfg.search.thresholds.phrase = parse("WATCHLIST_THRESHOLD_PHRASE", &value)?;
	}
	if let Some(value) = read("WATCHLIST_THRESHOLD_NGRAM") {
		cfg.search.thresholds.ngram = parse("WATCHLIST_THRESHOLD_NGRAM", &value)?;
	}
	if let Some(value) = read("WATCHLIST_THRESHOLD_WEAK") {
		cfg.search.thresholds.weak = parse("WATCHLIST_THRESHOLD_WEAK", &value)?;
	}
	if let Some(value) = read("WATCHLIST_THRESHOLD_VECTOR") {
		cfg.search.thresholds.vector = parse("WATCHLIST_THRESHOLD_VECTOR", &value)?;
	}
	if let Some(value) = read("WATCHLIST_AC_EMPTY_THRESHOLD") {
		cfg.search.escalation.ac_empty_threshold = parse("WATCHLIST_AC_EMPTY_THRESHOLD", &value)?;
	}
	if let Some(value) = read("WATCHLIST_AC_WEAK_THRESHOLD") {
		cfg.search.escalation.ac_weak_threshold = parse("WATCHLIST_AC_WEAK_THRESHOLD", &value)?;
	}
	if let Some(value) = read("WATCHLIST_MAX_RETRIES") {
		cfg.resilience.max_retries = parse("WATCHLIST_MAX_RETRIES", &value)?;
	}
	if let Some(value) = read("WATCHLIST_BREAKER_THRESHOLD") {
		cfg.resilience.failure_threshold = parse("WATCHLIST_BREAKER_THRESHOLD", &value)?;
	}
	if let Some(value) = read("WATCHLIST_BREAKER_COOLDOWN_MS") {
		cfg.resilience.cooldown_ms = parse("WATCHLIST_BREAKER_COOLDOWN_MS", &value)?;
	}
	if let Some(value) = read("WATCHLIST_HEALTH_TTL_MS") {
		cfg.resilience.health_ttl_ms = parse("WATCHLIST_HEALTH_TTL_MS", &value)?;
	}
	if let Some(value) = read("WATCHLIST_LOG_LEVEL") {
		cfg.service.log_level = value;
	}

	Ok(())
}

pub fn split_list(raw: &str) -> Vec<String> {
	raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn parse<T>(name: &str, raw: &str) -> Result<T>
where
	T: FromStr,
{
	raw.parse::<T>().map_err(|_| Error::Env {
		name: name.to_string(),
		message: format!("{name} has an invalid value {raw:?}."),
	})
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
	match raw.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(Error::Env {
			name: name.to_string(),
			message: format!("{name} must be a boolean, got {raw:?}."),
		}),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> =
			pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

		move |name: &str| map.get(name).cloned()
	}

	#[test]
	fn lists_are_split_and_trimmed() {
		assert_eq!(split_list(" es1:9200, ,https://es2:9200 "), vec!["es1:9200", "https://es2:9200"]);
	}

	#[test]
	fn credentials_are_overridden() {
		let mut cfg = Config::default();

		apply_overrides(
			&mut cfg,
			lookup(&[("WATCHLIST_ES_USERNAME", "elastic"), ("WATCHLIST_ES_PASSWORD", "secret")]),
		)
		.expect("Overrides should apply.");

		assert_eq!(cfg.storage.username.as_deref(), Some("elastic"));
		assert_eq!(cfg.storage.password.as_deref(), Some("secret"));
	}

	#[test]
	fn blank_values_are_ignored() {
		let mut cfg = Config::default();

		apply_overrides(&mut cfg, lookup(&[("WATCHLIST_AC_WEIGHT", "  ")]))
			.expect("Overrides should apply.");

		assert_eq!(cfg.search.ac_weight, 0.55);
	}

	#[test]
	fn unparseable_value_fails_fast() {
		let mut cfg = Config::default();
		let err = apply_overrides(&mut cfg, lookup(&[("WATCHLIST_VECTOR_DIM", "wide")]))
			.expect_err("Expected an env parse error.");

		assert!(err.to_string().contains("WATCHLIST_VECTOR_DIM"), "Unexpected error: {err}");
	}

	#[test]
	fn tls_flag_accepts_common_spellings() {
		let mut cfg = Config::default();

		apply_overrides(&mut cfg, lookup(&[("WATCHLIST_ES_USE_TLS", "On")]))
			.expect("Overrides should apply.");

		assert!(cfg.storage.use_tls);
	}
}
