use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use watchlist_config::Config;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("watchlist_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> watchlist_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = watchlist_config::load_with_env(&path, |_| None);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation_error(payload: String, expected: &str) {
	let err = load_payload(payload).expect_err("Expected a validation error.");
	let message = err.to_string();

	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config should load.");

	assert_eq!(cfg.storage.vector_dim, 384);
	assert_eq!(cfg.search.ac_weight, 0.55);
	assert_eq!(cfg.search.vector_weight, 0.45);
	assert_eq!(cfg.search.tiers.exact_score, 2.0);
	assert!(cfg.providers.embedding.is_some());
}

#[test]
fn empty_file_uses_defaults() {
	let cfg = load_payload(String::new()).expect("Empty config should load with defaults.");

	assert!(cfg.storage.hosts.is_empty());
	assert_eq!(cfg.storage.similarity, "cosine");
	assert_eq!(cfg.resilience.failure_threshold, 3);
	assert_eq!(cfg.resilience.cooldown_ms, 30_000);
	assert_eq!(cfg.search.escalation.ac_empty_threshold, 0.5);
	assert!(cfg.providers.embedding.is_none());
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let payload = sample_toml_with("providers.embedding", "dimensions", Value::Integer(768));

	expect_validation_error(payload, "providers.embedding.dimensions must match storage.vector_dim.");
}

#[test]
fn similarity_must_be_known() {
	let payload = sample_toml_with("storage", "similarity", Value::String("hamming".to_string()));

	expect_validation_error(payload, "storage.similarity must be one of");
}

#[test]
fn similarity_is_case_folded() {
	let payload = sample_toml_with("storage", "similarity", Value::String("L2_Norm".to_string()));
	let cfg = load_payload(payload).expect("Similarity should be normalized.");

	assert_eq!(cfg.storage.similarity, "l2_norm");
}

#[test]
fn exact_score_must_stay_dominant() {
	let payload = sample_toml_with("search.tiers", "exact_score", Value::Float(1.5));

	expect_validation_error(payload, "search.tiers.exact_score must be 2.0 or greater.");
}

#[test]
fn overlapping_bands_are_rejected() {
	let payload = sample_toml_with("search.tiers", "ngram_ceiling", Value::Float(1.2));

	expect_validation_error(payload, "search.tiers bands must be ordered");
}

#[test]
fn weights_must_be_in_range() {
	let payload = sample_toml_with("search", "ac_weight", Value::Float(1.5));

	expect_validation_error(payload, "search.ac_weight must be in the range 0.0-1.0.");
}

#[test]
fn infinite_tier_threshold_is_accepted() {
	let payload = sample_toml_with("search.thresholds", "exact", Value::Float(f64::INFINITY));
	let cfg = load_payload(payload).expect("Infinite thresholds disable a tier.");

	assert!(cfg.search.thresholds.exact.is_infinite());
}

#[test]
fn nan_threshold_is_rejected() {
	let payload = sample_toml_with("search.thresholds", "phrase", Value::Float(f64::NAN));

	expect_validation_error(payload, "search.thresholds.phrase must be a number.");
}

#[test]
fn breaker_threshold_must_be_positive() {
	let payload = sample_toml_with("resilience", "failure_threshold", Value::Integer(0));

	expect_validation_error(payload, "resilience.failure_threshold must be greater than zero.");
}

#[test]
fn hosts_with_whitespace_are_rejected() {
	let payload = sample_toml_with(
		"storage",
		"hosts",
		Value::Array(vec![Value::String("http://es 1:9200".to_string())]),
	);

	expect_validation_error(payload, "storage.hosts contains an invalid host");
}

#[test]
fn blank_credentials_are_normalized_to_none() {
	let payload = sample_toml_with("storage", "password", Value::String("  ".to_string()));
	let cfg = load_payload(payload).expect("Blank password should be dropped.");

	assert!(cfg.storage.password.is_none());
}

#[test]
fn env_overrides_apply_before_validation() {
	let path = write_temp_config(SAMPLE_CONFIG_TEMPLATE_TOML.to_string());
	let result = watchlist_config::load_with_env(&path, |name| match name {
		"WATCHLIST_AC_WEIGHT" => Some("0.7".to_string()),
		"WATCHLIST_VECTOR_WEIGHT" => Some("0.3".to_string()),
		_ => None,
	});

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Overrides should produce a valid config.");

	assert_eq!(cfg.search.ac_weight, 0.7);
	assert_eq!(cfg.search.vector_weight, 0.3);
}

#[test]
fn env_override_that_breaks_validation_fails_load() {
	let path = write_temp_config(SAMPLE_CONFIG_TEMPLATE_TOML.to_string());
	let result = watchlist_config::load_with_env(&path, |name| {
		(name == "WATCHLIST_VECTOR_DIM").then(|| "512".to_string())
	});

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected dimension mismatch.");

	assert!(err.to_string().contains("providers.embedding.dimensions must match"));
}
