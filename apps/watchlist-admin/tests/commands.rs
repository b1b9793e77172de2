use std::{sync::Arc, time::Duration};

use clap::Parser;

use watchlist_admin::{Args, Command, commands};
use watchlist_config::Config;
use watchlist_service::{SearchMode, SearchService};
use watchlist_storage::{AcDocument, ClusterStatus, VectorDocument};
use watchlist_testkit::{FAKE_HOST, Fault, fake_store};

fn test_config() -> Config {
	let mut cfg = Config::default();

	cfg.storage.vector_dim = 4;
	cfg.resilience.max_retries = 0;
	cfg.resilience.base_backoff_ms = 1;
	cfg.resilience.max_backoff_ms = 2;

	cfg
}

fn search_args(raw: &[&str]) -> watchlist_admin::SearchArgs {
	let args = Args::try_parse_from(raw).expect("Failed to parse arguments.");

	match args.command {
		Command::Search(search) => search,
		other => panic!("Expected a search command, got {other:?}."),
	}
}

#[test]
fn parses_search_flags() {
	let args = search_args(&[
		"watchlist-admin",
		"search",
		"иван петров",
		"--mode",
		"fallback-ac",
		"--top-k",
		"5",
		"--vector",
		"0.5,-0.25,0,1",
		"--trace",
	]);

	assert_eq!(args.mode, SearchMode::FallbackAc);
	assert_eq!(args.top_k, Some(5));
	assert_eq!(args.vector, vec![0.5, -0.25, 0.0, 1.0]);
	assert!(args.trace && !args.no_escalation);
	assert!(Args::try_parse_from(["watchlist-admin", "search", "x", "--mode", "fuzzy"]).is_err());
}

#[tokio::test]
async fn init_is_idempotent() {
	let cfg = test_config();
	let (cluster, store) = fake_store(&cfg, &[]);
	let first = commands::init(&store).await.expect("Failed to create indices.");
	let second = commands::init(&store).await.expect("Failed to re-create indices.");

	assert_eq!(first["indices"].as_array().map(Vec::len), Some(3));
	assert!(first["indices"].as_array().into_iter().flatten().all(|entry| entry["created"] == true));
	assert!(
		second["indices"].as_array().into_iter().flatten().all(|entry| entry["created"] == false)
	);
	assert!(cluster.has_index(&cfg.storage.patterns_index));
}

#[tokio::test]
async fn health_reports_cluster_and_indices() {
	let cfg = test_config();
	let (cluster, store) = fake_store(&cfg, &[]);

	commands::init(&store).await.expect("Failed to create indices.");

	let (status, output) = commands::health(&store).await;

	assert_eq!(status, ClusterStatus::Healthy);
	assert_eq!(output["indices"].as_array().map(Vec::len), Some(3));
	assert_eq!(output["indices"][0]["exists"], true);

	cluster.fail_host(FAKE_HOST, Fault::Unreachable);
	store.invalidate_health().await;

	let (status, output) = commands::health(&store).await;

	assert_eq!(status, ClusterStatus::Unreachable);
	assert!(output["indices"]["error"].is_string());
}

#[tokio::test]
async fn health_surfaces_slow_search_alerts() {
	let mut cfg = test_config();

	cfg.monitoring.min_samples = 3;

	let (_cluster, store) = fake_store(&cfg, &[]);

	commands::init(&store).await.expect("Failed to create indices.");

	let (_, quiet) = commands::health(&store).await;

	assert_eq!(quiet["alerts"].as_array().map(Vec::len), Some(0));

	for _ in 0..5 {
		store.monitor().record("search_hybrid", Duration::from_millis(450), true);
	}

	let (_, output) = commands::health(&store).await;
	let alerts = output["alerts"].as_array().expect("Expected an alerts array.");

	assert_eq!(alerts.len(), 1);
	assert_eq!(alerts[0]["operation"], "search_hybrid");
	assert_eq!(alerts[0]["kind"], "p95_latency");
	assert_eq!(alerts[0]["level"], "warning");
}

#[tokio::test]
async fn search_prints_result_info_and_trace() {
	let cfg = test_config();
	let (cluster, store) = fake_store(&cfg, &[]);

	commands::init(&store).await.expect("Failed to create indices.");

	let doc = AcDocument::new("person_001", "person", "Иван Петров");
	let vector = VectorDocument::new("person_001", "person", "Иван Петров", vec![1.0, 0.0, 0.0, 0.0]);

	cluster.put_document(
		&cfg.storage.ac_index,
		"person_001",
		serde_json::to_value(&doc).expect("Failed to serialize document."),
	);
	cluster.put_document(
		&cfg.storage.vector_index,
		"person_001",
		vector.to_source(&cfg.storage.vector_field),
	);

	let service = SearchService::new(cfg, Arc::clone(&store));
	let args = search_args(&[
		"watchlist-admin",
		"search",
		"Иван Петров",
		"--vector",
		"1,0,0,0",
		"--trace",
	]);
	let output = commands::search(&service, args).await;

	assert_eq!(output["result"]["success"], true);
	assert_eq!(output["result"]["candidates"][0]["entity"]["entity_id"], "person_001");
	assert_eq!(output["info"]["has_exact_matches"], true);
	assert_eq!(output["trace_report"]["is_valid"], true);
	assert_eq!(output["trace_hash"].as_str().map(str::len), Some(16));
}
