use serde_json::{Value, json};

use watchlist_service::{
	SearchInfo, SearchOpts, SearchRequest, SearchService, SearchTraceValidator,
};
use watchlist_storage::{ClusterStatus, DocumentStore};

use crate::SearchArgs;

pub async fn init(store: &DocumentStore) -> watchlist_storage::Result<Value> {
	let created = store.create_all_indices().await?;
	let indices: Vec<Value> = created
		.into_iter()
		.map(|(kind, created)| {
			json!({
				"kind": kind,
				"index": kind.index_name(store.storage_config()),
				"created": created,
			})
		})
		.collect();

	tracing::info!(count = indices.len(), "Indices ensured.");

	Ok(json!({ "indices": indices }))
}

/// Cluster health, per-index state, and active monitoring alerts. Index inspection failures are
/// reported inline.
pub async fn health(store: &DocumentStore) -> (ClusterStatus, Value) {
	let cluster = store.cluster_health().await;
	let indices = match store.index_health().await {
		Ok(indices) => json!(indices),
		Err(err) => {
			tracing::warn!(error = %err, "Index health unavailable.");

			json!({ "error": err.to_string() })
		},
	};

	let alerts = store.monitor().alerts();

	for alert in &alerts {
		tracing::warn!(
			operation = %alert.operation,
			kind = ?alert.kind,
			level = ?alert.level,
			value = alert.value,
			"Monitoring alert is active."
		);
	}

	(cluster.status, json!({ "cluster": cluster, "indices": indices, "alerts": alerts }))
}

pub async fn search(service: &SearchService, args: SearchArgs) -> Value {
	let mut opts = SearchOpts {
		entity_type: args.entity_type,
		country_filter: args.country,
		..service.default_opts()
	}
	.with_mode(args.mode);

	if let Some(top_k) = args.top_k {
		opts.top_k = top_k;
	}
	if let Some(threshold) = args.threshold {
		opts.threshold = threshold;
	}
	if args.no_escalation {
		opts.enable_escalation = false;
	}

	let mut req = SearchRequest::new(&args.name, opts);

	if let Some(text) = args.original_text.as_deref() {
		req = req.with_original_text(text);
	}
	if !args.vector.is_empty() {
		req = req.with_query_vector(args.vector);
	}

	let (result, trace) = service.search_traced(req).await;
	let info = SearchInfo::from_result(&result);
	let mut output = json!({ "result": result, "info": info });

	if args.trace {
		let report = SearchTraceValidator::default()
			.validate_for_strategy(&trace, result.search_metadata.mode);

		output["trace"] = json!(trace);
		output["trace_hash"] = json!(trace.deterministic_hash());
		output["trace_report"] = json!(report);
	}

	output
}
