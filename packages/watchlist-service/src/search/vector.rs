use std::time::Instant;

use serde_json::{Value, json};

use watchlist_config::Search;
use watchlist_storage::DocumentStore;

use crate::{EntityRecord, Error, Result, SearchOpts, VectorHit, search::ac};

const POST_FILTER_OVERFETCH: u32 = 4;

/// k-NN similarity search over the vector index.
pub struct VectorAdapter<'a> {
	store: &'a DocumentStore,
	cfg: &'a Search,
}
impl<'a> VectorAdapter<'a> {
	pub fn new(store: &'a DocumentStore, cfg: &'a Search) -> Self {
		Self { store, cfg }
	}

	pub async fn search(
		&self,
		query_vector: &[f32],
		entity_type: Option<&str>,
		opts: &SearchOpts,
	) -> Result<Vec<VectorHit>> {
		let started = Instant::now();
		let result = self.search_inner(query_vector, entity_type, opts).await;

		self.store.monitor().record("vector_search", started.elapsed(), result.is_ok());

		result
	}

	async fn search_inner(
		&self,
		query_vector: &[f32],
		entity_type: Option<&str>,
		opts: &SearchOpts,
	) -> Result<Vec<VectorHit>> {
		let storage = self.store.storage_config();

		if let Err(message) = check_query_vector(query_vector, storage.vector_dim) {
			tracing::warn!(error = %message, "Vector query rejected.");

			return Ok(Vec::new());
		}

		let (k, num_candidates) = knn_sizes(opts, self.cfg.num_candidates);
		let mut knn = json!({
			"field": storage.vector_field,
			"query_vector": query_vector,
			"k": k,
			"num_candidates": num_candidates,
		});

		if let Some(entity_type) = entity_type {
			knn["filter"] = json!({ "term": { "entity_type": entity_type } });
		}

		let body = json!({
			"size": k,
			"knn": knn,
			"_source": { "excludes": [storage.vector_field] },
		});
		let response = match self.store.search(&storage.vector_index, body).await {
			Ok(response) => response,
			Err(err) if err.is_connectivity() => return Err(Error::from(err)),
			Err(err) => {
				tracing::warn!(
					index = %storage.vector_index,
					error = %err,
					"Vector query rejected."
				);

				return Ok(Vec::new());
			},
		};
		let hits =
			response.pointer("/hits/hits").and_then(Value::as_array).cloned().unwrap_or_default();
		let mut out: Vec<VectorHit> = hits
			.iter()
			.filter_map(|hit| {
				let entity = ac::entity_from_source(hit.get("_source")?);
				let vector_score = hit.get("_score").and_then(Value::as_f64)? as f32;

				(!entity.entity_id.is_empty()).then(|| VectorHit {
					entity,
					vector_score,
					matched_field: storage.vector_field.clone(),
				})
			})
			.filter(|hit| hit.vector_score >= opts.threshold)
			.filter(|hit| passes_post_filters(&hit.entity, opts))
			.collect();

		out.sort_by(|a, b| {
			b.vector_score
				.total_cmp(&a.vector_score)
				.then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
		});
		out.truncate(opts.top_k as usize);

		Ok(out)
	}
}

fn check_query_vector(vector: &[f32], dim: u32) -> std::result::Result<(), String> {
	if vector.len() != dim as usize {
		return Err(format!("Query vector has {} dimensions, expected {dim}.", vector.len()));
	}
	if vector.iter().any(|value| !value.is_finite()) {
		return Err("Query vector contains non-finite values.".to_string());
	}

	Ok(())
}

/// `k` and `num_candidates` for the k-NN block. Post-filters need a larger `k`.
fn knn_sizes(opts: &SearchOpts, pool: u32) -> (u32, u32) {
	let k = if opts.has_post_filters() {
		opts.top_k.saturating_mul(POST_FILTER_OVERFETCH).min(pool.max(opts.top_k))
	} else {
		opts.top_k
	};

	(k, pool.max(k))
}

fn passes_post_filters(entity: &EntityRecord, opts: &SearchOpts) -> bool {
	if let Some(country) = opts.country_filter.as_deref() {
		let stored = ["country", "country_code"]
			.iter()
			.filter_map(|key| entity.meta.get(*key).and_then(Value::as_str))
			.any(|value| value == country);

		if !stored {
			return false;
		}
	}

	opts.meta_filters.iter().all(|(key, expected)| entity.meta.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn overfetches_only_with_post_filters() {
		let opts = SearchOpts { top_k: 10, ..SearchOpts::default() };

		assert_eq!(knn_sizes(&opts, 100), (10, 100));

		let filtered = SearchOpts { country_filter: Some("RU".to_string()), ..opts.clone() };

		assert_eq!(knn_sizes(&filtered, 100), (40, 100));
		assert_eq!(knn_sizes(&filtered, 25), (25, 25));
		assert_eq!(knn_sizes(&SearchOpts { top_k: 50, ..filtered }, 20), (50, 50));
	}

	#[test]
	fn rejects_bad_query_vectors() {
		assert!(check_query_vector(&[0.1, 0.2], 3).is_err());
		assert!(check_query_vector(&[0.1, f32::NAN, 0.2], 3).is_err());
		assert!(check_query_vector(&[0.1, 0.2, 0.3], 3).is_ok());
	}

	#[test]
	fn post_filters_compare_stored_metadata() {
		let mut entity = EntityRecord { entity_id: "e1".to_string(), ..Default::default() };

		entity.meta.insert("country_code".to_string(), json!("RU"));
		entity.meta.insert("source".to_string(), json!("ofac"));

		let mut opts = SearchOpts { country_filter: Some("RU".to_string()), ..SearchOpts::default() };

		assert!(passes_post_filters(&entity, &opts));

		opts.meta_filters.insert("source".to_string(), json!("eu"));

		assert!(!passes_post_filters(&entity, &opts));

		opts.country_filter = Some("UA".to_string());
		opts.meta_filters.clear();

		assert!(!passes_post_filters(&entity, &opts));
	}
}
