use std::{collections::BTreeSet, time::Instant};

use serde_json::{Map, Value, json};

use watchlist_config::{Search, SearchTiers};
use watchlist_domain::{Language, tokens};
use watchlist_storage::{DocumentStore, PatternDocument};

use crate::{AcScore, AcType, EntityRecord, Error, Result, SearchOpts};

const NAME_FIELDS: [&str; 3] = ["normalized_text", "aliases", "legal_names"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tier {
	Exact,
	Phrase,
	Ngram,
}

/// Tiered AC matching against the AC index, plus the optional pattern index.
pub struct AcAdapter<'a> {
	store: &'a DocumentStore,
	cfg: &'a Search,
	language: Option<Language>,
	query_tokens: Option<Vec<String>>,
}
impl<'a> AcAdapter<'a> {
	pub fn new(store: &'a DocumentStore, cfg: &'a Search) -> Self {
		Self { store, cfg, language: None, query_tokens: None }
	}

	pub fn with_language(mut self, language: Option<Language>) -> Self {
		self.language = language;

		self
	}

	/// Tokens from the normalization layer, used for coverage instead of re-tokenizing.
	pub fn with_query_tokens(mut self, query_tokens: Option<Vec<String>>) -> Self {
		self.query_tokens = query_tokens
			.map(|raw| raw.iter().flat_map(|token| tokens::tokenize(token)).collect())
			.filter(|folded: &Vec<String>| !folded.is_empty());

		self
	}

	/// True when no AC tier can produce a score that passes its threshold.
	pub fn is_disabled(cfg: &Search) -> bool {
		[Tier::Exact, Tier::Phrase, Tier::Ngram].into_iter().all(|tier| !tier_enabled(cfg, tier))
	}

	/// Runs every enabled tier for each distinct folded candidate string.
	///
	/// Rejected queries and empty tiers yield no hits. Only connectivity failures are errors.
	pub async fn search(
		&self,
		candidates: &[String],
		entity_type: Option<&str>,
		opts: &SearchOpts,
	) -> Result<Vec<AcScore>> {
		let started = Instant::now();
		let result = self.search_inner(candidates, entity_type, opts).await;

		self.store.monitor().record("ac_search", started.elapsed(), result.is_ok());

		result
	}

	async fn search_inner(
		&self,
		candidates: &[String],
		entity_type: Option<&str>,
		opts: &SearchOpts,
	) -> Result<Vec<AcScore>> {
		let mut seen = BTreeSet::new();
		let mut out = Vec::new();

		for raw in candidates {
			let candidate = watchlist_domain::fold(raw);

			if candidate.is_empty() || !seen.insert(candidate.clone()) {
				continue;
			}

			for tier in [Tier::Exact, Tier::Phrase, Tier::Ngram] {
				if !tier_enabled(self.cfg, tier) {
					continue;
				}

				out.extend(self.run_tier(tier, &candidate, entity_type, opts).await?);
			}

			if self.cfg.ac_patterns_enabled {
				out.extend(self.run_patterns(&candidate, entity_type, opts).await?);
			}
		}

		Ok(out)
	}

	async fn run_tier(
		&self,
		tier: Tier,
		candidate: &str,
		entity_type: Option<&str>,
		opts: &SearchOpts,
	) -> Result<Vec<AcScore>> {
		let should: Vec<Value> = NAME_FIELDS
			.iter()
			.map(|field| match tier {
				Tier::Exact => json!({
					"term": { format!("{field}.keyword"): { "value": candidate, "_name": field } }
				}),
				Tier::Phrase => json!({
					"match_phrase": { *field: { "query": candidate, "_name": field } }
				}),
				Tier::Ngram => json!({
					"match": {
						format!("{field}.edge_ngram"): {
							"query": candidate,
							"operator": "and",
							"_name": field,
						}
					}
				}),
			})
			.collect();
		let body = json!({
			"size": opts.top_k,
			"query": {
				"bool": {
					"should": should,
					"minimum_should_match": 1,
					"filter": build_filters(entity_type, opts),
				}
			}
		});
		let Some(hits) = self.run_query(self.index_name(), body, tier_label(tier)).await? else {
			return Ok(Vec::new());
		};
		let query_tokens = self.coverage_tokens(candidate);
		let max_raw = hits
			.iter()
			.filter_map(|hit| hit.get("_score").and_then(Value::as_f64))
			.fold(0.0_f64, f64::max);
		let mut out = Vec::with_capacity(hits.len());

		for hit in &hits {
			let Some(source) = hit.get("_source") else {
				continue;
			};
			let entity = entity_from_source(source);

			if entity.entity_id.is_empty() {
				continue;
			}

			let matched_field = hit
				.get("matched_queries")
				.and_then(Value::as_array)
				.and_then(|names| names.first())
				.and_then(Value::as_str)
				.unwrap_or(NAME_FIELDS[0])
				.to_string();
			let (matched_text, coverage) = best_covering_name(source, &query_tokens);
			let raw = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
			let relative = if max_raw > 0.0 { (raw / max_raw) as f32 } else { 1.0 };
			let position = (0.5 * relative + 0.5 * coverage).clamp(0.0, 1.0);
			let tiers = &self.cfg.tiers;
			let (ac_score, ac_type) = match tier {
				Tier::Exact => (tiers.exact_score, AcType::Exact),
				Tier::Phrase =>
					(band(tiers.phrase_floor, tiers.phrase_ceiling, position), AcType::Phrase),
				Tier::Ngram =>
					ngram_typed(tiers, band(tiers.ngram_floor, tiers.ngram_ceiling, position)),
			};
			let matched_text = match tier {
				Tier::Exact => Some(candidate.to_string()),
				_ => matched_text,
			};

			out.push(AcScore { entity, ac_score, ac_type, matched_field, matched_text });
		}

		Ok(out)
	}

	async fn run_patterns(
		&self,
		candidate: &str,
		entity_type: Option<&str>,
		opts: &SearchOpts,
	) -> Result<Vec<AcScore>> {
		// Pattern documents carry no entity metadata to check these filters against.
		if opts.has_post_filters() {
			return Ok(Vec::new());
		}

		let body = json!({
			"size": opts.top_k,
			"query": {
				"bool": {
					"should": [
						{ "term": { "pattern": { "value": candidate } } },
						{ "match": { "pattern.edge": { "query": candidate } } },
					],
				},
			},
		});
		let index = self.store.storage_config().patterns_index.clone();
		let Some(hits) = self.run_query(&index, body, "pattern").await? else {
			return Ok(Vec::new());
		};
		let tiers = &self.cfg.tiers;
		let mut out = Vec::new();

		for hit in hits {
			let Some(doc) = hit
				.get("_source")
				.cloned()
				.and_then(|source| serde_json::from_value::<PatternDocument>(source).ok())
			else {
				continue;
			};
			let meta = &doc.meta;
			let Some(entity_id) = meta.entity_id.clone() else {
				continue;
			};

			if candidate.chars().count() < meta.min_match_length {
				continue;
			}
			if let (Some(expected), Some(language)) = (meta.language.as_deref(), self.language)
				&& !expected.eq_ignore_ascii_case(language.as_str())
			{
				continue;
			}
			if let (Some(wanted), Some(stored)) = (entity_type, meta.entity_type.as_deref())
				&& wanted != stored
			{
				continue;
			}

			let confidence = meta.confidence.clamp(0.0, 1.0);
			let boost = meta.boost_score.max(0.0);
			let boosted = |floor: f32, ceiling: f32| {
				(band(floor, ceiling, confidence) * boost).clamp(floor, ceiling)
			};
			let (ac_score, ac_type) = match pattern_tier(doc.tier, &doc.pattern, candidate) {
				0 => (tiers.exact_score, AcType::Exact),
				1 => (boosted(tiers.phrase_floor, tiers.phrase_ceiling), AcType::Phrase),
				2 => ngram_typed(tiers, boosted(tiers.ngram_floor, tiers.ngram_ceiling)),
				_ => (tiers.ngram_floor, AcType::Weak),
			};
			let mut entity_meta = Map::new();

			entity_meta.insert("context_required".to_string(), Value::Bool(meta.context_required));
			entity_meta.insert("pattern_confidence".to_string(), json!(meta.confidence));

			if let Some(kind) = meta.pattern_type.as_ref() {
				entity_meta.insert("pattern_type".to_string(), Value::String(kind.clone()));
			}

			let entity = EntityRecord {
				entity_id,
				entity_type: meta.entity_type.clone().unwrap_or_default(),
				normalized_name: meta.canonical.clone().unwrap_or_else(|| doc.pattern.clone()),
				meta: entity_meta,
				..Default::default()
			};

			out.push(AcScore {
				entity,
				ac_score,
				ac_type,
				matched_field: "pattern".to_string(),
				matched_text: Some(doc.pattern.clone()),
			});
		}

		Ok(out)
	}

	/// Hits of one query. `None` means the query was rejected and the tier counts as empty.
	async fn run_query(&self, index: &str, body: Value, label: &str) -> Result<Option<Vec<Value>>> {
		match self.store.search(index, body).await {
			Ok(response) => Ok(Some(
				response
					.pointer("/hits/hits")
					.and_then(Value::as_array)
					.cloned()
					.unwrap_or_default(),
			)),
			Err(err) if err.is_connectivity() => Err(Error::from(err)),
			Err(err) => {
				tracing::warn!(index, tier = label, error = %err, "AC query rejected.");

				Ok(None)
			},
		}
	}

	fn index_name(&self) -> &str {
		&self.store.storage_config().ac_index
	}

	fn coverage_tokens(&self, candidate: &str) -> Vec<String> {
		match self.query_tokens.as_ref() {
			Some(tokens) => tokens.clone(),
			None => tokens::tokenize(candidate),
		}
	}
}

/// Entity filters shared by the AC tiers.
pub(crate) fn build_filters(entity_type: Option<&str>, opts: &SearchOpts) -> Vec<Value> {
	let mut filters = Vec::new();

	if let Some(entity_type) = entity_type {
		filters.push(json!({ "term": { "entity_type": entity_type } }));
	}
	if let Some(country) = opts.country_filter.as_deref() {
		filters.push(json!({
			"bool": {
				"should": [
					{ "term": { "metadata.country": country } },
					{ "term": { "metadata.country_code": country } },
				],
				"minimum_should_match": 1,
			}
		}));
	}

	for (key, value) in &opts.meta_filters {
		filters.push(json!({ "term": { format!("metadata.{key}"): value } }));
	}

	filters
}

/// Entity record from an AC or vector index source document.
pub(crate) fn entity_from_source(source: &Value) -> EntityRecord {
	let text = |key: &str| source.get(key).and_then(Value::as_str).map(str::to_string);
	let list = |key: &str| -> Vec<String> {
		source
			.get(key)
			.and_then(Value::as_array)
			.map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
			.unwrap_or_default()
	};
	let meta = source.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default();
	let meta_text = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);

	EntityRecord {
		entity_id: text("entity_id").unwrap_or_default(),
		entity_type: text("entity_type").unwrap_or_default(),
		normalized_name: text("normalized_text").unwrap_or_default(),
		aliases: list("aliases"),
		country: meta_text("country").or_else(|| meta_text("country_code")),
		dob: meta_text("dob"),
		meta,
	}
}

/// Tier a pattern hit scores in. A hit on a prefix of the pattern never ranks above the n-gram
/// band.
fn pattern_tier(stored: u8, pattern: &str, candidate: &str) -> u8 {
	if watchlist_domain::fold(pattern) == candidate { stored } else { stored.max(2) }
}

fn tier_enabled(cfg: &Search, tier: Tier) -> bool {
	let tiers = &cfg.tiers;
	let thresholds = &cfg.thresholds;

	match tier {
		Tier::Exact => thresholds.exact <= tiers.exact_score,
		Tier::Phrase => thresholds.phrase <= tiers.phrase_ceiling,
		Tier::Ngram =>
			thresholds.ngram <= tiers.ngram_ceiling
				|| thresholds.weak <= tiers.weak_cutoff.min(tiers.ngram_ceiling),
	}
}

fn tier_label(tier: Tier) -> &'static str {
	match tier {
		Tier::Exact => "exact",
		Tier::Phrase => "phrase",
		Tier::Ngram => "ngram",
	}
}

fn band(floor: f32, ceiling: f32, position: f32) -> f32 {
	floor + (ceiling - floor) * position.clamp(0.0, 1.0)
}

fn ngram_typed(tiers: &SearchTiers, score: f32) -> (f32, AcType) {
	if score < tiers.weak_cutoff { (score, AcType::Weak) } else { (score, AcType::Ngram) }
}

/// The stored name that best covers the query, with its coverage.
fn best_covering_name(source: &Value, query_tokens: &[String]) -> (Option<String>, f32) {
	let mut best: Option<(String, f32)> = None;

	for field in NAME_FIELDS {
		let values: Vec<&str> = match source.get(field) {
			Some(Value::String(text)) => vec![text.as_str()],
			Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
			_ => Vec::new(),
		};

		for value in values {
			let coverage = tokens::coverage(query_tokens, &tokens::tokenize(value));

			if best.as_ref().is_none_or(|(_, current)| coverage > *current) {
				best = Some((value.to_string(), coverage));
			}
		}
	}

	match best {
		Some((name, coverage)) => (Some(name), coverage),
		None => (None, 0.0),
	}
}
