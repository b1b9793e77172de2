//! Evaluation of the query DSL subset the search adapters emit.
//!
//! Supported clauses: `match_all`, `bool` (`must`, `filter`, `should`, `must_not`,
//! `minimum_should_match`), `term`, `match`, `match_phrase`, and top-level `knn`. Leaf clauses
//! report their `_name` through `matched_queries` like the real store does.

use std::collections::BTreeMap;

use serde_json::{Value, json};

const SUB_FIELDS: [&str; 3] = ["keyword", "edge_ngram", "edge"];

struct Hit<'a> {
	id: &'a str,
	score: f64,
	matched: Vec<String>,
	source: &'a Value,
}

struct Leaf<'a> {
	field: &'a str,
	value: &'a Value,
	name: Option<&'a str>,
	operator_and: bool,
}

/// Runs a search body over the documents of one index. Errors carry a parse reason.
pub(crate) fn search(
	mapping: &Value,
	docs: &BTreeMap<String, Value>,
	body: &Value,
) -> Result<Value, String> {
	let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
	let mut hits = match body.get("knn") {
		Some(knn) => knn_hits(mapping, docs, knn)?,
		None => {
			let query = body.get("query").cloned().unwrap_or_else(|| json!({ "match_all": {} }));
			let mut out = Vec::new();

			for (id, source) in docs {
				let mut matched = Vec::new();

				if let Some(score) = evaluate(&query, source, &mut matched)? {
					out.push(Hit { id, score, matched, source });
				}
			}

			out
		},
	};

	hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(b.id)));

	let total = hits.len();
	let max_score = hits.first().map(|hit| hit.score);

	hits.truncate(size);

	let hits: Vec<Value> = hits
		.into_iter()
		.map(|hit| {
			let mut out = json!({ "_id": hit.id, "_score": hit.score, "_source": hit.source });

			if !hit.matched.is_empty() {
				out["matched_queries"] = json!(hit.matched);
			}

			out
		})
		.collect();

	Ok(json!({
		"took": 1,
		"timed_out": false,
		"hits": {
			"total": { "value": total, "relation": "eq" },
			"max_score": max_score,
			"hits": hits,
		},
	}))
}

fn evaluate(
	query: &Value,
	source: &Value,
	matched: &mut Vec<String>,
) -> Result<Option<f64>, String> {
	let (kind, spec) = single_entry(query)?;

	match kind {
		"match_all" => Ok(Some(1.0)),
		"bool" => evaluate_bool(spec, source, matched),
		"term" => {
			let leaf = parse_leaf(spec, "value")?;
			let hit =
				field_values(source, leaf.field).into_iter().any(|value| value == leaf.value);

			Ok(record(hit.then_some(1.0), leaf.name, matched))
		},
		"match_phrase" => {
			let leaf = parse_leaf(spec, "query")?;
			let query = analyze(leaf.value.as_str().unwrap_or_default());
			let score = text_values(source, leaf.field)
				.into_iter()
				.filter_map(|text| phrase_score(&query, &analyze(text)))
				.reduce(f64::max);

			Ok(record(score, leaf.name, matched))
		},
		"match" => {
			let leaf = parse_leaf(spec, "query")?;
			let query = analyze(leaf.value.as_str().unwrap_or_default());
			let prefix = leaf.field.ends_with(".edge_ngram") || leaf.field.ends_with(".edge");
			let score = text_values(source, leaf.field)
				.into_iter()
				.filter_map(|text| {
					token_score(&query, &analyze(text), prefix, leaf.operator_and)
				})
				.reduce(f64::max);

			Ok(record(score, leaf.name, matched))
		},
		other => Err(format!("Unknown query [{other}].")),
	}
}

fn evaluate_bool(
	spec: &Value,
	source: &Value,
	matched: &mut Vec<String>,
) -> Result<Option<f64>, String> {
	let must = clauses(spec, "must");
	let filter = clauses(spec, "filter");
	let should = clauses(spec, "should");
	let mut local = Vec::new();
	let mut score = 0.0;

	for clause in &must {
		match evaluate(clause, source, &mut local)? {
			Some(value) => score += value,
			None => return Ok(None),
		}
	}
	for clause in &filter {
		if evaluate(clause, source, &mut local)?.is_none() {
			return Ok(None);
		}
	}
	for clause in clauses(spec, "must_not") {
		if evaluate(clause, source, &mut Vec::new())?.is_some() {
			return Ok(None);
		}
	}

	let default_min =
		if should.is_empty() || !must.is_empty() || !filter.is_empty() { 0 } else { 1 };
	let min_should = spec
		.get("minimum_should_match")
		.and_then(Value::as_u64)
		.map(|value| value as usize)
		.unwrap_or(default_min);
	let mut should_hits = 0;

	for clause in &should {
		if let Some(value) = evaluate(clause, source, &mut local)? {
			should_hits += 1;
			score += value;
		}
	}

	if should_hits < min_should {
		return Ok(None);
	}

	matched.extend(local);

	Ok(Some(score))
}

fn knn_hits<'a>(
	mapping: &Value,
	docs: &'a BTreeMap<String, Value>,
	knn: &Value,
) -> Result<Vec<Hit<'a>>, String> {
	let field = knn.get("field").and_then(Value::as_str).ok_or("knn requires [field].")?;
	let query: Vec<f64> = knn
		.get("query_vector")
		.and_then(Value::as_array)
		.ok_or("knn requires [query_vector].")?
		.iter()
		.map(|value| value.as_f64().ok_or("query_vector must hold numbers."))
		.collect::<Result<_, _>>()?;
	let k = knn.get("k").and_then(Value::as_u64).ok_or("knn requires [k].")? as usize;
	let num_candidates = knn.get("num_candidates").and_then(Value::as_u64).unwrap_or(k as u64);

	if (num_candidates as usize) < k {
		return Err("[num_candidates] cannot be less than [k].".to_string());
	}

	let field_mapping = mapping.pointer(&format!("/mappings/properties/{field}"));
	let similarity = field_mapping
		.and_then(|spec| spec.get("similarity"))
		.and_then(Value::as_str)
		.unwrap_or("cosine");

	if let Some(dims) = field_mapping.and_then(|spec| spec.get("dims")).and_then(Value::as_u64)
		&& dims as usize != query.len()
	{
		return Err(format!(
			"The query vector has {} dimensions but [{field}] has {dims}.",
			query.len()
		));
	}

	let filters: Vec<&Value> = match knn.get("filter") {
		Some(Value::Array(items)) => items.iter().collect(),
		Some(single) => vec![single],
		None => Vec::new(),
	};
	let mut hits = Vec::new();

	'docs: for (id, source) in docs {
		for filter in &filters {
			if evaluate(filter, source, &mut Vec::new())?.is_none() {
				continue 'docs;
			}
		}

		let Some(stored) = source.get(field).and_then(Value::as_array) else {
			continue;
		};
		let stored: Vec<f64> = stored.iter().filter_map(Value::as_f64).collect();

		if stored.len() != query.len() {
			continue;
		}

		let score = similarity_score(similarity, &query, &stored);

		hits.push(Hit { id, score, matched: Vec::new(), source });
	}

	hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(b.id)));
	hits.truncate(k);

	Ok(hits)
}

fn similarity_score(similarity: &str, a: &[f64], b: &[f64]) -> f64 {
	let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();

	match similarity {
		"dot_product" => (1.0 + dot) / 2.0,
		"l2_norm" => {
			let squared: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();

			1.0 / (1.0 + squared)
		},
		_ => {
			let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
			let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

			if norm_a == 0.0 || norm_b == 0.0 {
				0.5
			} else {
				(1.0 + dot / (norm_a * norm_b)) / 2.0
			}
		},
	}
}

fn single_entry(value: &Value) -> Result<(&str, &Value), String> {
	let object = value.as_object().ok_or("Query clause must be an object.")?;

	if object.len() != 1 {
		return Err("Query clause must have exactly one key.".to_string());
	}

	object
		.iter()
		.next()
		.map(|(key, value)| (key.as_str(), value))
		.ok_or_else(|| "Query clause must have exactly one key.".to_string())
}

fn parse_leaf<'a>(spec: &'a Value, value_key: &str) -> Result<Leaf<'a>, String> {
	let (field, params) = single_entry(spec)?;

	match params {
		Value::Object(object) => Ok(Leaf {
			field,
			value: object
				.get(value_key)
				.ok_or_else(|| format!("[{field}] requires [{value_key}]."))?,
			name: object.get("_name").and_then(Value::as_str),
			operator_and: object
				.get("operator")
				.and_then(Value::as_str)
				.is_some_and(|operator| operator.eq_ignore_ascii_case("and")),
		}),
		value => Ok(Leaf { field, value, name: None, operator_and: false }),
	}
}

fn clauses<'a>(spec: &'a Value, key: &str) -> Vec<&'a Value> {
	match spec.get(key) {
		Some(Value::Array(items)) => items.iter().collect(),
		Some(single) => vec![single],
		None => Vec::new(),
	}
}

fn record(score: Option<f64>, name: Option<&str>, matched: &mut Vec<String>) -> Option<f64> {
	if score.is_some()
		&& let Some(name) = name
		&& !matched.iter().any(|existing| existing == name)
	{
		matched.push(name.to_string());
	}

	score
}

/// Values stored under a dotted path, with analyzer sub-field suffixes resolved to their parent.
fn field_values<'a>(source: &'a Value, field: &str) -> Vec<&'a Value> {
	let path = match field.rsplit_once('.') {
		Some((parent, sub)) if SUB_FIELDS.contains(&sub) => parent,
		_ => field,
	};
	let mut current = vec![source];

	for segment in path.split('.') {
		current = current.into_iter().filter_map(|value| value.get(segment)).collect();
	}

	current
		.into_iter()
		.flat_map(|value| match value {
			Value::Array(items) => items.iter().collect::<Vec<_>>(),
			other => vec![other],
		})
		.collect()
}

fn text_values<'a>(source: &'a Value, field: &str) -> Vec<&'a str> {
	field_values(source, field).into_iter().filter_map(Value::as_str).collect()
}

fn analyze(text: &str) -> Vec<String> {
	text.split(|ch: char| !ch.is_alphanumeric() && ch != '-')
		.filter(|token| !token.is_empty())
		.map(str::to_lowercase)
		.collect()
}

/// Contiguous token match; shorter stored values score higher.
fn phrase_score(query: &[String], value: &[String]) -> Option<f64> {
	if query.is_empty() || query.len() > value.len() {
		return None;
	}

	value
		.windows(query.len())
		.any(|window| window == query)
		.then(|| query.len() as f64 / value.len() as f64)
}

fn token_score(query: &[String], value: &[String], prefix: bool, all: bool) -> Option<f64> {
	if query.is_empty() || value.is_empty() {
		return None;
	}

	let mut hits = 0;
	let mut score = 0.0;

	for token in query {
		let best = value
			.iter()
			.filter(|stored| {
				if prefix { stored.starts_with(token.as_str()) } else { *stored == token }
			})
			.map(|stored| token.chars().count() as f64 / stored.chars().count() as f64)
			.reduce(f64::max);

		if let Some(best) = best {
			hits += 1;
			score += best;
		}
	}

	if hits == 0 || (all && hits < query.len()) {
		return None;
	}

	Some(score / value.len().max(query.len()) as f64)
}
