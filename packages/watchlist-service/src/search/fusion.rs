//! Per-entity fusion of AC and vector hits into ranked candidates.

use std::{cmp::Ordering, collections::BTreeMap};

use watchlist_config::Search;
use watchlist_domain::{anchors, tokens};

use crate::{
	AcScore, AcType, Candidate, CandidateFeatures, EntityRecord, SearchOpts, SearchType, VectorHit,
};

const EXACT_CAP_MARGIN: f32 = 1e-3;

pub struct FusionContext<'a> {
	/// Folded query name.
	pub query: &'a str,
	pub original_text: &'a str,
	pub opts: &'a SearchOpts,
	pub cfg: &'a Search,
	/// Whether entities found only by the vector tier become candidates.
	pub admit_vector_only: bool,
}

struct ScoredAc<'a> {
	hit: &'a AcScore,
	score: f32,
	ac_type: AcType,
	penalized: bool,
}

#[derive(Default)]
struct Group<'a> {
	ac: Vec<ScoredAc<'a>>,
	vector: Option<&'a VectorHit>,
}

/// Fuses AC and vector hits. Output is sorted best first and is not truncated.
pub fn fuse(ctx: &FusionContext<'_>, ac: &[AcScore], vector: &[VectorHit]) -> Vec<Candidate> {
	let vector_floor = ctx.opts.threshold.max(ctx.cfg.thresholds.vector);
	let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();

	for hit in ac {
		let scored = apply_context_penalty(ctx.original_text, ctx.cfg, hit);

		if scored.score >= tier_threshold(ctx.cfg, scored.ac_type) {
			groups.entry(hit.entity.entity_id.as_str()).or_default().ac.push(scored);
		}
	}
	for hit in vector {
		if hit.vector_score < vector_floor {
			continue;
		}
		if !ctx.admit_vector_only && !groups.contains_key(hit.entity.entity_id.as_str()) {
			continue;
		}

		let group = groups.entry(hit.entity.entity_id.as_str()).or_default();

		if group.vector.is_none_or(|current| hit.vector_score > current.vector_score) {
			group.vector = Some(hit);
		}
	}

	let dates = anchors::extract_dates(ctx.original_text);
	let ids = anchors::extract_ids(ctx.original_text);
	let mut out: Vec<Candidate> = groups
		.into_values()
		.filter_map(|group| score_group(ctx, group, &dates, &ids))
		.collect();

	out.sort_by(compare_candidates);

	out
}

/// Ranking order: final score, tier specificity, longer matched text, entity id.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
	b.final_score
		.total_cmp(&a.final_score)
		.then_with(|| specificity_rank(a).cmp(&specificity_rank(b)))
		.then_with(|| matched_len(b).cmp(&matched_len(a)))
		.then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
}

/// AC scores as fusion sees them: context penalty applied, hits under their tier threshold
/// dropped.
pub fn surviving_ac_scores(original_text: &str, cfg: &Search, ac: &[AcScore]) -> Vec<f32> {
	ac.iter()
		.map(|hit| apply_context_penalty(original_text, cfg, hit))
		.filter(|scored| scored.score >= tier_threshold(cfg, scored.ac_type))
		.map(|scored| scored.score)
		.collect()
}

fn apply_context_penalty<'a>(
	original_text: &str,
	cfg: &Search,
	hit: &'a AcScore,
) -> ScoredAc<'a> {
	if hit.entity.context_required() {
		let matched = hit.matched_text.as_deref().unwrap_or(hit.entity.normalized_name.as_str());

		if !tokens::has_context(original_text, matched) {
			return ScoredAc {
				hit,
				score: hit.ac_score * cfg.bonuses.context_penalty,
				ac_type: AcType::Weak,
				penalized: true,
			};
		}
	}

	ScoredAc { hit, score: hit.ac_score, ac_type: hit.ac_type, penalized: false }
}

fn tier_threshold(cfg: &Search, ac_type: AcType) -> f32 {
	match ac_type {
		AcType::Exact => cfg.thresholds.exact,
		AcType::Phrase => cfg.thresholds.phrase,
		AcType::Ngram => cfg.thresholds.ngram,
		AcType::Weak => cfg.thresholds.weak,
	}
}

fn score_group(
	ctx: &FusionContext<'_>,
	group: Group<'_>,
	dates: &[String],
	ids: &[String],
) -> Option<Candidate> {
	let best = group.ac.iter().max_by(|a, b| {
		a.score
			.total_cmp(&b.score)
			.then_with(|| b.ac_type.specificity().cmp(&a.ac_type.specificity()))
			.then_with(|| {
				text_len(a.hit.matched_text.as_deref()).cmp(&text_len(b.hit.matched_text.as_deref()))
			})
	});
	let vector = group.vector;
	let entity = pick_entity(&group.ac, vector)?;
	let ac_score = best.map(|scored| scored.score).unwrap_or(0.0);
	let vector_score = vector.map(|hit| hit.vector_score).unwrap_or(0.0);
	let bonuses = &ctx.cfg.bonuses;
	let base = match (best.is_some(), vector.is_some()) {
		(true, true) => (ctx.cfg.ac_weight * ac_score + ctx.cfg.vector_weight * vector_score)
			.max(ac_score)
			.max(vector_score),
		(true, false) => ac_score,
		(false, true) => vector_score,
		(false, false) => return None,
	};
	let mut matched_tiers: Vec<AcType> = group.ac.iter().map(|scored| scored.ac_type).collect();

	matched_tiers.sort();
	matched_tiers.dedup();

	let best_ac_type = best.map(|scored| scored.ac_type);
	let dob_match = entity
		.dob
		.as_deref()
		.and_then(anchors::normalize_date)
		.is_some_and(|dob| dates.contains(&dob));
	let id_match = entity
		.doc_id()
		.map(anchors::normalize_id)
		.is_some_and(|id| !id.is_empty() && ids.contains(&id));
	let multi_tier = matched_tiers.len() >= 2;
	let mut final_score = base;

	if dob_match {
		final_score += bonuses.dob_match.max(0.0);
	}
	if id_match {
		final_score += bonuses.id_match.max(0.0);
	}
	if multi_tier {
		final_score += bonuses.multi_tier.max(0.0);
	}
	if best_ac_type != Some(AcType::Exact) {
		final_score = final_score.min(ctx.cfg.tiers.exact_score - EXACT_CAP_MARGIN);
	}

	let exact_match = best_ac_type == Some(AcType::Exact)
		|| vector.is_some_and(|hit| names_equal_query(&hit.entity, ctx.query));
	let context_required = group.ac.iter().any(|scored| scored.hit.entity.context_required());
	let context_penalized = group.ac.iter().any(|scored| scored.penalized);
	let search_type = match (best_ac_type, vector.is_some()) {
		(Some(_), true) => SearchType::Fusion,
		(Some(ac_type), false) => SearchType::from(ac_type),
		(None, _) => SearchType::Vector,
	};
	let matched_text = best
		.and_then(|scored| scored.hit.matched_text.clone())
		.or_else(|| Some(entity.normalized_name.clone()).filter(|name| !name.is_empty()));

	Some(Candidate {
		entity,
		final_score,
		ac_score,
		vector_score,
		matched_text,
		features: CandidateFeatures {
			exact_match,
			dob_match,
			id_match,
			multi_tier,
			context_required,
			context_present: context_required && !context_penalized,
			context_penalized,
			matched_tiers,
			best_ac_type,
		},
		search_type,
	})
}

/// Prefers a full index record over the sparse record a pattern hit carries.
fn pick_entity(ac: &[ScoredAc<'_>], vector: Option<&VectorHit>) -> Option<EntityRecord> {
	let from_index = ac.iter().find(|scored| scored.hit.matched_field != "pattern");
	let mut entity = match (from_index, vector, ac.first()) {
		(Some(scored), _, _) => scored.hit.entity.clone(),
		(None, Some(hit), _) => hit.entity.clone(),
		(None, None, Some(scored)) => scored.hit.entity.clone(),
		(None, None, None) => return None,
	};

	if ac.iter().any(|scored| scored.hit.entity.context_required()) {
		entity.meta.insert("context_required".to_string(), serde_json::Value::Bool(true));
	}

	Some(entity)
}

fn names_equal_query(entity: &EntityRecord, query: &str) -> bool {
	std::iter::once(&entity.normalized_name)
		.chain(entity.aliases.iter())
		.any(|name| watchlist_domain::fold(name) == query)
}

fn specificity_rank(candidate: &Candidate) -> u8 {
	candidate.features.best_ac_type.map(AcType::specificity).unwrap_or(u8::MAX)
}

fn matched_len(candidate: &Candidate) -> usize {
	text_len(candidate.matched_text.as_deref())
}

fn text_len(text: Option<&str>) -> usize {
	text.map(|text| text.chars().count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn entity(id: &str, name: &str) -> EntityRecord {
		EntityRecord {
			entity_id: id.to_string(),
			entity_type: "person".to_string(),
			normalized_name: name.to_string(),
			..Default::default()
		}
	}

	fn ac_hit(id: &str, name: &str, score: f32, ac_type: AcType) -> AcScore {
		AcScore {
			entity: entity(id, name),
			ac_score: score,
			ac_type,
			matched_field: "normalized_text".to_string(),
			matched_text: Some(name.to_string()),
		}
	}

	fn vector_hit(id: &str, name: &str, score: f32) -> VectorHit {
		VectorHit {
			entity: entity(id, name),
			vector_score: score,
			matched_field: "name_vector".to_string(),
		}
	}

	fn ctx<'a>(query: &'a str, opts: &'a SearchOpts, cfg: &'a Search) -> FusionContext<'a> {
		FusionContext { query, original_text: query, opts, cfg, admit_vector_only: true }
	}

	#[test]
	fn fused_score_never_drops_below_its_sources() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let ac = [ac_hit("e1", "иван петров", 1.4, AcType::Phrase)];
		let vector = [vector_hit("e1", "иван петров", 0.9)];
		let out = fuse(&ctx("иван петров", &opts, &cfg), &ac, &vector);

		assert_eq!(out.len(), 1);
		assert_eq!(out[0].search_type, SearchType::Fusion);
		assert!(out[0].final_score >= 1.4);
		assert!(out[0].final_score < cfg.tiers.exact_score);
	}

	#[test]
	fn exact_hits_outrank_everything_else() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let mut ac = vec![ac_hit("e2", "иван петров", 2.0, AcType::Exact)];

		ac.push(ac_hit("e1", "иван петрович", 1.9, AcType::Phrase));
		ac.push(ac_hit("e1", "иван петрович", 0.9, AcType::Ngram));

		let vector = [vector_hit("e1", "иван петрович", 1.0), vector_hit("e3", "петров", 0.99)];
		let out = fuse(&ctx("иван петров", &opts, &cfg), &ac, &vector);

		assert_eq!(out[0].entity.entity_id, "e2");
		assert!(out[0].features.exact_match);
		assert!(out[1..].iter().all(|c| c.final_score < out[0].final_score));
		assert!(out[1].features.multi_tier);
	}

	#[test]
	fn failing_tier_thresholds_drop_hits() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let ac = [
			ac_hit("e1", "петров", 0.65, AcType::Ngram),
			ac_hit("e2", "петр", 0.55, AcType::Weak),
		];
		let out = fuse(&ctx("петров", &opts, &cfg), &ac, &[]);

		assert!(out.is_empty());
		assert!(surviving_ac_scores("петров", &cfg, &ac).is_empty());
	}

	#[test]
	fn surviving_scores_carry_the_context_penalty() {
		let cfg = Search::default();
		let mut gated = ac_hit("org_001", "газпром", 1.9, AcType::Phrase);

		gated.entity.meta.insert("context_required".to_string(), json!(true));

		let ac = [gated, ac_hit("e1", "петров", 1.2, AcType::Phrase)];
		let scores = surviving_ac_scores("газпром", &cfg, &ac);

		assert_eq!(scores.len(), 2);
		assert!((scores[0] - 1.9 * cfg.bonuses.context_penalty).abs() < 1e-6);
		assert_eq!(scores[1], 1.2);
	}

	#[test]
	fn vector_only_entities_need_admission() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let ac = [ac_hit("e1", "иван петров", 1.5, AcType::Phrase)];
		let vector = [vector_hit("e2", "иван петренко", 0.8)];
		let mut context = ctx("иван петров", &opts, &cfg);

		context.admit_vector_only = false;

		let enriched = fuse(&context, &ac, &vector);

		assert_eq!(enriched.len(), 1);

		context.admit_vector_only = true;

		let escalated = fuse(&context, &ac, &vector);

		assert_eq!(escalated.len(), 2);
		assert_eq!(escalated[1].search_type, SearchType::Vector);
	}

	#[test]
	fn anchors_add_bonuses() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let mut hit = ac_hit("e1", "иван петров", 1.5, AcType::Phrase);

		hit.entity.dob = Some("1975-03-12".to_string());
		hit.entity.meta.insert("doc_id".to_string(), json!("MK123456"));

		let text = "Иван Петров 12.03.1975 паспорт MK 123456 и MK123456";
		let context = FusionContext { original_text: text, ..ctx("иван петров", &opts, &cfg) };
		let out = fuse(&context, &[hit], &[]);

		assert!(out[0].features.dob_match);
		assert!(out[0].features.id_match);
		assert!((out[0].final_score - 1.75).abs() < 1e-6);
	}

	#[test]
	fn missing_context_demotes_to_weak() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let mut hit = ac_hit("e1", "газпром", 1.6, AcType::Phrase);

		hit.entity.meta.insert("context_required".to_string(), json!(true));

		let bare = fuse(&ctx("газпром", &opts, &cfg), std::slice::from_ref(&hit), &[]);

		assert_eq!(bare[0].search_type, SearchType::Weak);
		assert!(bare[0].features.context_penalized);
		assert!((bare[0].final_score - 0.8).abs() < 1e-6);

		let with_context = FusionContext {
			original_text: "оплата газпром по договору",
			..ctx("газпром", &opts, &cfg)
		};
		let out = fuse(&with_context, &[hit], &[]);

		assert_eq!(out[0].search_type, SearchType::Phrase);
		assert!(out[0].features.context_present);
	}

	#[test]
	fn vector_name_equality_marks_exact_match() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let vector = [vector_hit("e1", "Иван Петров", 0.97)];
		let out = fuse(&ctx("иван петров", &opts, &cfg), &[], &vector);

		assert!(out[0].features.exact_match);
		assert_eq!(out[0].search_type, SearchType::Vector);
	}

	#[test]
	fn ties_break_on_entity_id() {
		let cfg = Search::default();
		let opts = SearchOpts::default();
		let ac = [
			ac_hit("e2", "иван петров", 1.5, AcType::Phrase),
			ac_hit("e1", "иван петров", 1.5, AcType::Phrase),
		];
		let out = fuse(&ctx("иван петров", &opts, &cfg), &ac, &[]);

		assert_eq!(out[0].entity.entity_id, "e1");
	}
}
