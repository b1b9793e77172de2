use watchlist_config::{Search, SearchEscalation};

use crate::SearchMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	Ac,
	Vector,
	/// Vector search that only runs when the AC results are weak.
	VectorOnEscalation,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ac => "ac",
			Self::Vector => "vector",
			Self::VectorOnEscalation => "vector_on_escalation",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
	pub stages: Vec<Stage>,
	/// Planned stages run at the same time. Only a plan with both tiers is concurrent.
	pub concurrent: bool,
	/// Stage that runs when the primary stage fails or is skipped.
	pub fallback: Option<Stage>,
}
impl Plan {
	pub fn primary(&self) -> Option<Stage> {
		self.stages.first().copied()
	}

	/// A vector stage that is the only planned tier, or the fallback to one, needs a query
	/// vector. Next to AC it is optional.
	pub fn vector_required(&self) -> bool {
		self.stages.len() == 1
	}

	pub fn stage_names(&self) -> Vec<String> {
		self.stages.iter().map(|stage| stage.as_str().to_string()).collect()
	}
}

pub fn plan_stages(mode: SearchMode, cfg: &Search) -> Plan {
	match mode {
		SearchMode::Ac => Plan { stages: vec![Stage::Ac], concurrent: false, fallback: None },
		SearchMode::Vector =>
			Plan { stages: vec![Stage::Vector], concurrent: false, fallback: None },
		SearchMode::Hybrid if cfg.hybrid_vector_enrichment =>
			Plan { stages: vec![Stage::Ac, Stage::Vector], concurrent: true, fallback: None },
		SearchMode::Hybrid => Plan {
			stages: vec![Stage::Ac, Stage::VectorOnEscalation],
			concurrent: false,
			fallback: None,
		},
		SearchMode::FallbackAc =>
			Plan { stages: vec![Stage::Ac], concurrent: false, fallback: Some(Stage::Vector) },
		SearchMode::FallbackVector =>
			Plan { stages: vec![Stage::Vector], concurrent: false, fallback: Some(Stage::Ac) },
	}
}

/// True when AC found nothing useful: no score reaches the empty threshold, or the best one
/// stays under the weak threshold. Takes scores after the context penalty and tier thresholds.
pub fn is_weak(scores: &[f32], escalation: &SearchEscalation) -> bool {
	match best_score(scores) {
		None => true,
		Some(best) => best < escalation.ac_empty_threshold || best < escalation.ac_weak_threshold,
	}
}

pub fn best_score(scores: &[f32]) -> Option<f32> {
	scores.iter().copied().reduce(f32::max)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hybrid_plan_depends_on_enrichment() {
		let mut cfg = Search::default();
		let enriched = plan_stages(SearchMode::Hybrid, &cfg);

		assert_eq!(enriched.stages, vec![Stage::Ac, Stage::Vector]);
		assert!(enriched.concurrent);

		cfg.hybrid_vector_enrichment = false;

		let lazy = plan_stages(SearchMode::Hybrid, &cfg);

		assert_eq!(lazy.stages, vec![Stage::Ac, Stage::VectorOnEscalation]);
		assert!(!lazy.concurrent);
		assert!(!lazy.vector_required());
	}

	#[test]
	fn fallback_modes_name_the_other_tier() {
		let cfg = Search::default();

		assert_eq!(plan_stages(SearchMode::FallbackAc, &cfg).fallback, Some(Stage::Vector));
		assert_eq!(plan_stages(SearchMode::FallbackVector, &cfg).fallback, Some(Stage::Ac));
		assert_eq!(plan_stages(SearchMode::Ac, &cfg).fallback, None);
	}

	#[test]
	fn lone_vector_tiers_require_a_query_vector() {
		let cfg = Search::default();

		assert!(plan_stages(SearchMode::Vector, &cfg).vector_required());
		assert!(plan_stages(SearchMode::FallbackAc, &cfg).vector_required());
		assert_eq!(plan_stages(SearchMode::FallbackVector, &cfg).primary(), Some(Stage::Vector));
		assert!(!plan_stages(SearchMode::Hybrid, &cfg).vector_required());
	}

	#[test]
	fn weakness_uses_both_thresholds() {
		let escalation = SearchEscalation::default();

		assert!(is_weak(&[], &escalation));
		assert!(is_weak(&[0.4], &escalation));
		assert!(is_weak(&[0.8], &escalation));
		assert!(!is_weak(&[0.8, 1.2], &escalation));
		assert_eq!(best_score(&[0.8, 1.2, 0.3]), Some(1.2));
	}
}
