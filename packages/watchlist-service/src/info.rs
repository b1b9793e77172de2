use crate::{AcType, SearchResult, SearchType};

const HIGH_CONFIDENCE: f32 = 0.8;

/// Condensed view of a search result for decision layers.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchInfo {
	pub has_exact_matches: bool,
	pub has_phrase_matches: bool,
	pub has_ngram_matches: bool,
	pub has_weak_matches: bool,
	pub has_vector_matches: bool,
	pub exact_confidence: f32,
	pub phrase_confidence: f32,
	pub ngram_confidence: f32,
	pub weak_confidence: f32,
	pub vector_confidence: f32,
	pub total_matches: usize,
	pub high_confidence_matches: usize,
	pub search_time_ms: u64,
}
impl SearchInfo {
	/// Tiers are taken from each candidate's best AC tier. Vector covers every candidate with a
	/// vector contribution.
	pub fn from_result(result: &SearchResult) -> Self {
		let mut info = Self {
			total_matches: result.candidates.len(),
			search_time_ms: result.processing_time_ms,
			..Default::default()
		};

		for candidate in &result.candidates {
			let score = candidate.final_score;
			let (flag, confidence) = match candidate.features.best_ac_type {
				Some(AcType::Exact) => (&mut info.has_exact_matches, &mut info.exact_confidence),
				Some(AcType::Phrase) => (&mut info.has_phrase_matches, &mut info.phrase_confidence),
				Some(AcType::Ngram) => (&mut info.has_ngram_matches, &mut info.ngram_confidence),
				Some(AcType::Weak) => (&mut info.has_weak_matches, &mut info.weak_confidence),
				None => (&mut info.has_vector_matches, &mut info.vector_confidence),
			};

			*flag = true;
			*confidence = confidence.max(score);

			if candidate.search_type == SearchType::Fusion {
				info.has_vector_matches = true;
				info.vector_confidence = info.vector_confidence.max(score);
			}
			if score >= HIGH_CONFIDENCE {
				info.high_confidence_matches += 1;
			}
		}

		info
	}
}
