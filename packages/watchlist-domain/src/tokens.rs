use unicode_segmentation::UnicodeSegmentation;

use crate::fold::fold;

/// Splits folded text into word tokens.
pub fn tokenize(input: &str) -> Vec<String> {
	fold(input).unicode_words().map(str::to_string).collect()
}

/// Fraction of `query` tokens found in `indexed`, in `[0, 1]`.
pub fn coverage(query: &[String], indexed: &[String]) -> f32 {
	if query.is_empty() || indexed.is_empty() {
		return 0.0;
	}

	let hits = query.iter().filter(|token| indexed.contains(token)).count();
	let denominator = query.len().max(indexed.len());

	hits as f32 / denominator as f32
}

/// True when the original text carries at least one token outside the matched name.
pub fn has_context(original_text: &str, matched_text: &str) -> bool {
	let matched = tokenize(matched_text);

	tokenize(original_text).iter().any(|token| !matched.contains(token))
}
