pub mod validate;

pub use validate::{
	IssueCategory, SearchTraceValidator, Severity, StepKind, TraceStep, ValidationIssue,
	ValidationReport, ValidatorSettings,
};

use serde_json::json;

const HASH_LEN: usize = 16;

/// Step-by-step record of one search call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SearchTrace {
	pub enabled: bool,
	pub notes: Vec<String>,
	pub total_time_ms: u64,
	pub total_hits: usize,
}
impl SearchTrace {
	pub fn new(enabled: bool) -> Self {
		Self { enabled, notes: Vec::new(), total_time_ms: 0, total_hits: 0 }
	}

	pub fn note(&mut self, note: impl Into<String>) {
		if self.enabled {
			self.notes.push(note.into());
		}
	}

	/// Order-independent digest of the notes and scalar fields.
	pub fn deterministic_hash(&self) -> String {
		let mut notes = self.notes.clone();

		notes.sort();

		let canonical = json!({
			"enabled": self.enabled,
			"notes": notes,
			"total_hits": self.total_hits,
			"total_time_ms": self.total_time_ms,
		});
		let digest = blake3::hash(canonical.to_string().as_bytes()).to_hex();

		digest.as_str()[..HASH_LEN].to_string()
	}
}
impl Default for SearchTrace {
	fn default() -> Self {
		Self::new(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn trace(notes: &[&str]) -> SearchTrace {
		SearchTrace {
			enabled: true,
			notes: notes.iter().map(|note| note.to_string()).collect(),
			total_time_ms: 42,
			total_hits: 3,
		}
	}

	#[test]
	fn hash_ignores_note_order() {
		let a = trace(&["AC search X", "Vector search Y", "Hybrid merge Z"]);
		let b = trace(&["Vector search Y", "AC search X", "Hybrid merge Z"]);

		assert_eq!(a.deterministic_hash(), b.deterministic_hash());
		assert_eq!(a.deterministic_hash().len(), 16);
	}

	#[test]
	fn hash_tracks_content_and_scalars() {
		let base = trace(&["AC search X"]);
		let mut other = base.clone();

		other.total_hits = 4;

		assert_ne!(base.deterministic_hash(), other.deterministic_hash());
		assert_ne!(base.deterministic_hash(), trace(&["AC search Y"]).deterministic_hash());
	}

	#[test]
	fn disabled_trace_drops_notes() {
		let mut trace = SearchTrace::new(false);

		trace.note("AC search completed with 1 results in 3ms");

		assert!(trace.notes.is_empty());
	}
}
