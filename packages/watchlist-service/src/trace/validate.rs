//! Structural checks over search traces.
//!
//! Notes are typed by keyword, then checked for step ordering, timing sanity, coverage of the
//! search and result-processing phases, and per-step latency. Problems are reported as issues and
//! never returned as errors.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;

use crate::{SearchMode, SearchTrace};

const DURATION_PATTERN: &str = r"(-?\d+(?:\.\d+)?)\s*ms\b";
const COUNT_PATTERN: &str = r"(\d+)\s+(?:results|candidates)\b";

static DURATION_RE: OnceLock<Option<Regex>> = OnceLock::new();
static COUNT_RE: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Info,
	Warning,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
	Ordering,
	Timing,
	Coverage,
	Performance,
	Pattern,
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
	AcSearch,
	VectorSearch,
	HybridMerge,
	ResultFilter,
	ScoreCalculation,
	FallbackTriggered,
	/// A stage that was planned but did not run.
	Skipped,
	Other,
}
impl StepKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::AcSearch => "ac_search",
			Self::VectorSearch => "vector_search",
			Self::HybridMerge => "hybrid_merge",
			Self::ResultFilter => "result_filter",
			Self::ScoreCalculation => "score_calculation",
			Self::FallbackTriggered => "fallback_triggered",
			Self::Skipped => "skipped",
			Self::Other => "other",
		}
	}

	/// Keyword classification. Earlier keywords win.
	pub fn classify(note: &str) -> Self {
		let lower = note.to_lowercase();

		if lower.contains("skipped") {
			Self::Skipped
		} else if lower.contains("fallback") {
			Self::FallbackTriggered
		} else if lower.contains("hybrid merge") {
			Self::HybridMerge
		} else if lower.contains("ac search") {
			Self::AcSearch
		} else if lower.contains("vector search") {
			Self::VectorSearch
		} else if lower.contains("filter") {
			Self::ResultFilter
		} else if lower.contains("score") {
			Self::ScoreCalculation
		} else {
			Self::Other
		}
	}

	pub fn is_search(self) -> bool {
		matches!(self, Self::AcSearch | Self::VectorSearch)
	}

	pub fn is_processing(self) -> bool {
		matches!(self, Self::HybridMerge | Self::ResultFilter | Self::ScoreCalculation)
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TraceStep {
	pub index: usize,
	pub kind: StepKind,
	pub note: String,
	pub duration_ms: Option<f64>,
	pub result_count: Option<usize>,
}
impl TraceStep {
	pub fn parse(index: usize, note: &str) -> Self {
		let duration_ms = compiled(&DURATION_RE, DURATION_PATTERN)
			.and_then(|re| re.captures(note))
			.and_then(|caps| caps.get(1))
			.and_then(|m| m.as_str().parse().ok());
		let result_count = compiled(&COUNT_RE, COUNT_PATTERN)
			.and_then(|re| re.captures(note))
			.and_then(|caps| caps.get(1))
			.and_then(|m| m.as_str().parse().ok());

		Self {
			index,
			kind: StepKind::classify(note),
			note: note.to_string(),
			duration_ms,
			result_count,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
	pub severity: Severity,
	pub category: IssueCategory,
	pub message: String,
	pub step_index: Option<usize>,
	pub expected: Option<String>,
	pub actual: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PerformanceThresholds {
	pub ac_search_ms: f64,
	pub vector_search_ms: f64,
	pub hybrid_merge_ms: f64,
	pub result_filter_ms: f64,
	pub score_calculation_ms: f64,
}
impl PerformanceThresholds {
	fn for_kind(&self, kind: StepKind) -> Option<f64> {
		match kind {
			StepKind::AcSearch => Some(self.ac_search_ms),
			StepKind::VectorSearch => Some(self.vector_search_ms),
			StepKind::HybridMerge => Some(self.hybrid_merge_ms),
			StepKind::ResultFilter => Some(self.result_filter_ms),
			StepKind::ScoreCalculation => Some(self.score_calculation_ms),
			StepKind::FallbackTriggered | StepKind::Skipped | StepKind::Other => None,
		}
	}
}
impl Default for PerformanceThresholds {
	fn default() -> Self {
		Self {
			ac_search_ms: 50.0,
			vector_search_ms: 100.0,
			hybrid_merge_ms: 20.0,
			result_filter_ms: 10.0,
			score_calculation_ms: 20.0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidatorSettings {
	/// Missing coverage is an error instead of a warning.
	pub strict: bool,
	pub max_step_duration_ms: f64,
	pub performance: PerformanceThresholds,
}
impl Default for ValidatorSettings {
	fn default() -> Self {
		Self { strict: false, max_step_duration_ms: 10_000.0, performance: Default::default() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TraceStatistics {
	pub step_counts: BTreeMap<StepKind, usize>,
	pub timed_steps: usize,
	pub total_results: usize,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimingAnalysis {
	pub total_step_ms: f64,
	pub slowest_step: Option<usize>,
	pub slowest_ms: Option<f64>,
	pub by_kind_ms: BTreeMap<StepKind, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CoverageAnalysis {
	pub has_search_execution: bool,
	pub has_result_processing: bool,
	pub kinds_present: Vec<StepKind>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationReport {
	pub is_valid: bool,
	pub total_steps: usize,
	pub deterministic_hash: String,
	pub issues: Vec<ValidationIssue>,
	pub statistics: TraceStatistics,
	pub timing_analysis: TimingAnalysis,
	pub coverage_analysis: CoverageAnalysis,
}
impl ValidationReport {
	pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
		self.issues.iter().filter(|issue| issue.severity == Severity::Error)
	}

	pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
		self.issues.iter().filter(|issue| issue.severity == Severity::Warning)
	}
}

#[derive(Debug, Clone, Default)]
pub struct SearchTraceValidator {
	settings: ValidatorSettings,
}
impl SearchTraceValidator {
	pub fn new(settings: ValidatorSettings) -> Self {
		Self { settings }
	}

	pub fn strict() -> Self {
		Self::new(ValidatorSettings { strict: true, ..Default::default() })
	}

	pub fn settings(&self) -> &ValidatorSettings {
		&self.settings
	}

	pub fn parse_steps(trace: &SearchTrace) -> Vec<TraceStep> {
		trace.notes.iter().enumerate().map(|(index, note)| TraceStep::parse(index, note)).collect()
	}

	pub fn validate_trace(&self, trace: &SearchTrace) -> ValidationReport {
		let steps = Self::parse_steps(trace);
		let mut issues = Vec::new();

		check_ordering(&steps, &mut issues);
		self.check_timing(&steps, &mut issues);

		let coverage_analysis = self.check_coverage(&steps, &mut issues);

		self.check_performance(&steps, &mut issues);

		build_report(trace, &steps, issues, coverage_analysis)
	}

	/// Runs [`Self::validate_trace`] plus the step pattern expected for `mode`.
	pub fn validate_for_strategy(&self, trace: &SearchTrace, mode: SearchMode) -> ValidationReport {
		let mut report = self.validate_trace(trace);
		let steps = Self::parse_steps(trace);
		let has = |kind: StepKind| steps.iter().any(|step| step.kind == kind);
		let mut missing = |expected: &str, actual: &str, message: &str| {
			report.issues.push(ValidationIssue {
				severity: Severity::Error,
				category: IssueCategory::Pattern,
				message: message.to_string(),
				step_index: None,
				expected: Some(expected.to_string()),
				actual: Some(actual.to_string()),
			});
		};

		match mode {
			SearchMode::Ac => {
				if !has(StepKind::AcSearch) {
					missing("ac_search", "none", "AC-only trace has no AC search step.");
				}
				if has(StepKind::VectorSearch) {
					missing("none", "vector_search", "AC-only trace contains a vector search step.");
				}
			},
			SearchMode::Vector => {
				if !has(StepKind::VectorSearch) {
					missing("vector_search", "none", "Vector-only trace has no vector search step.");
				}
				if has(StepKind::AcSearch) {
					missing("none", "ac_search", "Vector-only trace contains an AC search step.");
				}
			},
			SearchMode::Hybrid => {
				if !has(StepKind::AcSearch) {
					missing("ac_search", "none", "Hybrid trace has no AC search step.");
				}
				if !has(StepKind::HybridMerge) && !has(StepKind::ScoreCalculation) {
					missing(
						"hybrid_merge",
						"none",
						"Hybrid trace has no merge or score calculation step.",
					);
				}
			},
			SearchMode::FallbackAc | SearchMode::FallbackVector => {
				if !steps.iter().any(|step| step.kind.is_search()) {
					missing("search", "none", "Fallback trace has no search step.");
				}

				for step in steps.iter().filter(|step| step.kind == StepKind::FallbackTriggered) {
					if !steps[step.index + 1..].iter().any(|later| later.kind.is_search()) {
						report.issues.push(ValidationIssue {
							severity: Severity::Error,
							category: IssueCategory::Pattern,
							message: "Fallback step is not followed by a search step.".to_string(),
							step_index: Some(step.index),
							expected: Some("search".to_string()),
							actual: Some("none".to_string()),
						});
					}
				}
			},
		}

		let is_valid = report.errors().next().is_none();
		report.is_valid = is_valid;

		report
	}

	fn check_timing(&self, steps: &[TraceStep], issues: &mut Vec<ValidationIssue>) {
		for step in steps {
			let Some(duration) = step.duration_ms else {
				continue;
			};

			if duration < 0.0 {
				issues.push(ValidationIssue {
					severity: Severity::Error,
					category: IssueCategory::Timing,
					message: format!("Step {} has a negative duration.", step.index),
					step_index: Some(step.index),
					expected: Some(">= 0ms".to_string()),
					actual: Some(format!("{duration}ms")),
				});
			} else if duration > self.settings.max_step_duration_ms {
				issues.push(ValidationIssue {
					severity: Severity::Warning,
					category: IssueCategory::Timing,
					message: format!("Step {} exceeds the step duration ceiling.", step.index),
					step_index: Some(step.index),
					expected: Some(format!("<= {}ms", self.settings.max_step_duration_ms)),
					actual: Some(format!("{duration}ms")),
				});
			}
		}
	}

	fn check_coverage(
		&self,
		steps: &[TraceStep],
		issues: &mut Vec<ValidationIssue>,
	) -> CoverageAnalysis {
		let severity = if self.settings.strict { Severity::Error } else { Severity::Warning };
		let has_search_execution = steps.iter().any(|step| step.kind.is_search());
		let has_result_processing = steps.iter().any(|step| step.kind.is_processing());

		if !has_search_execution {
			issues.push(ValidationIssue {
				severity,
				category: IssueCategory::Coverage,
				message: "Trace has no search execution step.".to_string(),
				step_index: None,
				expected: Some("ac_search or vector_search".to_string()),
				actual: Some("none".to_string()),
			});
		}
		if !has_result_processing {
			issues.push(ValidationIssue {
				severity,
				category: IssueCategory::Coverage,
				message: "Trace has no result processing step.".to_string(),
				step_index: None,
				expected: Some("hybrid_merge, result_filter or score_calculation".to_string()),
				actual: Some("none".to_string()),
			});
		}

		let mut kinds_present: Vec<StepKind> = steps.iter().map(|step| step.kind).collect();

		kinds_present.sort();
		kinds_present.dedup();

		CoverageAnalysis { has_search_execution, has_result_processing, kinds_present }
	}

	fn check_performance(&self, steps: &[TraceStep], issues: &mut Vec<ValidationIssue>) {
		for step in steps {
			let (Some(duration), Some(limit)) =
				(step.duration_ms, self.settings.performance.for_kind(step.kind))
			else {
				continue;
			};

			if duration > limit {
				issues.push(ValidationIssue {
					severity: Severity::Warning,
					category: IssueCategory::Performance,
					message: format!(
						"Step {} ({}) is slower than its threshold.",
						step.index,
						step.kind.as_str()
					),
					step_index: Some(step.index),
					expected: Some(format!("<= {limit}ms")),
					actual: Some(format!("{duration}ms")),
				});
			}
		}
	}
}

fn check_ordering(steps: &[TraceStep], issues: &mut Vec<ValidationIssue>) {
	for merge in steps.iter().filter(|step| step.kind == StepKind::HybridMerge) {
		let before = steps[..merge.index].iter().any(|step| step.kind.is_search());
		let after = steps[merge.index + 1..].iter().find(|step| step.kind.is_search());

		if !before {
			issues.push(ValidationIssue {
				severity: Severity::Error,
				category: IssueCategory::Ordering,
				message: "Hybrid merge has no preceding search step.".to_string(),
				step_index: Some(merge.index),
				expected: Some("search before hybrid_merge".to_string()),
				actual: Some("hybrid_merge first".to_string()),
			});
		}
		if let Some(late) = after {
			issues.push(ValidationIssue {
				severity: Severity::Error,
				category: IssueCategory::Ordering,
				message: format!("Hybrid merge precedes the {} step.", late.kind.as_str()),
				step_index: Some(merge.index),
				expected: Some(format!("{} before hybrid_merge", late.kind.as_str())),
				actual: Some(format!("{} at step {}", late.kind.as_str(), late.index)),
			});
		}
	}
}

fn build_report(
	trace: &SearchTrace,
	steps: &[TraceStep],
	issues: Vec<ValidationIssue>,
	coverage_analysis: CoverageAnalysis,
) -> ValidationReport {
	let mut statistics = TraceStatistics::default();
	let mut timing_analysis = TimingAnalysis::default();

	for step in steps {
		*statistics.step_counts.entry(step.kind).or_default() += 1;
		statistics.total_results += step.result_count.unwrap_or(0);

		let Some(duration) = step.duration_ms else {
			continue;
		};

		statistics.timed_steps += 1;
		timing_analysis.total_step_ms += duration;
		*timing_analysis.by_kind_ms.entry(step.kind).or_default() += duration;

		if timing_analysis.slowest_ms.is_none_or(|slowest| duration > slowest) {
			timing_analysis.slowest_ms = Some(duration);
			timing_analysis.slowest_step = Some(step.index);
		}
	}

	ValidationReport {
		is_valid: !issues.iter().any(|issue| issue.severity == Severity::Error),
		total_steps: steps.len(),
		deterministic_hash: trace.deterministic_hash(),
		issues,
		statistics,
		timing_analysis,
		coverage_analysis,
	}
}

fn compiled(slot: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
	slot.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn trace(notes: &[&str]) -> SearchTrace {
		SearchTrace {
			enabled: true,
			notes: notes.iter().map(|note| note.to_string()).collect(),
			total_time_ms: 30,
			total_hits: 2,
		}
	}

	fn categories(report: &ValidationReport, severity: Severity) -> Vec<IssueCategory> {
		report
			.issues
			.iter()
			.filter(|issue| issue.severity == severity)
			.map(|issue| issue.category)
			.collect()
	}

	#[test]
	fn parses_kinds_durations_and_counts() {
		let step = TraceStep::parse(0, "AC search completed with 3 results in 15ms");

		assert_eq!(step.kind, StepKind::AcSearch);
		assert_eq!(step.duration_ms, Some(15.0));
		assert_eq!(step.result_count, Some(3));
		assert_eq!(
			StepKind::classify("Fallback triggered: AC search failed"),
			StepKind::FallbackTriggered
		);
		assert_eq!(
			StepKind::classify("Score calculation produced 2 candidates"),
			StepKind::ScoreCalculation
		);
		assert_eq!(StepKind::classify("Strategy hybrid selected"), StepKind::Other);
		assert_eq!(
			StepKind::classify("Vector search skipped: AC results are strong"),
			StepKind::Skipped
		);
	}

	#[test]
	fn well_formed_hybrid_trace_is_valid() {
		let report = SearchTraceValidator::default().validate_for_strategy(
			&trace(&[
				"AC search completed with 2 results in 12ms",
				"Vector search completed with 4 results in 30ms",
				"Hybrid merge combined 2 AC results and 4 vector results into 5 candidates in 1ms",
				"Result filter returned 5 candidates from 5 (top_k 50)",
			]),
			SearchMode::Hybrid,
		);

		assert!(report.is_valid, "{:?}", report.issues);
		assert!(report.issues.is_empty());
		assert_eq!(report.total_steps, 4);
		assert_eq!(report.timing_analysis.slowest_step, Some(1));
		assert_eq!(report.statistics.step_counts[&StepKind::AcSearch], 1);
	}

	#[test]
	fn merge_before_search_is_an_ordering_error() {
		let report = SearchTraceValidator::default().validate_trace(&trace(&[
			"Hybrid merge combined 0 AC results and 0 vector results into 0 candidates in 1ms",
			"AC search completed with 0 results in 2ms",
		]));

		assert!(!report.is_valid);
		assert_eq!(categories(&report, Severity::Error), vec![
			IssueCategory::Ordering,
			IssueCategory::Ordering
		]);
	}

	#[test]
	fn timing_and_performance_issues() {
		let report = SearchTraceValidator::default().validate_trace(&trace(&[
			"AC search completed with 1 results in -3ms",
			"Vector search completed with 1 results in 12000ms",
			"Result filter returned 1 candidates from 1 (top_k 50) in 11ms",
		]));

		assert!(!report.is_valid);
		assert_eq!(categories(&report, Severity::Error), vec![IssueCategory::Timing]);
		assert_eq!(categories(&report, Severity::Warning), vec![
			IssueCategory::Timing,
			IssueCategory::Performance,
			IssueCategory::Performance
		]);
	}

	#[test]
	fn missing_coverage_depends_on_strictness() {
		let notes = trace(&["Strategy ac selected with stages: ac"]);
		let lenient = SearchTraceValidator::default().validate_trace(&notes);
		let strict = SearchTraceValidator::strict().validate_trace(&notes);

		assert!(lenient.is_valid);
		assert_eq!(lenient.warnings().count(), 2);
		assert!(!strict.is_valid);
		assert_eq!(strict.errors().count(), 2);
	}

	#[test]
	fn strategy_patterns_are_enforced() {
		let validator = SearchTraceValidator::default();
		let ac_with_vector = trace(&[
			"AC search completed with 1 results in 2ms",
			"Vector search completed with 1 results in 3ms",
			"Score calculation produced 1 candidates in 0ms",
		]);

		assert!(!validator.validate_for_strategy(&ac_with_vector, SearchMode::Ac).is_valid);

		let dangling_fallback = trace(&[
			"AC search failed in 4ms: unavailable",
			"Score calculation produced 0 candidates in 0ms",
			"Fallback triggered: vector search unavailable",
		]);
		let report = validator.validate_for_strategy(&dangling_fallback, SearchMode::FallbackAc);

		assert!(!report.is_valid);
		assert!(report.issues.iter().any(|issue| issue.step_index == Some(2)));
	}

	#[test]
	fn skipped_ac_stage_fails_the_hybrid_pattern() {
		let report = SearchTraceValidator::default().validate_for_strategy(
			&trace(&[
				"AC search skipped: every AC tier threshold is unreachable",
				"Escalation triggered: AC stage is disabled",
				"Vector search completed with 2 results in 8ms",
				"Score calculation produced 2 candidates in 0ms",
				"Result filter returned 2 candidates from 2 (top_k 50)",
			]),
			SearchMode::Hybrid,
		);

		assert!(!report.is_valid);
		assert!(report.issues.iter().any(|issue| issue.category == IssueCategory::Pattern
			&& issue.expected.as_deref() == Some("ac_search")));
		assert_eq!(report.statistics.step_counts[&StepKind::Skipped], 1);
	}
}
