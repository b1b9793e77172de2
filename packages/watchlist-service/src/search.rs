pub mod ac;
pub mod fusion;
pub mod strategy;
pub mod vector;

pub use ac::AcAdapter;
pub use fusion::{FusionContext, compare_candidates, fuse};
pub use strategy::{Plan, Stage, is_weak, plan_stages};
pub use vector::VectorAdapter;

use std::time::Instant;

use watchlist_domain::{Language, language};

use crate::{
	AcScore, Candidate, Error, QueryVectorSource, Result, SearchMetadata, SearchRequest,
	SearchResult, SearchService, SearchTrace, VectorHit,
};

enum TierOutcome<T> {
	Skipped(String),
	Done { hits: Vec<T>, elapsed_ms: u64 },
	Failed { error: Error, elapsed_ms: u64 },
}
impl<T> TierOutcome<T> {
	fn attempted(&self) -> bool {
		!matches!(self, Self::Skipped(_))
	}

	fn failed(&self) -> bool {
		matches!(self, Self::Failed { .. })
	}

	fn is_done(&self) -> bool {
		matches!(self, Self::Done { .. })
	}

	fn into_hits(self) -> Vec<T> {
		match self {
			Self::Done { hits, .. } => hits,
			Self::Skipped(_) | Self::Failed { .. } => Vec::new(),
		}
	}
}

/// Per-call inputs shared by the stages.
struct Run<'a> {
	req: &'a SearchRequest,
	/// Folded query name.
	query: String,
	original_text: &'a str,
	candidates: Vec<String>,
	language: Option<Language>,
	ac_disabled: bool,
}

/// Writes stage outcomes into the trace, the metadata, and the error list in call order.
struct Recorder<'a> {
	trace: &'a mut SearchTrace,
	meta: &'a mut SearchMetadata,
	errors: &'a mut Vec<String>,
}
impl Recorder<'_> {
	fn ac(&mut self, outcome: &TierOutcome<AcScore>) {
		match outcome {
			TierOutcome::Skipped(reason) => self.trace.note(format!("AC search skipped: {reason}")),
			TierOutcome::Done { hits, elapsed_ms } => {
				self.meta.ac_executed = true;
				self.meta.ac_time_ms = *elapsed_ms;
				self.trace.note(format!(
					"AC search completed with {} results in {elapsed_ms}ms",
					hits.len()
				));
			},
			TierOutcome::Failed { error, elapsed_ms } => {
				tracing::warn!(error = %error, "AC search failed.");

				self.meta.ac_executed = true;
				self.meta.ac_time_ms = *elapsed_ms;
				self.trace.note(format!("AC search failed in {elapsed_ms}ms: {error}"));
				self.errors.push(format!("AC search failed: {error}"));
			},
		}
	}

	fn vector(&mut self, outcome: &TierOutcome<VectorHit>, source: QueryVectorSource) {
		self.meta.query_vector_source = source;

		match outcome {
			TierOutcome::Skipped(reason) =>
				self.trace.note(format!("Vector search skipped: {reason}")),
			TierOutcome::Done { hits, elapsed_ms } => {
				self.meta.vector_executed = true;
				self.meta.vector_time_ms = *elapsed_ms;
				self.trace.note(format!(
					"Vector search completed with {} results in {elapsed_ms}ms",
					hits.len()
				));
			},
			TierOutcome::Failed { error, elapsed_ms } => {
				tracing::warn!(error = %error, "Vector search failed.");

				self.meta.vector_executed = true;
				self.meta.vector_time_ms = *elapsed_ms;
				self.trace.note(format!("Vector search failed in {elapsed_ms}ms: {error}"));
				self.errors.push(format!("Vector search failed: {error}"));
			},
		}
	}

	fn fallback(&mut self, reason: &str) {
		self.meta.fallback_triggered = true;
		self.trace.note(format!("Fallback triggered: {reason}"));
	}

	/// Hybrid escalation decision, judged on the AC scores fusion will keep. A disabled AC stage
	/// always escalates.
	fn escalate(
		&mut self,
		outcome: &TierOutcome<AcScore>,
		run: &Run<'_>,
		cfg: &watchlist_config::Search,
	) -> bool {
		let escalated = match outcome {
			TierOutcome::Skipped(_) => {
				self.trace.note("Escalation triggered: AC stage is disabled");

				true
			},
			TierOutcome::Done { hits, .. } => {
				let scores = fusion::surviving_ac_scores(run.original_text, cfg, hits);
				let weak = run.req.opts.enable_escalation && is_weak(&scores, &cfg.escalation);

				if weak {
					match strategy::best_score(&scores) {
						Some(best) => self.trace.note(format!(
							"Escalation triggered: best AC result {best:.3} is below {:.3}",
							cfg.escalation.ac_weak_threshold.max(cfg.escalation.ac_empty_threshold)
						)),
						None if hits.is_empty() =>
							self.trace.note("Escalation triggered: AC returned no hits"),
						None => self
							.trace
							.note("Escalation triggered: every AC result fell below its tier threshold"),
					}
				}

				weak
			},
			TierOutcome::Failed { .. } => false,
		};

		self.meta.escalated = escalated;

		escalated
	}
}

impl SearchService {
	/// Runs one screening search. Failures are reported on the result, never returned.
	pub async fn search(&self, req: SearchRequest) -> SearchResult {
		self.search_traced(req).await.0
	}

	pub async fn search_traced(&self, req: SearchRequest) -> (SearchResult, SearchTrace) {
		let started = Instant::now();
		let mode = req.opts.search_mode;
		let mut trace = SearchTrace::new(true);
		let mut result = match self.execute(&req, &mut trace).await {
			Ok(result) => result,
			Err(err) => {
				tracing::warn!(mode = mode.as_str(), error = %err, "Search request rejected.");

				trace.note(format!("Search request rejected: {err}"));

				SearchResult::failed(mode, vec![err.to_string()])
			},
		};

		result.processing_time_ms = elapsed_ms(started);
		trace.total_time_ms = result.processing_time_ms;
		trace.total_hits = result.candidates.len();

		self.store.monitor().record(
			&format!("search_{}", mode.as_str()),
			started.elapsed(),
			result.success,
		);
		tracing::debug!(
			mode = mode.as_str(),
			candidates = result.candidates.len(),
			elapsed_ms = result.processing_time_ms,
			success = result.success,
			"Search finished."
		);

		(result, trace)
	}

	async fn execute(&self, req: &SearchRequest, trace: &mut SearchTrace) -> Result<SearchResult> {
		req.opts.validate()?;

		let query = watchlist_domain::fold(&req.normalized_name);

		if query.is_empty() {
			return Err(Error::InvalidRequest {
				message: "normalized_name is empty after folding.".to_string(),
			});
		}

		let cfg = &self.cfg.search;
		let mode = req.opts.search_mode;
		let original_text = if req.original_text.trim().is_empty() {
			req.normalized_name.as_str()
		} else {
			req.original_text.as_str()
		};
		let language = req.language.or_else(|| language::detect(original_text));
		let plan = plan_stages(mode, cfg);
		let ac_disabled = AcAdapter::is_disabled(cfg);
		let mut candidates = vec![query.clone()];

		candidates.extend(req.variants.iter().cloned());

		let run = Run { req, query: query.clone(), original_text, candidates, language, ac_disabled };
		let mut meta = SearchMetadata::new(mode);
		let mut errors = Vec::new();

		meta.planned_stages = plan.stage_names();
		meta.normalized_query = query.clone();
		meta.language = language;
		meta.ac_disabled = ac_disabled;
		meta.exact_matches_unavailable =
			ac_disabled || cfg.thresholds.exact > cfg.tiers.exact_score;

		trace.note(format!(
			"Strategy {} selected with stages: {}",
			mode.as_str(),
			meta.planned_stages.join(", ")
		));

		let mut rec = Recorder { trace, meta: &mut meta, errors: &mut errors };
		let mut ac: Option<TierOutcome<AcScore>> = None;
		let mut vector: Option<TierOutcome<VectorHit>> = None;
		let mut admit_vector_only = true;
		let vector_required = plan.vector_required();

		if plan.concurrent {
			let (ac_outcome, (vector_outcome, source)) =
				tokio::join!(self.run_ac(&run), self.run_vector(&run, vector_required));

			rec.ac(&ac_outcome);

			if ac_outcome.failed() {
				rec.fallback("AC search failed, relying on vector search results");
			}

			rec.vector(&vector_outcome, source);

			admit_vector_only = rec.escalate(&ac_outcome, &run, cfg) || ac_outcome.failed();
			ac = Some(ac_outcome);
			vector = Some(vector_outcome);
		} else {
			for stage in &plan.stages {
				match stage {
					Stage::Ac => {
						let outcome = self.run_ac(&run).await;

						rec.ac(&outcome);
						ac = Some(outcome);
					},
					Stage::Vector => {
						let (outcome, source) = self.run_vector(&run, vector_required).await;

						rec.vector(&outcome, source);
						vector = Some(outcome);
					},
					Stage::VectorOnEscalation => {
						let Some(ac_outcome) = ac.as_ref() else {
							continue;
						};

						if ac_outcome.failed() {
							rec.fallback("AC search failed, switching to vector search");
						}
						if rec.escalate(ac_outcome, &run, cfg) || ac_outcome.failed() {
							let (outcome, source) = self.run_vector(&run, vector_required).await;

							rec.vector(&outcome, source);
							vector = Some(outcome);
						} else {
							rec.trace.note("Vector search skipped: AC results are strong");
						}
					},
				}
			}
		}

		if let Some(fallback) = plan.fallback {
			let primary_done = match plan.primary() {
				Some(Stage::Ac) => ac.as_ref().is_some_and(TierOutcome::is_done),
				Some(Stage::Vector | Stage::VectorOnEscalation) =>
					vector.as_ref().is_some_and(TierOutcome::is_done),
				None => false,
			};

			if !primary_done {
				match fallback {
					Stage::Ac => {
						rec.fallback("Vector search unavailable, switching to AC search");

						let outcome = self.run_ac(&run).await;

						rec.ac(&outcome);
						ac = Some(outcome);
					},
					Stage::Vector | Stage::VectorOnEscalation => {
						rec.fallback("AC search unavailable, switching to vector search");

						let (outcome, source) = self.run_vector(&run, vector_required).await;

						rec.vector(&outcome, source);
						vector = Some(outcome);
					},
				}
			}
		}

		let attempted = usize::from(ac.as_ref().is_some_and(TierOutcome::attempted))
			+ usize::from(vector.as_ref().is_some_and(TierOutcome::attempted));
		let failed = usize::from(ac.as_ref().is_some_and(TierOutcome::failed))
			+ usize::from(vector.as_ref().is_some_and(TierOutcome::failed));
		let success = attempted == 0 || failed < attempted;
		let merged = ac.as_ref().is_some_and(TierOutcome::is_done)
			&& vector.as_ref().is_some_and(TierOutcome::is_done);
		let ac_hits = ac.map(TierOutcome::into_hits).unwrap_or_default();
		let vector_hits = vector.map(TierOutcome::into_hits).unwrap_or_default();
		let candidates = if success {
			self.rank(&run, &ac_hits, &vector_hits, admit_vector_only, merged, &mut rec)
		} else {
			rec.trace.note("Score calculation skipped: every executed tier failed");

			Vec::new()
		};

		Ok(SearchResult {
			candidates,
			ac_results: ac_hits,
			vector_results: vector_hits,
			search_metadata: meta,
			processing_time_ms: 0,
			success,
			errors,
		})
	}

	fn rank(
		&self,
		run: &Run<'_>,
		ac_hits: &[AcScore],
		vector_hits: &[VectorHit],
		admit_vector_only: bool,
		merged: bool,
		rec: &mut Recorder<'_>,
	) -> Vec<Candidate> {
		let opts = &run.req.opts;
		let started = Instant::now();
		let ctx = FusionContext {
			query: &run.query,
			original_text: run.original_text,
			opts,
			cfg: &self.cfg.search,
			admit_vector_only,
		};
		let fused = fuse(&ctx, ac_hits, vector_hits);
		let fusion_ms = elapsed_ms(started);

		rec.meta.fusion_time_ms = fusion_ms;

		if merged {
			rec.trace.note(format!(
				"Hybrid merge combined {} AC results and {} vector results into {} candidates in {fusion_ms}ms",
				ac_hits.len(),
				vector_hits.len(),
				fused.len()
			));
		} else {
			rec.trace.note(format!(
				"Score calculation produced {} candidates in {fusion_ms}ms",
				fused.len()
			));
		}

		let total = fused.len();
		let mut kept: Vec<Candidate> =
			fused.into_iter().filter(|candidate| candidate.final_score >= opts.threshold).collect();

		kept.truncate(opts.top_k as usize);
		rec.trace.note(format!(
			"Result filter returned {} candidates from {total} (top_k {})",
			kept.len(),
			opts.top_k
		));

		kept
	}

	async fn run_ac(&self, run: &Run<'_>) -> TierOutcome<AcScore> {
		if run.ac_disabled {
			return TierOutcome::Skipped("every AC tier threshold is unreachable".to_string());
		}

		let started = Instant::now();
		let adapter = AcAdapter::new(&self.store, &self.cfg.search)
			.with_language(run.language)
			.with_query_tokens(run.req.tokens.clone());
		let opts = &run.req.opts;

		match adapter.search(&run.candidates, opts.entity_type.as_deref(), opts).await {
			Ok(hits) => TierOutcome::Done { hits, elapsed_ms: elapsed_ms(started) },
			Err(error) => TierOutcome::Failed { error, elapsed_ms: elapsed_ms(started) },
		}
	}

	/// Runs the vector stage. When `required`, a missing query vector is a failure.
	async fn run_vector(
		&self,
		run: &Run<'_>,
		required: bool,
	) -> (TierOutcome<VectorHit>, QueryVectorSource) {
		let started = Instant::now();
		let (query_vector, source) = match self.resolve_query_vector(run).await {
			Ok(Some(found)) => found,
			Ok(None) if required => {
				let error = Error::InvalidRequest {
					message: "Vector search requires a query vector.".to_string(),
				};

				return (
					TierOutcome::Failed { error, elapsed_ms: elapsed_ms(started) },
					QueryVectorSource::None,
				);
			},
			Ok(None) => {
				return (
					TierOutcome::Skipped("no query vector available".to_string()),
					QueryVectorSource::None,
				);
			},
			Err(error) =>
				return (
					TierOutcome::Failed { error, elapsed_ms: elapsed_ms(started) },
					QueryVectorSource::Provider,
				),
		};
		let opts = &run.req.opts;
		let adapter = VectorAdapter::new(&self.store, &self.cfg.search);
		let outcome = match adapter.search(&query_vector, opts.entity_type.as_deref(), opts).await {
			Ok(hits) => TierOutcome::Done { hits, elapsed_ms: elapsed_ms(started) },
			Err(error) => TierOutcome::Failed { error, elapsed_ms: elapsed_ms(started) },
		};

		(outcome, source)
	}

	async fn resolve_query_vector(
		&self,
		run: &Run<'_>,
	) -> Result<Option<(Vec<f32>, QueryVectorSource)>> {
		if let Some(vector) = run.req.query_vector.clone() {
			return Ok(Some((vector, QueryVectorSource::Request)));
		}

		let Some(cfg) = self.cfg.providers.embedding.as_ref() else {
			return Ok(None);
		};
		let texts = vec![run.query.clone()];
		let vectors = self.providers.embedding.embed(cfg, &texts).await?;

		Ok(vectors.into_iter().next().map(|vector| (vector, QueryVectorSource::Provider)))
	}
}

fn elapsed_ms(started: Instant) -> u64 {
	u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
