pub mod info;
pub mod search;
pub mod trace;
pub mod types;

mod error;

pub use error::{Error, Result};
pub use info::SearchInfo;
pub use trace::{
	IssueCategory, SearchTrace, SearchTraceValidator, Severity, StepKind, TraceStep,
	ValidationIssue, ValidationReport, ValidatorSettings,
};
pub use types::{
	AcScore, AcType, Candidate, CandidateFeatures, EntityRecord, QueryVectorSource, SearchMetadata,
	SearchMode, SearchOpts, SearchRequest, SearchResult, SearchType, VectorHit,
};

use std::{future::Future, pin::Pin, sync::Arc};

use watchlist_config::{Config, EmbeddingProviderConfig};
use watchlist_providers::embedding;
use watchlist_storage::DocumentStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, watchlist_providers::Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

/// Hybrid AC and vector screening search over one document store.
pub struct SearchService {
	pub cfg: Config,
	pub store: Arc<DocumentStore>,
	pub providers: Providers,
}
impl SearchService {
	pub fn new(cfg: Config, store: Arc<DocumentStore>) -> Self {
		Self { cfg, store, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, store: Arc<DocumentStore>, providers: Providers) -> Self {
		Self { cfg, store, providers }
	}

	/// Default options for this service's configuration.
	pub fn default_opts(&self) -> SearchOpts {
		SearchOpts::from_config(&self.cfg.search)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, watchlist_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
