use std::{
	env,
	sync::Arc,
	time::{Duration, Instant},
};

use serde_json::Value;

use crate::{
	BreakerArena, ClientSettings, DeploymentContext, Error, HealthCache, HealthReport, HttpRequest,
	HttpResponse, Method, Monitor, OpCategory, Permit, ReqwestTransport, Result, RetryPolicy,
	Transport, health, hosts,
};

/// Per-category request timeouts.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
	pub health: Duration,
	pub search: Duration,
	pub index: Duration,
}
impl Timeouts {
	pub fn from_config(cfg: &watchlist_config::StorageTimeouts) -> Self {
		Self {
			health: Duration::from_millis(cfg.health_ms),
			search: Duration::from_millis(cfg.search_ms),
			index: Duration::from_millis(cfg.index_ms),
		}
	}

	pub fn for_category(&self, category: OpCategory) -> Duration {
		match category {
			OpCategory::Health => self.health,
			OpCategory::Search => self.search,
			OpCategory::Index => self.index,
		}
	}
}

/// Document-store client with host failover, per-host circuit breakers and retries.
pub struct DocumentStore {
	cfg: watchlist_config::Storage,
	transport: Arc<dyn Transport>,
	breakers: BreakerArena,
	retry: RetryPolicy,
	timeouts: Timeouts,
	monitor: Arc<Monitor>,
	health: HealthCache,
}
impl DocumentStore {
	/// Resolves hosts from config, environment and deployment context, then builds an HTTP client.
	pub fn connect(cfg: &watchlist_config::Config, monitor: Arc<Monitor>) -> Result<Self> {
		let settings = ClientSettings::from_config(&cfg.storage)?;
		let hosts = hosts::resolve_hosts(
			&cfg.storage,
			|name| env::var(name).ok(),
			&DeploymentContext::detect(),
		);

		tracing::info!(hosts = ?hosts, "Resolved document store hosts.");

		Ok(Self::with_transport(cfg, hosts, Arc::new(ReqwestTransport::new(settings)), monitor))
	}

	pub fn with_transport(
		cfg: &watchlist_config::Config,
		hosts: Vec<String>,
		transport: Arc<dyn Transport>,
		monitor: Arc<Monitor>,
	) -> Self {
		let resilience = &cfg.resilience;

		Self {
			cfg: cfg.storage.clone(),
			transport,
			breakers: BreakerArena::new(
				hosts,
				resilience.failure_threshold,
				Duration::from_millis(resilience.cooldown_ms),
			),
			retry: RetryPolicy::from_config(resilience),
			timeouts: Timeouts::from_config(&cfg.storage.timeouts),
			monitor,
			health: HealthCache::new(Duration::from_millis(resilience.health_ttl_ms)),
		}
	}

	pub fn hosts(&self) -> &[String] {
		self.breakers.hosts()
	}

	pub fn storage_config(&self) -> &watchlist_config::Storage {
		&self.cfg
	}

	pub fn breakers(&self) -> &BreakerArena {
		&self.breakers
	}

	pub fn monitor(&self) -> &Arc<Monitor> {
		&self.monitor
	}

	pub fn timeouts(&self) -> Timeouts {
		self.timeouts
	}

	/// Sends a request, failing over across hosts.
	///
	/// Connectivity failures and 5xx responses count against the host's breaker and are retried
	/// on the next admitting host after a jittered backoff. Any other response, 4xx included, is
	/// returned as is.
	pub async fn request(
		&self,
		category: OpCategory,
		method: Method,
		path: &str,
		body: Option<Value>,
	) -> Result<HttpResponse> {
		let started = Instant::now();
		let timeout = self.timeouts.for_category(category);
		let max_attempts = self.retry.max_attempts();
		let mut cursor = None;
		let mut attempts = 0;
		let mut last_error = None;

		while attempts < max_attempts {
			let Some(permit) = self.next_host(cursor) else {
				break;
			};
			let index = permit.index();

			cursor = Some(index);
			attempts += 1;

			let host = &self.hosts()[index];
			let request = HttpRequest {
				host: host.clone(),
				method,
				path: path.to_string(),
				body: body.clone(),
				category,
				timeout,
			};
			let err = match self.transport.send(request).await {
				Ok(response) if response.status < 500 => {
					permit.succeed();
					self.monitor.record(category.as_str(), started.elapsed(), true);

					return Ok(response);
				},
				Ok(response) =>
					Error::Status { status: response.status, message: response.error_reason() },
				Err(err) if err.is_retryable() => err,
				Err(err) => {
					// The host answered, so the breaker stays closed.
					permit.succeed();
					self.monitor.record(category.as_str(), started.elapsed(), false);

					return Err(err);
				},
			};

			permit.fail();

			tracing::warn!(
				host = %host,
				attempt = attempts,
				error = %err,
				"Document store request failed."
			);

			last_error = Some(err);

			if attempts < max_attempts {
				tokio::time::sleep(self.retry.backoff_for_attempt(attempts - 1)).await;
			}
		}

		self.monitor.record(category.as_str(), started.elapsed(), false);

		match last_error {
			Some(last) => Err(Error::RetriesExhausted { attempts, last: Box::new(last) }),
			None => Err(Error::NoHealthyHosts),
		}
	}

	/// Runs a search body against `index` and returns the raw response.
	pub async fn search(&self, index: &str, body: Value) -> Result<Value> {
		let response = self
			.request(OpCategory::Search, Method::Post, &format!("/{index}/_search"), Some(body))
			.await?;

		if response.is_success() {
			Ok(response.body)
		} else {
			Err(Error::Status { status: response.status, message: response.error_reason() })
		}
	}

	/// Cluster health across all hosts, cached for the configured TTL.
	pub async fn cluster_health(&self) -> HealthReport {
		let states: Vec<_> =
			(0..self.hosts().len()).map(|index| self.breakers.state(index)).collect();

		self.health
			.get_or_probe(|| {
				health::probe_hosts(
					self.transport.clone(),
					self.hosts(),
					&states,
					self.timeouts.health,
				)
			})
			.await
	}

	pub async fn invalidate_health(&self) {
		self.health.invalidate().await;
	}

	/// First host after `cursor`, wrapping around, whose breaker admits a request.
	fn next_host(&self, cursor: Option<usize>) -> Option<Permit<'_>> {
		let count = self.hosts().len();
		let start = cursor.map(|index| index + 1).unwrap_or(0);

		(0..count)
			.map(|offset| (start + offset) % count)
			.find_map(|index| self.breakers.try_acquire(index))
	}
}
