use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tokio::{sync::Mutex, task::JoinSet};

use crate::{
	breaker::BreakerState,
	transport::{HttpRequest, Method, OpCategory, Transport},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
	Healthy,
	Degraded,
	Unreachable,
}

#[derive(Clone, Debug, Serialize)]
pub struct HostHealth {
	pub host: String,
	pub reachable: bool,
	/// Cluster color reported by the host (`green`, `yellow`, `red`).
	pub color: Option<String>,
	pub breaker: BreakerState,
	pub latency_ms: u64,
	pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
	pub status: ClusterStatus,
	pub hosts: Vec<HostHealth>,
	/// Age of the report when it was handed out.
	pub age_ms: u64,
	pub cached: bool,
}

/// Health report memoized for a fixed TTL.
#[derive(Debug)]
pub struct HealthCache {
	ttl: Duration,
	slot: Mutex<Option<(Instant, HealthReport)>>,
}
impl HealthCache {
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, slot: Mutex::new(None) }
	}

	/// Returns the cached report when fresh, otherwise runs `probe` and caches its result.
	pub async fn get_or_probe<F, Fut>(&self, probe: F) -> HealthReport
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = HealthReport>,
	{
		let mut slot = self.slot.lock().await;

		if let Some((at, report)) = slot.as_ref()
			&& at.elapsed() < self.ttl
		{
			let mut report = report.clone();

			report.age_ms = at.elapsed().as_millis() as u64;
			report.cached = true;

			return report;
		}

		let report = probe().await;

		*slot = Some((Instant::now(), report.clone()));

		report
	}

	pub async fn invalidate(&self) {
		*self.slot.lock().await = None;
	}
}

/// Probes every host concurrently and joins the results back in host order.
pub async fn probe_hosts(
	transport: Arc<dyn Transport>,
	hosts: &[String],
	breakers: &[BreakerState],
	timeout: Duration,
) -> HealthReport {
	let mut tasks = JoinSet::new();

	for (index, host) in hosts.iter().enumerate() {
		let transport = transport.clone();
		let request = HttpRequest {
			host: host.clone(),
			method: Method::Get,
			path: "/_cluster/health".to_string(),
			body: None,
			category: OpCategory::Health,
			timeout,
		};

		tasks.spawn(async move {
			let started = Instant::now();
			let result = transport.send(request).await;

			(index, started.elapsed(), result)
		});
	}

	let mut probes = Vec::with_capacity(hosts.len());

	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok(probe) => probes.push(probe),
			Err(err) => tracing::warn!(error = %err, "Health probe task failed."),
		}
	}

	probes.sort_by_key(|(index, _, _)| *index);

	let mut out: Vec<HostHealth> = hosts
		.iter()
		.enumerate()
		.map(|(index, host)| HostHealth {
			host: host.clone(),
			reachable: false,
			color: None,
			breaker: breakers.get(index).copied().unwrap_or(BreakerState::Closed),
			latency_ms: 0,
			error: Some("Probe did not complete.".to_string()),
		})
		.collect();

	for (index, elapsed, result) in probes {
		let entry = &mut out[index];

		entry.latency_ms = elapsed.as_millis() as u64;

		match result {
			Ok(response) if response.is_success() => {
				entry.reachable = true;
				entry.color =
					response.body.get("status").and_then(Value::as_str).map(str::to_string);
				entry.error = None;
			},
			Ok(response) => {
				entry.reachable = true;
				entry.error = Some(response.error_reason());
			},
			Err(err) => entry.error = Some(err.to_string()),
		}
	}

	HealthReport { status: aggregate(&out), hosts: out, age_ms: 0, cached: false }
}

/// Healthy only when every host answers green with a closed breaker.
pub fn aggregate(hosts: &[HostHealth]) -> ClusterStatus {
	if hosts.is_empty() || hosts.iter().all(|host| !host.reachable) {
		return ClusterStatus::Unreachable;
	}

	let all_good = hosts.iter().all(|host| {
		host.reachable && host.color.as_deref() == Some("green") && host.breaker == BreakerState::Closed
	});

	if all_good { ClusterStatus::Healthy } else { ClusterStatus::Degraded }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn host(reachable: bool, color: Option<&str>, breaker: BreakerState) -> HostHealth {
		HostHealth {
			host: "http://h:9200".to_string(),
			reachable,
			color: color.map(str::to_string),
			breaker,
			latency_ms: 1,
			error: None,
		}
	}

	#[test]
	fn all_green_is_healthy() {
		let hosts = vec![host(true, Some("green"), BreakerState::Closed); 2];

		assert_eq!(aggregate(&hosts), ClusterStatus::Healthy);
	}

	#[test]
	fn yellow_or_open_breaker_degrades() {
		assert_eq!(
			aggregate(&[host(true, Some("yellow"), BreakerState::Closed)]),
			ClusterStatus::Degraded
		);
		assert_eq!(
			aggregate(&[
				host(true, Some("green"), BreakerState::Closed),
				host(true, Some("green"), BreakerState::Open),
			]),
			ClusterStatus::Degraded
		);
	}

	#[test]
	fn nothing_reachable_is_unreachable() {
		assert_eq!(aggregate(&[host(false, None, BreakerState::Open)]), ClusterStatus::Unreachable);
		assert_eq!(aggregate(&[]), ClusterStatus::Unreachable);
	}

	#[tokio::test]
	async fn cache_reuses_report_within_ttl() {
		let cache = HealthCache::new(Duration::from_secs(30));
		let first = cache
			.get_or_probe(|| async {
				HealthReport { status: ClusterStatus::Healthy, hosts: Vec::new(), age_ms: 0, cached: false }
			})
			.await;
		let second = cache
			.get_or_probe(|| async {
				HealthReport {
					status: ClusterStatus::Unreachable,
					hosts: Vec::new(),
					age_ms: 0,
					cached: false,
				}
			})
			.await;

		assert!(!first.cached);
		assert!(second.cached);
		assert_eq!(second.status, ClusterStatus::Healthy);

		cache.invalidate().await;

		let third = cache
			.get_or_probe(|| async {
				HealthReport {
					status: ClusterStatus::Unreachable,
					hosts: Vec::new(),
					age_ms: 0,
					cached: false,
				}
			})
			.await;

		assert_eq!(third.status, ClusterStatus::Unreachable);
	}
}
