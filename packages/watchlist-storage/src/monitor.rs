use std::{
	collections::{BTreeMap, VecDeque},
	sync::Mutex,
	time::Duration,
};

use serde::Serialize;

#[derive(Clone, Debug)]
pub struct MonitorSettings {
	pub window_size: usize,
	pub min_samples: usize,
	pub p95_warn_ms: f64,
	pub p95_critical_ms: f64,
	pub error_rate_warn: f64,
	pub error_rate_critical: f64,
}
impl MonitorSettings {
	pub fn from_config(cfg: &watchlist_config::Monitoring) -> Self {
		Self {
			window_size: cfg.window_size.max(1),
			min_samples: cfg.min_samples,
			p95_warn_ms: cfg.p95_warn_ms,
			p95_critical_ms: cfg.p95_critical_ms,
			error_rate_warn: cfg.error_rate_warn,
			error_rate_critical: cfg.error_rate_critical,
		}
	}
}
impl Default for MonitorSettings {
	fn default() -> Self {
		Self::from_config(&watchlist_config::Monitoring::default())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
	Warning,
	Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
	P95Latency,
	ErrorRate,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
	pub operation: String,
	pub kind: AlertKind,
	pub level: AlertLevel,
	pub value: f64,
	pub threshold: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationSnapshot {
	pub operation: String,
	pub requests: u64,
	pub errors: u64,
	pub error_rate: f64,
	pub window_len: usize,
	pub p50_ms: f64,
	pub p95_ms: f64,
	pub p99_ms: f64,
}

#[derive(Debug, Default)]
struct OperationStats {
	latencies_ms: VecDeque<f64>,
	requests: u64,
	errors: u64,
	/// Level each alert kind was last raised at, cleared once the value recovers.
	raised: BTreeMap<AlertKind, AlertLevel>,
}

/// Latency and error accounting per operation name with threshold alerts.
///
/// Components receive an `Arc<Monitor>` explicitly. Recording logs a warning whenever an
/// operation crosses into a higher alert level.
#[derive(Debug)]
pub struct Monitor {
	settings: MonitorSettings,
	operations: Mutex<BTreeMap<String, OperationStats>>,
}
impl Monitor {
	pub fn new(settings: MonitorSettings) -> Self {
		Self { settings, operations: Mutex::new(BTreeMap::new()) }
	}

	pub fn settings(&self) -> &MonitorSettings {
		&self.settings
	}

	pub fn record(&self, operation: &str, elapsed: Duration, ok: bool) {
		for alert in self.observe(operation, elapsed, ok) {
			tracing::warn!(
				operation = %alert.operation,
				kind = ?alert.kind,
				level = ?alert.level,
				value = alert.value,
				threshold = alert.threshold,
				"Operation crossed a monitoring threshold."
			);
		}
	}

	/// Records one sample and returns the alerts it newly raised or escalated.
	fn observe(&self, operation: &str, elapsed: Duration, ok: bool) -> Vec<Alert> {
		let mut operations = self.operations.lock().unwrap_or_else(|err| err.into_inner());
		let stats = operations.entry(operation.to_string()).or_default();

		stats.requests += 1;

		if !ok {
			stats.errors += 1;
		}

		stats.latencies_ms.push_back(elapsed.as_secs_f64() * 1_000.0);

		while stats.latencies_ms.len() > self.settings.window_size {
			stats.latencies_ms.pop_front();
		}

		let current = alerts_for(&snapshot_of(operation, stats), &self.settings);
		let mut crossed = Vec::new();

		stats.raised.retain(|kind, _| current.iter().any(|alert| alert.kind == *kind));

		for alert in current {
			if stats.raised.get(&alert.kind).is_none_or(|level| *level < alert.level) {
				stats.raised.insert(alert.kind, alert.level);
				crossed.push(alert);
			}
		}

		crossed
	}

	pub fn snapshot(&self, operation: &str) -> Option<OperationSnapshot> {
		let operations = self.operations.lock().unwrap_or_else(|err| err.into_inner());

		operations.get(operation).map(|stats| snapshot_of(operation, stats))
	}

	pub fn snapshots(&self) -> Vec<OperationSnapshot> {
		let operations = self.operations.lock().unwrap_or_else(|err| err.into_inner());

		operations.iter().map(|(name, stats)| snapshot_of(name, stats)).collect()
	}

	/// Alerts for every operation with at least `min_samples` requests.
	pub fn alerts(&self) -> Vec<Alert> {
		self.snapshots().iter().flat_map(|snapshot| alerts_for(snapshot, &self.settings)).collect()
	}

	pub fn reset(&self) {
		self.operations.lock().unwrap_or_else(|err| err.into_inner()).clear();
	}
}
impl Default for Monitor {
	fn default() -> Self {
		Self::new(MonitorSettings::default())
	}
}

/// Nearest-rank percentile over an unsorted sample. Empty input yields zero.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let mut sorted = values.to_vec();

	sorted.sort_by(|a, b| a.total_cmp(b));

	let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;

	sorted[rank.clamp(1, sorted.len()) - 1]
}

fn snapshot_of(operation: &str, stats: &OperationStats) -> OperationSnapshot {
	let window: Vec<f64> = stats.latencies_ms.iter().copied().collect();
	let error_rate =
		if stats.requests == 0 { 0.0 } else { stats.errors as f64 / stats.requests as f64 };

	OperationSnapshot {
		operation: operation.to_string(),
		requests: stats.requests,
		errors: stats.errors,
		error_rate,
		window_len: window.len(),
		p50_ms: percentile(&window, 50.0),
		p95_ms: percentile(&window, 95.0),
		p99_ms: percentile(&window, 99.0),
	}
}

fn alerts_for(snapshot: &OperationSnapshot, settings: &MonitorSettings) -> Vec<Alert> {
	if (snapshot.requests as usize) < settings.min_samples {
		return Vec::new();
	}

	let mut out = Vec::new();

	if let Some((level, threshold)) =
		level_for(snapshot.p95_ms, settings.p95_warn_ms, settings.p95_critical_ms)
	{
		out.push(Alert {
			operation: snapshot.operation.clone(),
			kind: AlertKind::P95Latency,
			level,
			value: snapshot.p95_ms,
			threshold,
		});
	}
	if let Some((level, threshold)) =
		level_for(snapshot.error_rate, settings.error_rate_warn, settings.error_rate_critical)
	{
		out.push(Alert {
			operation: snapshot.operation.clone(),
			kind: AlertKind::ErrorRate,
			level,
			value: snapshot.error_rate,
			threshold,
		});
	}

	out
}

fn level_for(value: f64, warn: f64, critical: f64) -> Option<(AlertLevel, f64)> {
	if value > critical {
		Some((AlertLevel::Critical, critical))
	} else if value > warn {
		Some((AlertLevel::Warning, warn))
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn settings(min_samples: usize) -> MonitorSettings {
		MonitorSettings { window_size: 100, min_samples, ..MonitorSettings::default() }
	}

	#[test]
	fn nearest_rank_percentiles() {
		let values: Vec<f64> = (1..=100).map(f64::from).collect();

		assert_eq!(percentile(&values, 50.0), 50.0);
		assert_eq!(percentile(&values, 95.0), 95.0);
		assert_eq!(percentile(&values, 99.0), 99.0);
		assert_eq!(percentile(&[7.0], 99.0), 7.0);
		assert_eq!(percentile(&[], 50.0), 0.0);
	}

	#[test]
	fn window_slides() {
		let monitor = Monitor::new(MonitorSettings { window_size: 3, ..settings(0) });

		for ms in [100, 1, 2, 3] {
			monitor.record("search", Duration::from_millis(ms), true);
		}

		let snapshot = monitor.snapshot("search").expect("Expected search stats.");

		assert_eq!(snapshot.requests, 4);
		assert_eq!(snapshot.window_len, 3);
		assert_eq!(snapshot.p99_ms, 3.0);
	}

	#[test]
	fn slow_p95_raises_warning_only_after_min_samples() {
		let monitor = Monitor::new(settings(5));

		for _ in 0..4 {
			monitor.record("search", Duration::from_millis(300), true);
		}

		assert!(monitor.alerts().is_empty());

		monitor.record("search", Duration::from_millis(300), true);

		let alerts = monitor.alerts();

		assert_eq!(alerts.len(), 1);
		assert_eq!(alerts[0].kind, AlertKind::P95Latency);
		assert_eq!(alerts[0].level, AlertLevel::Warning);
	}

	#[test]
	fn error_rate_goes_critical() {
		let monitor = Monitor::new(settings(1));

		monitor.record("search", Duration::from_millis(1), false);
		monitor.record("search", Duration::from_millis(1), true);

		let alerts = monitor.alerts();

		assert!(alerts.iter().any(|alert| alert.kind == AlertKind::ErrorRate
			&& alert.level == AlertLevel::Critical));
	}

	#[test]
	fn recording_reports_each_crossing_once() {
		let monitor = Monitor::new(settings(3));
		let mut crossed = Vec::new();

		for _ in 0..6 {
			crossed.extend(monitor.observe("search_hybrid", Duration::from_millis(350), true));
		}

		assert_eq!(crossed.len(), 1);
		assert_eq!(crossed[0].operation, "search_hybrid");
		assert_eq!(crossed[0].kind, AlertKind::P95Latency);
		assert_eq!(crossed[0].level, AlertLevel::Warning);

		for _ in 0..20 {
			crossed.extend(monitor.observe("search_hybrid", Duration::from_millis(5_000), true));
		}

		assert_eq!(crossed.len(), 2);
		assert_eq!(crossed[1].level, AlertLevel::Critical);
		assert_eq!(monitor.alerts().len(), 1);
	}

	#[test]
	fn recovered_operation_can_alert_again() {
		let monitor = Monitor::new(MonitorSettings { window_size: 2, ..settings(1) });

		assert_eq!(monitor.observe("ac_search", Duration::from_millis(400), true).len(), 1);
		assert!(monitor.observe("ac_search", Duration::from_millis(1), true).is_empty());

		for _ in 0..2 {
			monitor.record("ac_search", Duration::from_millis(1), true);
		}

		assert!(monitor.alerts().is_empty());
		assert_eq!(monitor.observe("ac_search", Duration::from_millis(400), true).len(), 1);
	}

	#[test]
	fn reset_clears_everything() {
		let monitor = Monitor::new(settings(0));

		monitor.record("health", Duration::from_millis(1), true);
		monitor.reset();

		assert!(monitor.snapshots().is_empty());
	}
}
