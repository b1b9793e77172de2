use std::time::Duration;

use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
	pub jitter_ratio: f32,
}
impl RetryPolicy {
	pub fn from_config(cfg: &watchlist_config::Resilience) -> Self {
		Self {
			max_retries: cfg.max_retries,
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
			jitter_ratio: cfg.jitter_ratio.clamp(0.0, 1.0),
		}
	}

	/// Total attempts including the first one.
	pub fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}

	/// Delay before retry number `attempt` (zero-based), jittered within `±jitter_ratio`.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		self.backoff_with_unit(attempt, jitter_unit())
	}

	/// Deterministic form of [`Self::backoff_for_attempt`]. `unit` is expected in `[-1, 1]`.
	pub fn backoff_with_unit(&self, attempt: u32, unit: f64) -> Duration {
		let exp = attempt.min(16);
		let base = self.base_backoff.as_millis() as u64;
		let capped = base.saturating_mul(1_u64 << exp).min(self.max_backoff.as_millis() as u64);
		let jitter = capped as f64 * self.jitter_ratio as f64 * unit.clamp(-1.0, 1.0);
		let millis = (capped as f64 + jitter).max(0.0).round() as u64;

		Duration::from_millis(millis)
	}
}

fn jitter_unit() -> f64 {
	// The low 53 bits of a v4 UUID are fully random.
	let bits = (Uuid::new_v4().as_u128() as u64) & ((1_u64 << 53) - 1);
	let unit = bits as f64 / (1_u64 << 53) as f64;

	unit * 2.0 - 1.0
}
