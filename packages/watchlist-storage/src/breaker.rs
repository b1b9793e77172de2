//! Per-host circuit breakers.
//!
//! ```text
//!   Closed ──(failure_threshold consecutive failures)──> Open
//!   Open ──(cooldown elapsed)──> HalfOpen (one probe admitted)
//!   HalfOpen ──(probe succeeds)──> Closed
//!   HalfOpen ──(probe fails)──> Open
//! ```
//!
//! State lives in an arena of atomics indexed by host position. Reads never lock; a stale read
//! only affects which host gets tried next.
//!
//! Admission hands out a [`Permit`]. A permit holding the half-open slot frees it on drop, so a
//! request that is cancelled before it settles does not lock the host out.

use std::{
	sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
	time::{Duration, Instant},
};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Clone, Debug, Serialize)]
pub struct HostBreakerSnapshot {
	pub host: String,
	pub state: BreakerState,
	pub consecutive_failures: u32,
	pub trips: u64,
}

#[derive(Debug, Default)]
struct HostBreaker {
	consecutive_failures: AtomicU32,
	/// Milliseconds since the arena epoch. Zero means closed.
	open_until_ms: AtomicU64,
	probing: AtomicBool,
	trips: AtomicU64,
}

#[derive(Debug)]
pub struct BreakerArena {
	hosts: Vec<String>,
	breakers: Vec<HostBreaker>,
	failure_threshold: u32,
	cooldown: Duration,
	epoch: Instant,
}
impl BreakerArena {
	pub fn new(hosts: Vec<String>, failure_threshold: u32, cooldown: Duration) -> Self {
		let breakers = hosts.iter().map(|_| HostBreaker::default()).collect();

		Self {
			hosts,
			breakers,
			failure_threshold: failure_threshold.max(1),
			cooldown,
			epoch: Instant::now(),
		}
	}

	pub fn hosts(&self) -> &[String] {
		&self.hosts
	}

	pub fn state(&self, index: usize) -> BreakerState {
		let Some(breaker) = self.breakers.get(index) else {
			return BreakerState::Open;
		};
		let open_until = breaker.open_until_ms.load(Ordering::Acquire);

		if open_until == 0 {
			BreakerState::Closed
		} else if self.now_ms() >= open_until {
			BreakerState::HalfOpen
		} else {
			BreakerState::Open
		}
	}

	/// Admits a request to this host, claiming the single half-open slot when needed.
	pub fn try_acquire(&self, index: usize) -> Option<Permit<'_>> {
		let breaker = self.breakers.get(index)?;
		let half_open = match self.state(index) {
			BreakerState::Closed => false,
			BreakerState::Open => return None,
			BreakerState::HalfOpen => {
				breaker
					.probing
					.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
					.ok()?;

				true
			},
		};

		Some(Permit { arena: self, index, half_open, settled: false })
	}

	/// Hosts currently admitting traffic, in configured order. Does not claim probe slots.
	pub fn available(&self) -> Vec<usize> {
		(0..self.breakers.len())
			.filter(|index| match self.state(*index) {
				BreakerState::Closed => true,
				BreakerState::HalfOpen => !self.breakers[*index].probing.load(Ordering::Acquire),
				BreakerState::Open => false,
			})
			.collect()
	}

	pub fn record_success(&self, index: usize) {
		let Some(breaker) = self.breakers.get(index) else {
			return;
		};

		breaker.consecutive_failures.store(0, Ordering::Release);
		breaker.open_until_ms.store(0, Ordering::Release);
		breaker.probing.store(false, Ordering::Release);
	}

	/// Counts a failure. Returns true when this failure opened the breaker.
	pub fn record_failure(&self, index: usize) -> bool {
		let Some(breaker) = self.breakers.get(index) else {
			return false;
		};
		let was_probe = breaker.probing.swap(false, Ordering::AcqRel);
		let failures =
			breaker.consecutive_failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);

		if was_probe || failures >= self.failure_threshold {
			let reopen_at = self.now_ms().saturating_add(self.cooldown.as_millis() as u64).max(1);
			let previous = breaker.open_until_ms.swap(reopen_at, Ordering::AcqRel);
			let opened = previous == 0 || was_probe;

			if opened {
				breaker.trips.fetch_add(1, Ordering::Relaxed);

				tracing::warn!(
					host = %self.hosts[index],
					failures,
					cooldown_ms = self.cooldown.as_millis() as u64,
					"Circuit breaker opened for host."
				);
			}

			return opened;
		}

		false
	}

	pub fn snapshot(&self) -> Vec<HostBreakerSnapshot> {
		self.hosts
			.iter()
			.enumerate()
			.map(|(index, host)| HostBreakerSnapshot {
				host: host.clone(),
				state: self.state(index),
				consecutive_failures: self.breakers[index]
					.consecutive_failures
					.load(Ordering::Acquire),
				trips: self.breakers[index].trips.load(Ordering::Relaxed),
			})
			.collect()
	}

	pub fn reset(&self) {
		for index in 0..self.breakers.len() {
			self.record_success(index);
		}
	}

	fn now_ms(&self) -> u64 {
		// Offset by one so that zero stays reserved for "closed".
		self.epoch.elapsed().as_millis() as u64 + 1
	}
}

/// Admission to one host, settled with [`Permit::succeed`] or [`Permit::fail`].
#[derive(Debug)]
pub struct Permit<'a> {
	arena: &'a BreakerArena,
	index: usize,
	half_open: bool,
	settled: bool,
}
impl Permit<'_> {
	pub fn index(&self) -> usize {
		self.index
	}

	pub fn succeed(mut self) {
		self.settled = true;
		self.arena.record_success(self.index);
	}

	/// Returns true when this failure opened the breaker.
	pub fn fail(mut self) -> bool {
		self.settled = true;

		self.arena.record_failure(self.index)
	}
}
impl Drop for Permit<'_> {
	fn drop(&mut self) {
		if self.half_open && !self.settled {
			self.arena.breakers[self.index].probing.store(false, Ordering::Release);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::thread;

	use super::*;

	fn arena(cooldown_ms: u64) -> BreakerArena {
		BreakerArena::new(
			vec!["http://h:9200".to_string(), "http://g:9200".to_string()],
			3,
			Duration::from_millis(cooldown_ms),
		)
	}

	#[test]
	fn opens_after_threshold_consecutive_failures() {
		let arena = arena(30_000);

		assert!(!arena.record_failure(0));
		assert!(!arena.record_failure(0));
		assert!(arena.record_failure(0));
		assert_eq!(arena.state(0), BreakerState::Open);
		assert!(arena.try_acquire(0).is_none());
		assert_eq!(arena.available(), vec![1]);
	}

	#[test]
	fn success_resets_the_failure_count() {
		let arena = arena(30_000);

		arena.record_failure(0);
		arena.record_failure(0);
		arena.record_success(0);
		arena.record_failure(0);

		assert_eq!(arena.state(0), BreakerState::Closed);
	}

	#[test]
	fn half_open_admits_one_probe() {
		let arena = arena(5);

		for _ in 0..3 {
			arena.record_failure(0);
		}

		thread::sleep(Duration::from_millis(20));

		assert_eq!(arena.state(0), BreakerState::HalfOpen);

		let permit = arena.try_acquire(0).expect("Expected the half-open slot.");

		assert!(arena.try_acquire(0).is_none());

		permit.succeed();

		assert_eq!(arena.state(0), BreakerState::Closed);
	}

	#[test]
	fn dropped_half_open_permit_frees_the_slot() {
		let arena = arena(5);

		for _ in 0..3 {
			arena.record_failure(0);
		}

		thread::sleep(Duration::from_millis(20));

		let permit = arena.try_acquire(0).expect("Expected the half-open slot.");

		assert!(!arena.available().contains(&0));

		drop(permit);

		assert_eq!(arena.state(0), BreakerState::HalfOpen);
		assert!(arena.available().contains(&0));
		assert!(arena.try_acquire(0).is_some());
	}

	#[test]
	fn dropped_closed_permit_changes_nothing() {
		let arena = arena(30_000);

		arena.record_failure(0);
		drop(arena.try_acquire(0));

		assert_eq!(arena.state(0), BreakerState::Closed);
		assert_eq!(arena.snapshot()[0].consecutive_failures, 1);
	}

	#[test]
	fn failed_probe_reopens() {
		let arena = arena(5);

		for _ in 0..3 {
			arena.record_failure(0);
		}

		thread::sleep(Duration::from_millis(20));

		let permit = arena.try_acquire(0).expect("Expected the half-open slot.");

		assert!(permit.fail());
		assert_eq!(arena.state(0), BreakerState::Open);
		assert_eq!(arena.snapshot()[0].trips, 2);
	}

	#[test]
	fn unknown_index_is_never_available() {
		let arena = arena(5);

		assert!(arena.try_acquire(9).is_none());
		assert_eq!(arena.state(9), BreakerState::Open);
	}
}
