//! Injectable time sources.
//!
//! Business hours are evaluated against local wall-clock time, while TTLs
//! and timeouts are measured on a monotonic clock. Both come from the same
//! [`Clock`] so tests can drive them together.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;

/// Time source for hours evaluation and bootstrap bookkeeping.
pub trait Clock: Send + Sync + fmt::Debug {
	/// Local wall-clock time of the evaluating environment.
	fn now(&self) -> NaiveDateTime;

	/// Monotonic instant for elapsed/timeout comparisons.
	fn monotonic_now(&self) -> Instant;
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> NaiveDateTime {
		Local::now().naive_local()
	}

	fn monotonic_now(&self) -> Instant {
		Instant::now()
	}
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
	state: Mutex<(NaiveDateTime, Instant)>,
}

impl ManualClock {
	pub fn new(wall: NaiveDateTime) -> Self {
		Self {
			state: Mutex::new((wall, Instant::now())),
		}
	}

	/// Moves both the wall clock and the monotonic clock forward.
	pub fn advance(&self, by: Duration) {
		let mut state = self.state.lock();
		state.0 += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
		state.1 += by;
	}

	/// Jumps the wall clock without touching monotonic time.
	pub fn set_wall(&self, wall: NaiveDateTime) {
		self.state.lock().0 = wall;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> NaiveDateTime {
		self.state.lock().0
	}

	fn monotonic_now(&self) -> Instant {
		self.state.lock().1
	}
}
