// Fixed-window rate limiting
//
// Each opaque key (e.g. "tools:<client ip>" or "tools:<user id>") owns one
// counter that resets when its window expires. Windows are fixed, not sliding:
// a caller can land up to 2x max_requests across a window boundary.
//
// State lives in a single mutex-guarded map so the read-modify-write on an
// entry is atomic for concurrent callers sharing a key. Expired entries stay
// until `cleanup` runs; the gateway maintenance task calls it periodically.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Window length and quota applied to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
	/// Window length in milliseconds
	pub window_ms: u64,

	/// Maximum allowed actions per window
	pub max_requests: u32,
}

impl RateLimitConfig {
	pub const fn new(window_ms: u64, max_requests: u32) -> Self {
		Self {
			window_ms,
			max_requests,
		}
	}

	/// 10 session creations per hour per caller
	pub const fn session_creation() -> Self {
		Self::new(60 * 60 * 1000, 10)
	}

	/// 30 tool calls per minute per caller
	pub const fn tool_calls() -> Self {
		Self::new(60 * 1000, 30)
	}

	/// 100 API requests per 15 minutes per caller
	pub const fn api() -> Self {
		Self::new(15 * 60 * 1000, 100)
	}

	pub fn window(&self) -> Duration {
		Duration::from_millis(self.window_ms)
	}
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self::tool_calls()
	}
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
	pub allowed: bool,
	pub limit: u32,
	pub remaining: u32,
	pub reset_at: Instant,
}

impl RateLimitDecision {
	/// Time left until the window resets, saturating at zero.
	pub fn reset_after(&self) -> Duration {
		self.reset_at.saturating_duration_since(Instant::now())
	}
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
	count: u32,
	reset_at: Instant,
}

impl RateLimitEntry {
	fn fresh(now: Instant, config: &RateLimitConfig) -> Self {
		Self {
			count: 1,
			reset_at: now + config.window(),
		}
	}

	fn expired(&self, now: Instant) -> bool {
		now >= self.reset_at
	}
}

/// In-memory, single-process fixed-window limiter.
#[derive(Default)]
pub struct RateLimiter {
	entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl std::fmt::Debug for RateLimiter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RateLimiter")
			.field("tracked_keys", &self.entries.lock().len())
			.finish()
	}
}

impl RateLimiter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Count one action against `key` and report whether it was admitted.
	///
	/// Denied actions do not increment the counter.
	pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
		let now = Instant::now();
		let mut entries = self.entries.lock();

		let entry = match entries.get_mut(key) {
			Some(entry) if !entry.expired(now) => {
				if entry.count >= config.max_requests {
					return RateLimitDecision {
						allowed: false,
						limit: config.max_requests,
						remaining: 0,
						reset_at: entry.reset_at,
					};
				}
				entry.count += 1;
				*entry
			},
			Some(entry) => {
				*entry = RateLimitEntry::fresh(now, config);
				*entry
			},
			None => {
				let entry = RateLimitEntry::fresh(now, config);
				entries.insert(key.to_string(), entry);
				entry
			},
		};

		tracing::trace!(key, count = entry.count, "rate limit entry updated");
		RateLimitDecision {
			allowed: true,
			limit: config.max_requests,
			remaining: config.max_requests.saturating_sub(entry.count),
			reset_at: entry.reset_at,
		}
	}

	pub fn is_allowed(&self, key: &str, config: &RateLimitConfig) -> bool {
		self.check(key, config).allowed
	}

	pub fn remaining_requests(&self, key: &str, config: &RateLimitConfig) -> u32 {
		let now = Instant::now();
		match self.entries.lock().get(key) {
			Some(entry) if !entry.expired(now) => config.max_requests.saturating_sub(entry.count),
			_ => config.max_requests,
		}
	}

	/// Stored reset time for `key`, or one window from now if the key is untracked.
	pub fn reset_time(&self, key: &str, config: &RateLimitConfig) -> Instant {
		match self.entries.lock().get(key) {
			Some(entry) => entry.reset_at,
			None => Instant::now() + config.window(),
		}
	}

	/// Drop every entry whose window has expired. Returns the number removed.
	pub fn cleanup(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		let before = entries.len();
		entries.retain(|_, entry| !entry.expired(now));
		before - entries.len()
	}

	pub fn tracked_keys(&self) -> usize {
		self.entries.lock().len()
	}
}
