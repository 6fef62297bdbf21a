// Per-session tool invocation counters
//
// Used to enforce `max_calls_per_session`. The check and the increment happen
// under one lock so concurrent calls from the same session cannot both be
// admitted on the boundary call.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct SessionEntry {
	counts: HashMap<String, u32>,
	last_seen: Instant,
}

impl SessionEntry {
	fn new(now: Instant) -> Self {
		Self {
			counts: HashMap::new(),
			last_seen: now,
		}
	}
}

#[derive(Debug, Default)]
pub struct SessionCallCounters {
	sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionCallCounters {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reserve one call of `tool` for `session`.
	///
	/// With a limit, the reservation only succeeds while the current count is
	/// below it. Without a limit the call is always counted.
	pub fn try_acquire(&self, session: &str, tool: &str, limit: Option<u32>) -> bool {
		let now = Instant::now();
		let mut sessions = self.sessions.lock();
		let entry = sessions
			.entry(session.to_string())
			.or_insert_with(|| SessionEntry::new(now));
		entry.last_seen = now;

		let count = entry.counts.entry(tool.to_string()).or_insert(0);
		if let Some(limit) = limit
			&& *count >= limit
		{
			return false;
		}
		*count += 1;
		true
	}

	/// Give back a reservation taken by `try_acquire`.
	pub fn release(&self, session: &str, tool: &str) {
		let mut sessions = self.sessions.lock();
		if let Some(count) = sessions
			.get_mut(session)
			.and_then(|entry| entry.counts.get_mut(tool))
		{
			*count = count.saturating_sub(1);
		}
	}

	pub fn count(&self, session: &str, tool: &str) -> u32 {
		self
			.sessions
			.lock()
			.get(session)
			.and_then(|entry| entry.counts.get(tool).copied())
			.unwrap_or(0)
	}

	/// Drop every counter of `session`.
	pub fn evict(&self, session: &str) -> bool {
		self.sessions.lock().remove(session).is_some()
	}

	/// Drop sessions not seen for at least `ttl`. Returns the number evicted.
	pub fn evict_idle(&self, ttl: Duration) -> usize {
		let now = Instant::now();
		let mut sessions = self.sessions.lock();
		let before = sessions.len();
		sessions.retain(|_, entry| now.duration_since(entry.last_seen) < ttl);
		before - sessions.len()
	}

	pub fn session_count(&self) -> usize {
		self.sessions.lock().len()
	}
}
