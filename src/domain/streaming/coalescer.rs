//! Fragment coalescing for client delivery.
//!
//! Model tokens arrive in tiny pieces. The [`Coalescer`] buffers them and
//! releases a chunk when the buffer is long enough, ends at a natural
//! break, or has waited longer than the latency budget. Coalescing only
//! changes granularity: the concatenation of everything released equals
//! the concatenation of everything pushed.

use std::time::{Duration, Instant};

/// Buffer endings that release the buffer immediately.
pub const FLUSH_ENDINGS: &[&str] = &[". ", "? ", "! ", "\n\n", ":", ";", "…", ", ", ") ", "] ", " }"];

/// Thresholds for releasing buffered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescePolicy {
    pub min_chars: usize,
    pub max_latency: Duration,
}

impl Default for CoalescePolicy {
    fn default() -> Self {
        Self {
            min_chars: 24,
            max_latency: Duration::from_millis(40),
        }
    }
}

impl CoalescePolicy {
    /// True when `buffer` should be released at `elapsed` since the last flush.
    pub fn should_flush(&self, buffer: &str, elapsed: Duration) -> bool {
        if buffer.is_empty() {
            return false;
        }
        buffer.chars().count() >= self.min_chars
            || FLUSH_ENDINGS.iter().any(|end| buffer.ends_with(end))
            || elapsed >= self.max_latency
    }
}

/// Accumulates fragments and releases coalesced chunks.
#[derive(Debug)]
pub struct Coalescer {
    policy: CoalescePolicy,
    buffer: String,
    last_flush: Instant,
}

impl Coalescer {
    pub fn new(policy: CoalescePolicy, now: Instant) -> Self {
        Self {
            policy,
            buffer: String::new(),
            last_flush: now,
        }
    }

    /// Appends a fragment; returns a chunk when the policy says to flush.
    pub fn push(&mut self, fragment: &str, now: Instant) -> Option<String> {
        self.buffer.push_str(fragment);
        self.poll(now)
    }

    /// Releases the buffer if the latency budget ran out.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let elapsed = now.saturating_duration_since(self.last_flush);
        if self.policy.should_flush(&self.buffer, elapsed) {
            self.last_flush = now;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Releases whatever is buffered.
    pub fn flush(&mut self, now: Instant) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_flush = now;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Drops buffered text without releasing it.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Time left until the latency budget forces a flush.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.policy
            .max_latency
            .saturating_sub(now.saturating_duration_since(self.last_flush))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(min_chars: usize) -> CoalescePolicy {
        CoalescePolicy {
            min_chars,
            max_latency: Duration::from_secs(3600),
        }
    }

    fn run(fragments: &[&str], min_chars: usize) -> Vec<String> {
        let now = Instant::now();
        let mut c = Coalescer::new(policy(min_chars), now);
        let mut out: Vec<String> = fragments.iter().filter_map(|f| c.push(f, now)).collect();
        out.extend(c.flush(now));
        out
    }

    #[test]
    fn hello_world_is_lossless_and_flushes_by_third_fragment() {
        let now = Instant::now();
        let mut c = Coalescer::new(policy(5), now);
        assert_eq!(c.push("Hel", now), None);
        assert_eq!(c.push("lo, ", now).as_deref(), Some("Hello, "));
        assert_eq!(c.push("world.", now).as_deref(), Some("world."));
        assert!(c.is_empty());
    }

    #[test]
    fn natural_break_releases_short_buffer() {
        assert_eq!(run(&["Ja. ", "Nein"], 100), vec!["Ja. ".to_string(), "Nein".to_string()]);
    }

    #[test]
    fn latency_budget_releases_buffer() {
        let start = Instant::now();
        let mut c = Coalescer::new(
            CoalescePolicy {
                min_chars: 100,
                max_latency: Duration::from_millis(40),
            },
            start,
        );
        assert_eq!(c.push("ab", start), None);
        assert_eq!(c.poll(start + Duration::from_millis(41)).as_deref(), Some("ab"));
        assert_eq!(c.remaining(start + Duration::from_millis(41)), Duration::from_millis(40));
    }

    #[test]
    fn min_chars_counts_characters_not_bytes() {
        let now = Instant::now();
        let mut c = Coalescer::new(policy(3), now);
        assert_eq!(c.push("öö", now), None);
        assert_eq!(c.push("ö", now).as_deref(), Some("ööö"));
    }

    #[test]
    fn discard_drops_pending_text() {
        let now = Instant::now();
        let mut c = Coalescer::new(policy(100), now);
        c.push("pending", now);
        c.discard();
        assert_eq!(c.flush(now), None);
    }

    proptest! {
        #[test]
        fn output_preserves_order_without_loss(
            fragments in proptest::collection::vec("[a-zA-Zäö .,:;!?\\n]{0,12}", 0..40),
            min_chars in 1usize..40,
        ) {
            let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
            let out = run(&refs, min_chars);
            prop_assert_eq!(out.concat(), fragments.concat());
            prop_assert!(out.iter().all(|chunk| !chunk.is_empty()));
        }
    }
}
