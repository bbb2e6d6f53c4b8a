//! Process-local mirror of the remote rate-limit counters.
//!
//! The mirror is advisory: the remote counter stays the cross-process source
//! of truth, while the mirror lets a busy client be counted without a remote
//! round trip for the rest of its window. Entries pair a count with the
//! absolute window expiry. A coarse mutex over a plain map is enough here;
//! critical sections are a few map operations and nothing awaits while the
//! lock is held.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// One cached fixed-window counter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub count: i64,
    /// Monotonic expiry used for staleness checks and sweep ordering.
    pub expires_at: Instant,
    /// Wall-clock window end reported in rate-limit metadata.
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct LocalMirror {
    entries: Mutex<HashMap<String, Window>>,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.entries.lock().expect("rate limit mirror mutex poisoned")
    }

    /// Increment a live cached window, returning the updated copy.
    /// Expired entries are dropped and count as a miss.
    pub fn hit(&self, key: &str) -> Option<Window> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(window) if window.expires_at > now => {
                window.count += 1;
                Some(*window)
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Replace the cached window for `key` with fresh remote state, then
    /// enforce the size cap.
    pub fn refresh(&self, key: &str, window: Window, max_entries: usize) {
        let mut entries = self.lock();
        entries.insert(key.to_string(), window);
        Self::enforce_cap(&mut entries, max_entries);
    }

    /// Evict expired entries and re-enforce the cap. Returns the number of
    /// entries removed.
    pub fn sweep(&self, max_entries: usize) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, window| window.expires_at > now);
        Self::enforce_cap(&mut entries, max_entries);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Bound memory by evicting the entries nearest expiry first; they are
    /// the cheapest to lose since they are about to reset anyway.
    fn enforce_cap(entries: &mut HashMap<String, Window>, max_entries: usize) {
        let excess = entries.len().saturating_sub(max_entries);
        if excess == 0 {
            return;
        }
        let mut by_expiry: Vec<(String, Instant)> = entries
            .iter()
            .map(|(key, window)| (key.clone(), window.expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);
        for (key, _) in by_expiry.into_iter().take(excess) {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn window(count: i64, ttl: Duration) -> Window {
        Window {
            count,
            expires_at: Instant::now() + ttl,
            reset_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_hit_increments_live_entry() {
        let mirror = LocalMirror::new();
        mirror.refresh("k", window(3, Duration::from_secs(60)), 100);

        let hit = mirror.hit("k").unwrap();
        assert_eq!(hit.count, 4);
        let hit = mirror.hit("k").unwrap();
        assert_eq!(hit.count, 5);
    }

    #[tokio::test]
    async fn test_miss_on_unknown_key() {
        let mirror = LocalMirror::new();
        assert!(mirror.hit("nope").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_and_dropped() {
        let mirror = LocalMirror::new();
        mirror.refresh("k", window(3, Duration::from_secs(5)), 100);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(mirror.hit("k").is_none());
        assert_eq!(mirror.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let mirror = LocalMirror::new();
        mirror.refresh("short", window(1, Duration::from_secs(5)), 100);
        mirror.refresh("long", window(1, Duration::from_secs(300)), 100);

        tokio::time::advance(Duration::from_secs(10)).await;
        let removed = mirror.sweep(100);
        assert_eq!(removed, 1);
        assert_eq!(mirror.len(), 1);
        assert!(mirror.hit("long").is_some());
    }

    #[tokio::test]
    async fn test_cap_evicts_nearest_expiry_first() {
        let mirror = LocalMirror::new();
        mirror.refresh("soon", window(1, Duration::from_secs(10)), 3);
        mirror.refresh("later", window(1, Duration::from_secs(100)), 3);
        mirror.refresh("latest", window(1, Duration::from_secs(200)), 3);
        // Fourth insert pushes the mirror over the cap of 3.
        mirror.refresh("mid", window(1, Duration::from_secs(50)), 3);

        assert_eq!(mirror.len(), 3);
        assert!(mirror.hit("soon").is_none(), "nearest expiry evicted");
        assert!(mirror.hit("later").is_some());
        assert!(mirror.hit("latest").is_some());
        assert!(mirror.hit("mid").is_some());
    }
}
