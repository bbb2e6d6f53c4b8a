//! Hybrid local + remote fixed-window rate limiting.
//!
//! Applied to read-class traffic only; writes are protected by
//! authentication at the boundary and bypass this layer entirely. Each
//! admitted request either increments a process-local mirror of its window
//! (no remote round trip) or, on a mirror miss, issues one pipelined
//! INCR + TTL against the backing store and refreshes the mirror.
//!
//! Remote failures fail open: the request is admitted without incrementing,
//! because read availability is prioritized over strict quota enforcement.

mod cache;

use std::sync::Arc;
use std::time::Duration;

use cache::{LocalMirror, Window};
use chrono::{DateTime, Utc};
use http::HeaderMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::store::{keys, KeyValueStore};

/// Fallback client identifier when no address header is present.
const UNKNOWN_CLIENT: &str = "unknown";

// ============================================================================
// Settings & Status
// ============================================================================

/// Tunables for the fixed-window limiter.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Maximum admitted requests per window.
    pub max_requests: u32,
    /// Fixed window length.
    pub window: Duration,
    /// Interval of the background mirror sweep.
    pub sweep_interval: Duration,
    /// Size cap of the local mirror.
    pub mirror_max_entries: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            mirror_max_entries: 10_000,
        }
    }
}

/// Outcome of one admission check. Produced on every call, admit or reject,
/// so the boundary can always emit limit/remaining/reset metadata.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub count: i64,
    /// Requests left in the window, floored at zero.
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

// ============================================================================
// Client Identification
// ============================================================================

/// Derive a client identifier from request headers, in priority order:
/// the trusted proxy header, the first `x-forwarded-for` entry, `x-real-ip`,
/// else a shared `"unknown"` sentinel.
pub fn derive_client_key(headers: &HeaderMap) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }
    UNKNOWN_CLIENT.to_string()
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Limiter
// ============================================================================

/// Fixed-window limiter over a remote counter with a process-local mirror.
#[derive(Debug, Clone)]
pub struct RateLimiter<S> {
    store: S,
    settings: RateLimitSettings,
    mirror: Arc<LocalMirror>,
}

impl<S: KeyValueStore> RateLimiter<S> {
    pub fn new(store: S, settings: RateLimitSettings) -> Self {
        Self {
            store,
            settings,
            mirror: Arc::new(LocalMirror::new()),
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Admission check keyed by request headers.
    pub async fn check_headers(&self, headers: &HeaderMap) -> RateLimitStatus {
        self.check(&derive_client_key(headers)).await
    }

    /// Admission check for one read request from `client`.
    ///
    /// Never returns an error: remote store failures are logged and the
    /// request is admitted without incrementing (fail-open).
    pub async fn check(&self, client: &str) -> RateLimitStatus {
        let key = keys::rate_limit_key(client);

        // Local mirror first: a live entry spares the remote round trip.
        if let Some(window) = self.mirror.hit(&key) {
            return self.status(window.count, window.reset_at);
        }

        let window_secs = self.settings.window.as_secs() as i64;
        match self.store.incr_with_ttl(&key).await {
            Ok((count, ttl)) => {
                // A counter that was just created (or lost its expiry)
                // gets an explicit window-length expiry.
                let effective_ttl = if ttl < 0 || count == 1 {
                    if let Err(e) = self.store.expire(&key, window_secs).await {
                        tracing::warn!(client = %client, error = %e, "failed to set rate limit window expiry");
                    }
                    window_secs
                } else {
                    ttl
                };

                let reset_at = Utc::now() + chrono::Duration::seconds(effective_ttl);
                self.mirror.refresh(
                    &key,
                    Window {
                        count,
                        expires_at: Instant::now()
                            + Duration::from_secs(effective_ttl.max(0) as u64),
                        reset_at,
                    },
                    self.settings.mirror_max_entries,
                );
                self.status(count, reset_at)
            }
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "rate limit store unavailable, failing open");
                RateLimitStatus {
                    allowed: true,
                    limit: self.settings.max_requests,
                    count: 0,
                    remaining: self.settings.max_requests,
                    reset_at: Utc::now() + chrono::Duration::seconds(window_secs),
                }
            }
        }
    }

    /// Spawn the periodic mirror sweep. Runs until the handle is aborted or
    /// the runtime shuts down; never blocks request handling.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let mirror = Arc::clone(&self.mirror);
        let interval = self.settings.sweep_interval;
        let cap = self.settings.mirror_max_entries;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = mirror.sweep(cap);
                if removed > 0 {
                    tracing::debug!(removed = removed, "swept rate limit mirror");
                }
            }
        })
    }

    fn status(&self, count: i64, reset_at: DateTime<Utc>) -> RateLimitStatus {
        let limit = self.settings.max_requests;
        RateLimitStatus {
            allowed: count <= i64::from(limit),
            limit,
            count,
            remaining: u32::try_from(i64::from(limit) - count).unwrap_or(0),
            reset_at,
        }
    }

    #[cfg(test)]
    pub(crate) fn mirror_len(&self) -> usize {
        self.mirror.len()
    }
}
