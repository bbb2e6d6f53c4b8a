//! Multi-tenant content feed store over a Redis-compatible key-value
//! backend.
//!
//! Each feed is an independent tenant identified by a caller-chosen id and
//! consists of a configuration record, a bounded most-recent-first item
//! ledger with guid-based deduplication, and rendered views in RSS 2.0,
//! Atom, JSON Feed, and sanitized raw form. Read traffic is admitted
//! through a hybrid local/remote fixed-window rate limiter that fails open
//! when the backend is unreachable.
//!
//! [`FeedService`] is the top-level entry point; the modules underneath are
//! usable on their own when finer control is needed.

pub mod config;
pub mod error;
pub mod feed;
pub mod ratelimit;
pub mod render;
pub mod service;
pub mod store;

pub use error::{Error, Result};
pub use service::FeedService;
