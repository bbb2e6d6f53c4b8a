//! Key namespacing for the backing store.
//!
//! Every feed owns three keys derived from its id: a JSON configuration
//! record, a front-inserted item list, and a GUID membership set. A single
//! global set indexes all registered feed ids, and rate-limit counters live
//! under their own namespace keyed by client identifier.

/// Global set holding every registered feed id.
pub const FEED_INDEX_KEY: &str = "feeds";

/// Key of the JSON configuration record for a feed.
pub fn config_key(feed_id: &str) -> String {
    format!("feed:{feed_id}:config")
}

/// Key of the ordered item list for a feed (most recent first).
pub fn items_key(feed_id: &str) -> String {
    format!("feed:{feed_id}:items")
}

/// Key of the GUID membership set for a feed.
pub fn guids_key(feed_id: &str) -> String {
    format!("feed:{feed_id}:guids")
}

/// Key of the fixed-window counter for a client identifier.
pub fn rate_limit_key(client: &str) -> String {
    format!("ratelimit:{client}")
}
