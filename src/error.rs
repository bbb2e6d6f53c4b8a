use thiserror::Error;

use crate::ratelimit::RateLimitStatus;
use crate::store::StoreError;

/// Failures surfaced by the core operation contract.
///
/// The boundary layer maps these onto response codes: the first four variants
/// are client errors and are never retried, `Storage` is a server error.
/// `RateLimitExceeded` carries the window status so the boundary can emit
/// limit/remaining/reset metadata on the rejection.
#[derive(Debug, Error)]
pub enum Error {
    /// The named feed (or resource) is not registered.
    #[error("feed not found: {0}")]
    NotFound(String),

    /// An item with the same GUID is already present in the feed's ledger.
    #[error("duplicate item guid '{guid}' in feed '{feed}'")]
    DuplicateItem { feed: String, guid: String },

    /// Malformed caller input (missing required field, bad URL, bad id).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Unknown rendering format or item mode requested.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The client exhausted its fixed-window quota.
    #[error("rate limit exceeded: {} of {} requests used", .0.count, .0.limit)]
    RateLimitExceeded(RateLimitStatus),

    /// Backing-store failure. Retry policy belongs to the store adapter,
    /// not to this layer.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_the_feed() {
        let err = Error::NotFound("blog".to_string());
        assert_eq!(err.to_string(), "feed not found: blog");
    }

    #[test]
    fn test_duplicate_item_message_names_feed_and_guid() {
        let err = Error::DuplicateItem {
            feed: "blog".to_string(),
            guid: "g1".to_string(),
        };
        assert!(err.to_string().contains("g1"));
        assert!(err.to_string().contains("blog"));
    }

    #[test]
    fn test_storage_error_is_transparent() {
        let err = Error::from(StoreError::Unavailable("connection refused".to_string()));
        assert!(err.to_string().contains("connection refused"));
    }
}
