//! High-level facade tying the registry, ledger, rate limiter, and renderer
//! together over one shared store handle. This is the surface an HTTP layer
//! or the CLI talks to; each method is one complete operation.

use http::HeaderMap;

use crate::error::{Error, Result};
use crate::feed::{FeedConfig, FeedConfigPatch, FeedRegistry, Item, ItemLedger, NewItem};
use crate::ratelimit::{RateLimitSettings, RateLimitStatus, RateLimiter};
use crate::render::{self, FeedFormat, ItemMode, RenderedFeed, RenderedItem};
use crate::store::KeyValueStore;

/// One service instance per process; clones share the underlying store
/// connection and the rate limiter's local mirror.
#[derive(Clone)]
pub struct FeedService<S: KeyValueStore> {
    registry: FeedRegistry<S>,
    ledger: ItemLedger<S>,
    limiter: RateLimiter<S>,
}

impl<S: KeyValueStore> FeedService<S> {
    pub fn new(store: S, rate_limit: RateLimitSettings) -> Self {
        let registry = FeedRegistry::new(store.clone());
        let ledger = ItemLedger::new(store.clone(), registry.clone());
        let limiter = RateLimiter::new(store, rate_limit);
        Self {
            registry,
            ledger,
            limiter,
        }
    }

    /// Access the limiter, e.g. to spawn its background sweeper.
    pub fn rate_limiter(&self) -> &RateLimiter<S> {
        &self.limiter
    }

    // ------------------------------------------------------------------------
    // Registry operations
    // ------------------------------------------------------------------------

    /// All registered feed ids, sorted.
    pub async fn list_feeds(&self) -> Result<Vec<String>> {
        self.registry.list_ids().await
    }

    /// Register a feed, overwriting any existing record with the same id.
    /// Returns the feed id.
    pub async fn create_feed(&self, config: FeedConfig) -> Result<String> {
        self.registry.create(config).await
    }

    pub async fn get_config(&self, feed_id: &str) -> Result<FeedConfig> {
        self.registry.get_config(feed_id).await
    }

    /// Merge a patch into an existing feed's configuration. Fails with
    /// [`Error::NotFound`] when the feed was never registered.
    pub async fn update_config(
        &self,
        feed_id: &str,
        patch: FeedConfigPatch,
    ) -> Result<FeedConfig> {
        self.registry.update_config(feed_id, patch).await
    }

    /// Merge a patch, registering the feed first if needed.
    pub async fn upsert_config(
        &self,
        feed_id: &str,
        patch: FeedConfigPatch,
    ) -> Result<FeedConfig> {
        self.registry.upsert_config(feed_id, patch).await
    }

    // ------------------------------------------------------------------------
    // Ledger operations
    // ------------------------------------------------------------------------

    /// Validate and store one item on `feed_id`'s ledger.
    pub async fn add_item(&self, feed_id: &str, item: NewItem) -> Result<Item> {
        self.ledger.add_item(feed_id, item).await
    }

    /// Stored items, most recent first, passed through mode processing.
    pub async fn get_items(&self, feed_id: &str, mode: ItemMode) -> Result<Vec<RenderedItem>> {
        let raw = self.ledger.get_items(feed_id).await?;
        Ok(render::format_items(&raw, mode))
    }

    pub async fn item_count(&self, feed_id: &str) -> Result<usize> {
        self.ledger.len(feed_id).await
    }

    /// Drop every item and guid for a feed; its configuration survives.
    pub async fn clear_items(&self, feed_id: &str) -> Result<()> {
        self.ledger.clear_items(feed_id).await
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Serialize the feed in the requested output format.
    pub async fn render_feed(&self, feed_id: &str, format: FeedFormat) -> Result<RenderedFeed> {
        let config = self.registry.get_config(feed_id).await?;
        let raw = self.ledger.get_items(feed_id).await?;
        render::generate_feed(&raw, &config, format)
    }

    // ------------------------------------------------------------------------
    // Rate limiting
    // ------------------------------------------------------------------------

    /// Admit or reject a request identified by its headers. Rejection maps
    /// to [`Error::RateLimitExceeded`] carrying the window status.
    pub async fn check_rate_limit(&self, headers: &HeaderMap) -> Result<RateLimitStatus> {
        let status = self.limiter.check_headers(headers).await;
        if status.allowed {
            Ok(status)
        } else {
            Err(Error::RateLimitExceeded(status))
        }
    }
}
