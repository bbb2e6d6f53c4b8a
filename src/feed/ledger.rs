use chrono::Utc;

use super::registry::FeedRegistry;
use super::types::{Item, NewItem};
use crate::error::{Error, Result};
use crate::store::{keys, KeyValueStore, StoreError};

/// Append-ordered, length-bounded item list per feed, with a companion GUID
/// set for duplicate rejection.
///
/// New items are prepended, so index 0 is always the most recent. The
/// composite append / trim / index-cleanup sequence is deliberately not
/// transactional: each store primitive is atomic on its own, and a crash
/// between steps leaves the ledger transiently over-length rather than
/// losing data. The next successful append restores the bound.
#[derive(Debug, Clone)]
pub struct ItemLedger<S> {
    store: S,
    registry: FeedRegistry<S>,
}

impl<S: KeyValueStore> ItemLedger<S> {
    pub fn new(store: S, registry: FeedRegistry<S>) -> Self {
        Self { store, registry }
    }

    /// Validate, dedup, prepend, and re-enforce the retention bound.
    ///
    /// Returns the stored item. Fails with `NotFound` when the feed is
    /// absent and `DuplicateItem` when the GUID is already indexed (in which
    /// case nothing is mutated).
    pub async fn add_item(&self, feed_id: &str, new_item: NewItem) -> Result<Item> {
        let config = self.registry.get_config(feed_id).await?;
        let item = new_item.validate(Utc::now())?;

        let items_key = keys::items_key(feed_id);
        let guids_key = keys::guids_key(feed_id);

        if self.store.sismember(&guids_key, &item.guid).await? {
            return Err(Error::DuplicateItem {
                feed: feed_id.to_string(),
                guid: item.guid,
            });
        }

        let raw = serde_json::to_string(&item).map_err(|e| StoreError::Corrupt {
            key: items_key.clone(),
            reason: e.to_string(),
        })?;

        // Ordering matters for partial-failure safety: append, index,
        // then trim, then prune the index for whatever fell off.
        self.store.lpush(&items_key, &raw).await?;
        self.store.sadd(&guids_key, &item.guid).await?;
        let evicted = self.trim(feed_id, config.max_items).await?;

        tracing::debug!(
            feed_id = %feed_id,
            guid = %item.guid,
            evicted = evicted,
            "item appended"
        );
        Ok(item)
    }

    /// Raw serialized items, most recent first, bounded by the feed's
    /// configured `max_items`. Always reads through to the backing store.
    pub async fn get_items(&self, feed_id: &str) -> Result<Vec<String>> {
        let config = self.registry.get_config(feed_id).await?;
        let items = self
            .store
            .lrange(&keys::items_key(feed_id), 0, config.max_items as i64 - 1)
            .await?;
        Ok(items)
    }

    /// Membership query against the GUID index.
    pub async fn item_exists(&self, feed_id: &str, guid: &str) -> Result<bool> {
        if !self.registry.exists(feed_id).await? {
            return Err(Error::NotFound(feed_id.to_string()));
        }
        Ok(self
            .store
            .sismember(&keys::guids_key(feed_id), guid)
            .await?)
    }

    /// Number of items currently in the ledger.
    pub async fn len(&self, feed_id: &str) -> Result<usize> {
        if !self.registry.exists(feed_id).await? {
            return Err(Error::NotFound(feed_id.to_string()));
        }
        Ok(self.store.llen(&keys::items_key(feed_id)).await?)
    }

    /// Delete the ordered list and the GUID index; the feed configuration
    /// is preserved.
    pub async fn clear_items(&self, feed_id: &str) -> Result<()> {
        if !self.registry.exists(feed_id).await? {
            return Err(Error::NotFound(feed_id.to_string()));
        }
        let items_key = keys::items_key(feed_id);
        let guids_key = keys::guids_key(feed_id);
        self.store
            .del(&[items_key.as_str(), guids_key.as_str()])
            .await?;
        tracing::info!(feed_id = %feed_id, "ledger cleared");
        Ok(())
    }

    /// Enforce the retention bound: read the entire tail beyond
    /// `max_items - 1`, trim it off, and prune every evicted GUID.
    ///
    /// The tail is re-read rather than assuming a single evicted entry, so
    /// the index stays correct when `max_items` shrank between writes.
    /// Returns the number of evicted entries.
    async fn trim(&self, feed_id: &str, max_items: usize) -> Result<usize> {
        let items_key = keys::items_key(feed_id);
        let tail = self.store.lrange(&items_key, max_items as i64, -1).await?;
        if tail.is_empty() {
            return Ok(0);
        }

        self.store
            .ltrim(&items_key, 0, max_items as i64 - 1)
            .await?;

        let mut evicted_guids = Vec::with_capacity(tail.len());
        for raw in &tail {
            match serde_json::from_str::<Item>(raw) {
                Ok(item) => evicted_guids.push(item.guid),
                Err(e) => {
                    // An undecodable tail entry has no index entry to prune.
                    tracing::warn!(feed_id = %feed_id, error = %e, "skipping malformed evicted item");
                }
            }
        }
        if !evicted_guids.is_empty() {
            self.store
                .srem(&keys::guids_key(feed_id), &evicted_guids)
                .await?;
        }
        Ok(tail.len())
    }
}
