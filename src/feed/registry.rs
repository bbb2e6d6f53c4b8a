use chrono::Utc;

use super::types::{FeedConfig, FeedConfigPatch, DEFAULT_MAX_ITEMS};
use crate::error::{Error, Result};
use crate::store::{keys, KeyValueStore, StoreError};

/// Owns per-feed configuration records and defines feed existence.
///
/// Writes go straight to the backing store with no caching tier, so they are
/// directly visible to subsequent reads.
#[derive(Debug, Clone)]
pub struct FeedRegistry<S> {
    store: S,
}

impl<S: KeyValueStore> FeedRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// True iff a configuration record is stored for `feed_id`.
    pub async fn exists(&self, feed_id: &str) -> Result<bool> {
        Ok(self.store.exists(&keys::config_key(feed_id)).await?)
    }

    /// Register a feed. Re-creating an existing id overwrites the record
    /// (idempotent upsert), matching the external config endpoint contract.
    ///
    /// Only the id and retention bound are validated here; requiring
    /// title/description/site URL on feed creation is the boundary layer's
    /// input contract, so sparse records are accepted at this tier.
    pub async fn create(&self, mut config: FeedConfig) -> Result<String> {
        config.validate()?;
        if config.created_at.is_none() {
            config.created_at = Some(Utc::now());
        }
        self.write(&config).await?;
        tracing::info!(feed_id = %config.id, "feed registered");
        Ok(config.id)
    }

    /// Fetch the configuration record, failing with `NotFound` when absent.
    pub async fn get_config(&self, feed_id: &str) -> Result<FeedConfig> {
        let key = keys::config_key(feed_id);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(feed_id.to_string()))?;
        let config: FeedConfig =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key,
                reason: e.to_string(),
            })?;
        Ok(config)
    }

    /// Strict update: merges `patch` over the existing record, failing with
    /// `NotFound` when the feed has never been registered.
    pub async fn update_config(
        &self,
        feed_id: &str,
        patch: FeedConfigPatch,
    ) -> Result<FeedConfig> {
        let mut config = self.get_config(feed_id).await?;
        patch.apply(&mut config);
        config.validate()?;
        self.write(&config).await?;
        Ok(config)
    }

    /// Upsert used by the external config endpoint: creates the feed with
    /// defaults when absent, otherwise merges. The id stays immutable either
    /// way ([`FeedConfigPatch`] cannot carry one).
    pub async fn upsert_config(
        &self,
        feed_id: &str,
        patch: FeedConfigPatch,
    ) -> Result<FeedConfig> {
        let mut config = match self.get_config(feed_id).await {
            Ok(existing) => existing,
            Err(Error::NotFound(_)) => {
                let mut fresh = FeedConfig::new(feed_id);
                fresh.max_items = DEFAULT_MAX_ITEMS;
                fresh.created_at = Some(Utc::now());
                tracing::info!(feed_id = %feed_id, "feed created via config upsert");
                fresh
            }
            Err(e) => return Err(e),
        };
        patch.apply(&mut config);
        if config.copyright.is_none() {
            config.copyright = Some(FeedConfig::default_copyright(&config.title, Utc::now()));
        }
        config.validate()?;
        self.write(&config).await?;
        Ok(config)
    }

    /// All registered feed ids, sorted for stable output.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.store.smembers(keys::FEED_INDEX_KEY).await?;
        ids.sort();
        Ok(ids)
    }

    async fn write(&self, config: &FeedConfig) -> Result<()> {
        let raw = serde_json::to_string(config).map_err(|e| StoreError::Corrupt {
            key: keys::config_key(&config.id),
            reason: e.to_string(),
        })?;
        self.store.set(&keys::config_key(&config.id), &raw).await?;
        self.store.sadd(keys::FEED_INDEX_KEY, &config.id).await?;
        Ok(())
    }
}
