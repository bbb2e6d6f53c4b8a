use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};

/// Default retention bound for a feed's item ledger.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Default feed language.
pub const DEFAULT_LANGUAGE: &str = "en";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

// ============================================================================
// Feed Configuration
// ============================================================================

/// Author reference carried by feeds and items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Per-feed configuration record, stored as JSON under `feed:{id}:config`.
///
/// `id` is caller-chosen, unique, and immutable for the feed's lifetime;
/// everything else is mutable via merge-updates ([`FeedConfigPatch`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub site_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    /// Stamped on first registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl FeedConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            description: String::new(),
            site_url: String::new(),
            language: default_language(),
            copyright: None,
            max_items: DEFAULT_MAX_ITEMS,
            image: None,
            favicon: None,
            author: None,
            created_at: None,
        }
    }

    /// Reject records that cannot identify a feed or would disable retention.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Configuration("feed id must not be empty".to_string()));
        }
        if self.max_items == 0 {
            return Err(Error::Configuration(
                "max_items must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Current-year copyright notice derived from the title, used when a
    /// feed is created through the upsert path without an explicit notice.
    pub fn default_copyright(title: &str, now: DateTime<Utc>) -> String {
        format!("© {} {}", now.year(), title)
    }
}

/// Partial configuration: unspecified fields preserve prior values.
/// The feed id is deliberately absent; it is never patched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedConfigPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub max_items: Option<usize>,
    pub image: Option<String>,
    pub favicon: Option<String>,
    pub author: Option<Author>,
}

impl FeedConfigPatch {
    /// Merge this patch over an existing record.
    pub fn apply(self, config: &mut FeedConfig) {
        if let Some(title) = self.title {
            config.title = title;
        }
        if let Some(description) = self.description {
            config.description = description;
        }
        if let Some(site_url) = self.site_url {
            config.site_url = site_url;
        }
        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(copyright) = self.copyright {
            config.copyright = Some(copyright);
        }
        if let Some(max_items) = self.max_items {
            config.max_items = max_items;
        }
        if let Some(image) = self.image {
            config.image = Some(image);
        }
        if let Some(favicon) = self.favicon {
            config.favicon = Some(favicon);
        }
        if let Some(author) = self.author {
            config.author = Some(author);
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// Media attachment reference (RSS enclosure / JSON Feed attachment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// A content item as accepted at the ingestion boundary.
///
/// Only `link` is unconditionally required; [`NewItem::validate`] enforces
/// the remaining invariants and fills generated defaults, producing the
/// stored [`Item`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItem {
    pub id: Option<String>,
    pub guid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub link: String,
    pub date: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Vec<Author>,
    #[serde(default)]
    pub category: Vec<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub enclosure: Option<Enclosure>,
}

impl NewItem {
    pub fn with_link(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..Self::default()
        }
    }

    /// Validate and normalize into a stored [`Item`].
    ///
    /// Invariants enforced here rather than by structural leniency:
    /// - `link` must parse as an absolute http/https URL;
    /// - at least one of `content` / `description` must be present
    ///   (content falls back to description);
    /// - `id` is generated from the link and ingestion time when absent;
    /// - `guid` defaults to the link, else to the generated id;
    /// - `date` defaults to the ingestion time; `published` stays unset
    ///   unless supplied.
    pub fn validate(self, now: DateTime<Utc>) -> Result<Item> {
        if self.link.trim().is_empty() {
            return Err(Error::Configuration("item link is required".to_string()));
        }
        let parsed = Url::parse(&self.link)
            .map_err(|e| Error::Configuration(format!("invalid item link: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "unsupported item link scheme: {}",
                parsed.scheme()
            )));
        }

        let content = match (self.content, &self.description) {
            (Some(content), _) => content,
            (None, Some(description)) => description.clone(),
            (None, None) => {
                return Err(Error::Configuration(
                    "item requires content or description".to_string(),
                ));
            }
        };

        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => generate_item_id(&self.link, now),
        };
        let guid = match self.guid {
            Some(guid) if !guid.trim().is_empty() => guid,
            _ => self.link.clone(),
        };

        Ok(Item {
            id,
            guid,
            title: self.title.unwrap_or_default(),
            description: self.description,
            content,
            link: self.link,
            date: self.date.unwrap_or(now),
            published: self.published,
            author: self.author,
            category: self.category,
            image: self.image,
            audio: self.audio,
            video: self.video,
            enclosure: self.enclosure,
        })
    }
}

/// A stored content item, serialized as one JSON entry of the feed's item
/// list. Immutable once stored except for eviction by trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub guid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content: String,
    pub link: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
}

/// Derive a stable hex id from the item link and ingestion instant.
fn generate_item_id(link: &str, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
