//! Format rendering: pure transformation from stored item records to
//! RSS 2.0, Atom, JSON Feed, and sanitized raw output.
//!
//! Nothing in this module performs I/O; inputs are the raw JSON strings read
//! from the ledger plus the feed's configuration record. Rendering is
//! deterministic for well-formed input: feed-level timestamps come from the
//! newest item (or the feed's creation time), never from the wall clock, so
//! rendering the same ledger twice yields byte-identical output. A stored
//! record that cannot be decoded becomes one descriptive placeholder item
//! and the batch continues.

mod sanitize;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feed::{Author, Enclosure, FeedConfig};

pub use sanitize::strip_html;

// ============================================================================
// Modes & Formats
// ============================================================================

/// How item text is presented: `Raw` strips all HTML markup, `Html`
/// preserves it. Both coerce date fields to canonical timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMode {
    Raw,
    Html,
}

impl FromStr for ItemMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" => Ok(Self::Raw),
            "html" => Ok(Self::Html),
            other => Err(Error::InvalidFormat(other.to_string())),
        }
    }
}

/// Output document format for a whole feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
    Json,
    /// JSON Feed-shaped document over sanitized (markup-stripped) items.
    Raw,
}

impl FeedFormat {
    /// MIME content type of the serialized document.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Rss => "application/rss+xml",
            Self::Atom => "application/atom+xml",
            Self::Json | Self::Raw => "application/json",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Atom => "atom",
            Self::Json => "json",
            Self::Raw => "raw",
        }
    }
}

impl FromStr for FeedFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rss" => Ok(Self::Rss),
            "atom" => Ok(Self::Atom),
            "json" => Ok(Self::Json),
            "raw" => Ok(Self::Raw),
            other => Err(Error::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A serialized feed document plus its MIME content type.
#[derive(Debug, Clone)]
pub struct RenderedFeed {
    pub body: String,
    pub content_type: &'static str,
}

// ============================================================================
// Item Formatting
// ============================================================================

/// Lenient mirror of the stored item shape. Dates are taken as raw JSON so
/// an unparseable timestamp degrades per-field instead of discarding the
/// whole record; a record is only malformed when it fails to decode at all
/// or lacks a link.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredItem {
    id: Option<String>,
    guid: Option<String>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    link: Option<String>,
    date: Option<serde_json::Value>,
    published: Option<serde_json::Value>,
    author: Vec<Author>,
    category: Vec<String>,
    image: Option<String>,
    audio: Option<String>,
    video: Option<String>,
    enclosure: Option<Enclosure>,
}

/// One item after mode processing, ready for the boundary or for a feed
/// document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedItem {
    pub id: String,
    pub guid: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    pub link: String,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Author>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
}

impl RenderedItem {
    /// Synthetic stand-in for a record that could not be decoded. Uses the
    /// epoch rather than the wall clock so output stays deterministic.
    fn placeholder() -> Self {
        Self {
            id: "invalid".to_string(),
            guid: "invalid".to_string(),
            title: "Invalid item".to_string(),
            description: None,
            content: "This item could not be read from storage.".to_string(),
            link: "about:blank".to_string(),
            date: DateTime::<Utc>::UNIX_EPOCH,
            published: None,
            author: Vec::new(),
            category: Vec::new(),
            image: None,
            audio: None,
            video: None,
            enclosure: None,
        }
    }
}

/// Best-effort timestamp coercion: RFC 3339 (our own writes), then RFC 2822,
/// then epoch seconds.
fn coerce_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_rfc2822(s))
            .map(|d| d.with_timezone(&Utc))
            .ok(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Transform raw ledger entries into presentable items.
///
/// `Raw` strips HTML from title/description/content; `Html` preserves
/// markup. Either way `date` is coerced (defaulting to now when absent or
/// unparseable) and `published` stays unset when absent. Malformed records
/// are replaced with [`RenderedItem::placeholder`]; the batch never aborts.
pub fn format_items(raw_items: &[String], mode: ItemMode) -> Vec<RenderedItem> {
    raw_items
        .iter()
        .map(|raw| match serde_json::from_str::<StoredItem>(raw) {
            Ok(stored) => format_one(stored, mode).unwrap_or_else(|| {
                tracing::warn!("stored item lacks a link, substituting placeholder");
                RenderedItem::placeholder()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "undecodable stored item, substituting placeholder");
                RenderedItem::placeholder()
            }
        })
        .collect()
}

fn format_one(stored: StoredItem, mode: ItemMode) -> Option<RenderedItem> {
    let link = stored.link?;
    let text = |s: String| match mode {
        ItemMode::Raw => strip_html(&s).into_owned(),
        ItemMode::Html => s,
    };

    let date = stored
        .date
        .as_ref()
        .and_then(coerce_date)
        .unwrap_or_else(Utc::now);
    let published = stored.published.as_ref().and_then(coerce_date);

    Some(RenderedItem {
        id: stored.id.unwrap_or_else(|| link.clone()),
        guid: stored.guid.unwrap_or_else(|| link.clone()),
        title: text(stored.title.unwrap_or_default()),
        description: stored.description.map(&text),
        content: text(stored.content.unwrap_or_default()),
        link,
        date,
        published,
        author: stored.author,
        category: stored.category,
        image: stored.image,
        audio: stored.audio,
        video: stored.video,
        enclosure: stored.enclosure,
    })
}

// ============================================================================
// Feed Generation
// ============================================================================

/// Build the serialized feed document for `format`.
///
/// `Rss`/`Atom`/`Json` carry registry metadata and html-mode items;
/// `Raw` is the JSON Feed shape over raw-mode (markup-stripped) items with
/// a synthetic `feed_url`.
pub fn generate_feed(
    raw_items: &[String],
    config: &FeedConfig,
    format: FeedFormat,
) -> Result<RenderedFeed> {
    let mode = match format {
        FeedFormat::Raw => ItemMode::Raw,
        _ => ItemMode::Html,
    };
    let items = format_items(raw_items, mode);
    let updated = feed_updated(&items, config);

    let body = match format {
        FeedFormat::Rss => rss_document(&items, config, updated),
        FeedFormat::Atom => atom_document(&items, config, updated),
        FeedFormat::Json | FeedFormat::Raw => json_document(&items, config, format)?,
    };

    Ok(RenderedFeed {
        body,
        content_type: format.content_type(),
    })
}

/// Newest item date, else the feed's creation time, else the epoch. Never
/// the wall clock: rendering must be deterministic.
fn feed_updated(items: &[RenderedItem], config: &FeedConfig) -> DateTime<Utc> {
    items
        .iter()
        .map(|item| item.date)
        .max()
        .or(config.created_at)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Cross-format self-link for the given output format.
fn self_link(config: &FeedConfig, format: FeedFormat) -> String {
    format!(
        "{}/feed/{}/{}",
        config.site_url.trim_end_matches('/'),
        config.id,
        format.extension()
    )
}

fn author_label(author: &Author) -> Option<String> {
    match (&author.email, &author.name) {
        (Some(email), Some(name)) => Some(format!("{email} ({name})")),
        (Some(email), None) => Some(email.clone()),
        (None, Some(name)) => Some(name.clone()),
        (None, None) => None,
    }
}

// ----------------------------------------------------------------------------
// RSS 2.0
// ----------------------------------------------------------------------------

fn rss_document(items: &[RenderedItem], config: &FeedConfig, updated: DateTime<Utc>) -> String {
    let rss_items: Vec<rss::Item> = items.iter().map(|item| rss_item(item)).collect();

    let mut self_ref = rss::extension::atom::Link::default();
    self_ref.set_href(self_link(config, FeedFormat::Rss));
    self_ref.set_rel("self");
    let mut atom_ext = rss::extension::atom::AtomExtension::default();
    atom_ext.set_links(vec![self_ref]);

    let image = config.image.as_ref().map(|url| {
        let mut image = rss::Image::default();
        image.set_url(url.clone());
        image.set_title(config.title.clone());
        image.set_link(config.site_url.clone());
        image
    });

    let channel = rss::ChannelBuilder::default()
        .title(config.title.clone())
        .link(config.site_url.clone())
        .description(config.description.clone())
        .language(Some(config.language.clone()))
        .copyright(config.copyright.clone())
        .last_build_date(Some(updated.to_rfc2822()))
        .image(image)
        .atom_ext(Some(atom_ext))
        .items(rss_items)
        .build();

    channel.to_string()
}

fn rss_item(item: &RenderedItem) -> rss::Item {
    let mut guid = rss::Guid::default();
    guid.set_value(item.guid.clone());
    guid.set_permalink(false);

    let enclosure = item.enclosure.as_ref().map(|enc| {
        let mut out = rss::Enclosure::default();
        out.set_url(enc.url.clone());
        out.set_mime_type(enc.mime_type.clone().unwrap_or_default());
        out.set_length(enc.length.unwrap_or_default().to_string());
        out
    });

    let categories: Vec<rss::Category> = item
        .category
        .iter()
        .map(|name| {
            let mut category = rss::Category::default();
            category.set_name(name.clone());
            category
        })
        .collect();

    rss::ItemBuilder::default()
        .title(Some(item.title.clone()))
        .link(Some(item.link.clone()))
        .description(item.description.clone())
        .content(Some(item.content.clone()))
        .guid(Some(guid))
        .pub_date(Some(item.published.unwrap_or(item.date).to_rfc2822()))
        .author(item.author.first().and_then(author_label))
        .categories(categories)
        .enclosure(enclosure)
        .build()
}

// ----------------------------------------------------------------------------
// Atom
// ----------------------------------------------------------------------------

fn atom_document(items: &[RenderedItem], config: &FeedConfig, updated: DateTime<Utc>) -> String {
    let entries: Vec<atom_syndication::Entry> =
        items.iter().map(|item| atom_entry(item)).collect();

    let mut self_ref = atom_syndication::Link::default();
    self_ref.set_href(self_link(config, FeedFormat::Atom));
    self_ref.set_rel("self");
    let mut alternate = atom_syndication::Link::default();
    alternate.set_href(config.site_url.clone());
    alternate.set_rel("alternate");

    let mut feed = atom_syndication::Feed::default();
    feed.set_id(self_link(config, FeedFormat::Atom));
    feed.set_title(atom_syndication::Text::plain(config.title.clone()));
    feed.set_subtitle(Some(atom_syndication::Text::plain(
        config.description.clone(),
    )));
    feed.set_updated(updated.fixed_offset());
    feed.set_links(vec![self_ref, alternate]);
    feed.set_icon(config.favicon.clone());
    feed.set_logo(config.image.clone());
    feed.set_lang(Some(config.language.clone()));
    feed.set_rights(
        config
            .copyright
            .clone()
            .map(atom_syndication::Text::plain),
    );
    if let Some(author) = &config.author {
        feed.set_authors(vec![atom_person(author)]);
    }
    feed.set_entries(entries);

    feed.to_string()
}

fn atom_entry(item: &RenderedItem) -> atom_syndication::Entry {
    let mut alternate = atom_syndication::Link::default();
    alternate.set_href(item.link.clone());
    alternate.set_rel("alternate");

    let mut content = atom_syndication::Content::default();
    content.set_value(Some(item.content.clone()));
    content.set_content_type(Some("html".to_string()));

    let categories: Vec<atom_syndication::Category> = item
        .category
        .iter()
        .map(|name| {
            let mut category = atom_syndication::Category::default();
            category.set_term(name.clone());
            category
        })
        .collect();

    let mut entry = atom_syndication::Entry::default();
    entry.set_id(item.guid.clone());
    entry.set_title(atom_syndication::Text::plain(item.title.clone()));
    entry.set_updated(item.date.fixed_offset());
    entry.set_published(item.published.map(|d| d.fixed_offset()));
    entry.set_links(vec![alternate]);
    entry.set_authors(item.author.iter().map(atom_person).collect::<Vec<_>>());
    entry.set_categories(categories);
    entry.set_summary(
        item.description
            .clone()
            .map(atom_syndication::Text::plain),
    );
    entry.set_content(Some(content));
    entry
}

fn atom_person(author: &Author) -> atom_syndication::Person {
    let mut person = atom_syndication::Person::default();
    person.set_name(author.name.clone().unwrap_or_default());
    person.set_email(author.email.clone());
    person.set_uri(author.link.clone());
    person
}

// ----------------------------------------------------------------------------
// JSON Feed
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct JsonFeedDocument<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    feed_url: String,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    favicon: Option<&'a str>,
    language: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<JsonFeedAuthor<'a>>,
    items: Vec<JsonFeedItem<'a>>,
}

#[derive(Serialize)]
struct JsonFeedAuthor<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonFeedAttachment<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_in_bytes: Option<u64>,
}

#[derive(Serialize)]
struct JsonFeedItem<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
    date_published: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<JsonFeedAuthor<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<JsonFeedAttachment<'a>>,
}

fn json_document(
    items: &[RenderedItem],
    config: &FeedConfig,
    format: FeedFormat,
) -> Result<String> {
    let json_items: Vec<JsonFeedItem<'_>> = items
        .iter()
        .map(|item| {
            let (content_html, content_text) = match format {
                FeedFormat::Raw => (None, Some(item.content.as_str())),
                _ => (Some(item.content.as_str()), None),
            };
            JsonFeedItem {
                id: &item.id,
                url: &item.link,
                title: &item.title,
                content_html,
                content_text,
                summary: item.description.as_deref(),
                date_published: item
                    .published
                    .unwrap_or(item.date)
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                authors: item.author.iter().map(json_author).collect(),
                tags: item.category.iter().map(String::as_str).collect(),
                image: item.image.as_deref(),
                attachments: item
                    .enclosure
                    .iter()
                    .map(|enc| JsonFeedAttachment {
                        url: &enc.url,
                        mime_type: enc.mime_type.as_deref(),
                        size_in_bytes: enc.length,
                    })
                    .collect(),
            }
        })
        .collect();

    let document = JsonFeedDocument {
        version: "https://jsonfeed.org/version/1.1",
        title: &config.title,
        home_page_url: &config.site_url,
        feed_url: self_link(config, format),
        description: &config.description,
        icon: config.image.as_deref(),
        favicon: config.favicon.as_deref(),
        language: &config.language,
        authors: config.author.iter().map(json_author).collect(),
        items: json_items,
    };

    serde_json::to_string_pretty(&document)
        .map_err(|e| Error::InvalidFormat(format!("json feed serialization failed: {e}")))
}

fn json_author(author: &Author) -> JsonFeedAuthor<'_> {
    JsonFeedAuthor {
        name: author.name.as_deref(),
        url: author.link.as_deref(),
    }
}
