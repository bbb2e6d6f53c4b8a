//! Integration tests for the feed lifecycle: register, ingest, render, clear.
//!
//! Each test creates its own in-memory store for isolation. These tests
//! exercise the service layer end-to-end, verifying that registry, ledger,
//! and renderer compose correctly, including parsing the generated RSS and
//! Atom documents back with an independent feed parser.

use feedstore::error::Error;
use feedstore::feed::{FeedConfigPatch, NewItem};
use feedstore::ratelimit::RateLimitSettings;
use feedstore::render::{FeedFormat, ItemMode};
use feedstore::store::MemoryStore;
use feedstore::FeedService;

fn test_service() -> FeedService<MemoryStore> {
    FeedService::new(MemoryStore::new(), RateLimitSettings::default())
}

fn test_patch(title: &str) -> FeedConfigPatch {
    FeedConfigPatch {
        title: Some(title.to_string()),
        description: Some("Integration test feed".to_string()),
        site_url: Some("https://example.com".to_string()),
        ..FeedConfigPatch::default()
    }
}

fn test_item(guid: &str, content: &str) -> NewItem {
    NewItem {
        guid: Some(guid.to_string()),
        title: Some(format!("Item {guid}")),
        content: Some(content.to_string()),
        date: Some(format!("2026-01-0{}T00:00:00Z", guid.len()).parse().unwrap()),
        ..NewItem::with_link(format!("https://example.com/{guid}"))
    }
}

// ============================================================================
// Registry Tests
// ============================================================================

#[tokio::test]
async fn test_upsert_creates_then_merges() {
    let svc = test_service();

    let created = svc.upsert_config("news", test_patch("News")).await.unwrap();
    assert_eq!(created.title, "News");
    assert_eq!(created.max_items, 100);
    assert!(created.created_at.is_some());
    // Upsert-created feeds get a copyright notice derived from the title.
    assert!(created.copyright.as_deref().unwrap_or("").contains("News"));

    let updated = svc
        .upsert_config(
            "news",
            FeedConfigPatch {
                title: Some("World News".to_string()),
                ..FeedConfigPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "World News");
    // Merge preserves fields the patch did not mention.
    assert_eq!(updated.site_url, "https://example.com");
    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn test_update_unknown_feed_is_not_found() {
    let svc = test_service();
    let err = svc
        .update_config("ghost", test_patch("Ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_list_feeds_sorted() {
    let svc = test_service();
    svc.upsert_config("zeta", test_patch("Z")).await.unwrap();
    svc.upsert_config("alpha", test_patch("A")).await.unwrap();

    assert_eq!(
        svc.list_feeds().await.unwrap(),
        vec!["alpha".to_string(), "zeta".to_string()]
    );
}

// ============================================================================
// Ledger Tests
// ============================================================================

#[tokio::test]
async fn test_items_most_recent_first_and_bounded() {
    let svc = test_service();
    svc.upsert_config(
        "news",
        FeedConfigPatch {
            max_items: Some(2),
            ..test_patch("News")
        },
    )
    .await
    .unwrap();

    svc.add_item("news", test_item("a", "first")).await.unwrap();
    svc.add_item("news", test_item("bb", "second")).await.unwrap();
    svc.add_item("news", test_item("ccc", "third")).await.unwrap();

    let items = svc.get_items("news", ItemMode::Html).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].guid, "ccc");
    assert_eq!(items[1].guid, "bb");
}

#[tokio::test]
async fn test_evicted_guid_can_be_ingested_again() {
    let svc = test_service();
    svc.upsert_config(
        "news",
        FeedConfigPatch {
            max_items: Some(2),
            ..test_patch("News")
        },
    )
    .await
    .unwrap();

    svc.add_item("news", test_item("a", "first")).await.unwrap();
    svc.add_item("news", test_item("bb", "second")).await.unwrap();
    svc.add_item("news", test_item("ccc", "third")).await.unwrap();

    // "a" was evicted by the retention bound, so its guid index entry is
    // gone and re-ingestion is not a duplicate.
    svc.add_item("news", test_item("a", "again")).await.unwrap();
    let items = svc.get_items("news", ItemMode::Html).await.unwrap();
    assert_eq!(items[0].guid, "a");
}

#[tokio::test]
async fn test_duplicate_guid_rejected() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();

    svc.add_item("news", test_item("x", "once")).await.unwrap();
    let err = svc.add_item("news", test_item("x", "twice")).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateItem { .. }));
    assert_eq!(svc.item_count("news").await.unwrap(), 1);
}

#[tokio::test]
async fn test_clear_items_preserves_config() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "first")).await.unwrap();

    svc.clear_items("news").await.unwrap();

    assert_eq!(svc.item_count("news").await.unwrap(), 0);
    assert_eq!(svc.get_config("news").await.unwrap().title, "News");
    // The guid index was cleared along with the items.
    svc.add_item("news", test_item("a", "again")).await.unwrap();
}

#[tokio::test]
async fn test_item_without_content_or_description_rejected() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();

    let err = svc
        .add_item("news", NewItem::with_link("https://example.com/empty"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

// ============================================================================
// Sanitization Tests
// ============================================================================

#[tokio::test]
async fn test_raw_mode_strips_markup() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "<b>hi</b>")).await.unwrap();

    let raw = svc.get_items("news", ItemMode::Raw).await.unwrap();
    assert_eq!(raw[0].content, "hi");

    let html = svc.get_items("news", ItemMode::Html).await.unwrap();
    assert_eq!(html[0].content, "<b>hi</b>");
}

#[tokio::test]
async fn test_raw_feed_output_is_tag_free() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "<p>one <i>two</i></p>"))
        .await
        .unwrap();

    let rendered = svc.render_feed("news", FeedFormat::Raw).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&rendered.body).unwrap();
    let content = parsed["items"][0]["content_text"].as_str().unwrap();
    assert!(!content.contains('<'), "raw content still had markup: {content}");
    assert_eq!(content, "one two");
}

// ============================================================================
// Rendering Tests
// ============================================================================

#[tokio::test]
async fn test_rss_round_trips_through_independent_parser() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "first")).await.unwrap();
    svc.add_item("news", test_item("bb", "second")).await.unwrap();

    let rendered = svc.render_feed("news", FeedFormat::Rss).await.unwrap();
    assert_eq!(rendered.content_type, "application/rss+xml");

    let parsed = feed_rs::parser::parse(rendered.body.as_bytes()).unwrap();
    assert_eq!(parsed.title.unwrap().content, "News");
    assert_eq!(parsed.entries.len(), 2);
    // Most recent first.
    assert_eq!(parsed.entries[0].id, "bb");
    assert_eq!(parsed.entries[1].id, "a");
}

#[tokio::test]
async fn test_atom_round_trips_through_independent_parser() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "first")).await.unwrap();

    let rendered = svc.render_feed("news", FeedFormat::Atom).await.unwrap();
    assert_eq!(rendered.content_type, "application/atom+xml");

    let parsed = feed_rs::parser::parse(rendered.body.as_bytes()).unwrap();
    assert_eq!(parsed.title.unwrap().content, "News");
    assert_eq!(parsed.entries.len(), 1);
    assert_eq!(parsed.entries[0].id, "a");
}

#[tokio::test]
async fn test_json_feed_document_shape() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "<b>rich</b>")).await.unwrap();

    let rendered = svc.render_feed("news", FeedFormat::Json).await.unwrap();
    assert_eq!(rendered.content_type, "application/json");

    let parsed: serde_json::Value = serde_json::from_str(&rendered.body).unwrap();
    assert_eq!(parsed["version"], "https://jsonfeed.org/version/1.1");
    assert_eq!(parsed["title"], "News");
    assert_eq!(parsed["home_page_url"], "https://example.com");
    assert_eq!(parsed["feed_url"], "https://example.com/feed/news/json");
    assert_eq!(parsed["items"][0]["content_html"], "<b>rich</b>");
}

#[tokio::test]
async fn test_rendering_same_ledger_twice_is_byte_identical() {
    let svc = test_service();
    svc.upsert_config("news", test_patch("News")).await.unwrap();
    svc.add_item("news", test_item("a", "first")).await.unwrap();
    svc.add_item("news", test_item("bb", "second")).await.unwrap();

    for format in [
        FeedFormat::Rss,
        FeedFormat::Atom,
        FeedFormat::Json,
        FeedFormat::Raw,
    ] {
        let first = svc.render_feed("news", format).await.unwrap();
        let second = svc.render_feed("news", format).await.unwrap();
        assert_eq!(first.body, second.body, "format {format} not deterministic");
    }
}

#[tokio::test]
async fn test_render_unknown_feed_is_not_found() {
    let svc = test_service();
    let err = svc.render_feed("ghost", FeedFormat::Rss).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_unknown_format_string_rejected() {
    let err = "yaml".parse::<FeedFormat>().unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}
