use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use feedstore::config::{Config, StoreBackend};
use feedstore::feed::{FeedConfigPatch, NewItem};
use feedstore::render::FeedFormat;
use feedstore::store::{KeyValueStore, MemoryStore, RedisStore};
use feedstore::FeedService;

#[derive(Parser, Debug)]
#[command(name = "feedstore", about = "Multi-tenant content feed store")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the configured store backend is reachable
    Check,

    /// List all registered feed ids
    ListFeeds,

    /// Register a feed or update its title
    CreateFeed {
        /// Feed id (caller-chosen, immutable)
        feed: String,
        /// Feed title
        #[arg(long)]
        title: Option<String>,
        /// Site URL the feed points back to
        #[arg(long)]
        site_url: Option<String>,
    },

    /// Add one item to a feed's ledger
    AddItem {
        feed: String,
        /// Item link (absolute http/https URL)
        link: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },

    /// Render a feed to stdout in the given format (rss, atom, json, raw)
    Render { feed: String, format: String },

    /// Drop all items from a feed, keeping its configuration
    ClearItems { feed: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).context("Failed to load configuration")?;

    match config.store.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(config.store.url())
                .await
                .context("Failed to connect to Redis")?;
            if let Command::Check = args.command {
                store.ping().await.context("Redis ping failed")?;
                println!("Store reachable: redis");
                return Ok(());
            }
            run(store, &config, args.command).await
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, data will not survive this process");
            if let Command::Check = args.command {
                println!("Store reachable: memory");
                return Ok(());
            }
            run(MemoryStore::new(), &config, args.command).await
        }
    }
}

async fn run<S: KeyValueStore>(store: S, config: &Config, command: Command) -> Result<()> {
    let service = FeedService::new(store, config.rate_limit.settings());

    match command {
        // Handled before the store is passed in.
        Command::Check => Ok(()),

        Command::ListFeeds => {
            let ids = service.list_feeds().await?;
            if ids.is_empty() {
                eprintln!("No feeds registered.");
            }
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }

        Command::CreateFeed {
            feed,
            title,
            site_url,
        } => {
            let patch = FeedConfigPatch {
                title,
                site_url,
                ..FeedConfigPatch::default()
            };
            let stored = service.upsert_config(&feed, patch).await?;
            println!("Feed '{}' configured (max_items: {})", stored.id, stored.max_items);
            Ok(())
        }

        Command::AddItem {
            feed,
            link,
            title,
            content,
        } => {
            let item = NewItem {
                title,
                content,
                ..NewItem::with_link(link)
            };
            let stored = service.add_item(&feed, item).await?;
            println!("Stored item {} (guid: {})", stored.id, stored.guid);
            Ok(())
        }

        Command::Render { feed, format } => {
            let format: FeedFormat = format.parse()?;
            let rendered = service.render_feed(&feed, format).await?;
            println!("{}", rendered.body);
            Ok(())
        }

        Command::ClearItems { feed } => {
            service.clear_items(&feed).await?;
            println!("Cleared items for feed '{feed}'");
            Ok(())
        }
    }
}
