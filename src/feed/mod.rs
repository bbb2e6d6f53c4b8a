//! Feed registry and item ledger.
//!
//! The registry owns per-feed configuration records; the ledger owns the
//! bounded, most-recent-first item list and its GUID index. Both talk to the
//! backing store through [`crate::store::KeyValueStore`] and share no other
//! state.

mod ledger;
mod registry;
mod types;

pub use ledger::ItemLedger;
pub use registry::FeedRegistry;
pub use types::{
    Author, Enclosure, FeedConfig, FeedConfigPatch, Item, NewItem, DEFAULT_LANGUAGE,
    DEFAULT_MAX_ITEMS,
};
