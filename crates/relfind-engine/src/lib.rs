//! Relation finding for web automation: synthesizes row selectors from
//! demonstrated cells, extracts the relation they describe from page
//! snapshots, and fetches fresh rows incrementally across pagination.

pub mod backend;
pub mod config;
pub mod editor;
pub mod extractor;
pub mod features;
pub mod fetch;
pub mod matcher;
pub mod next_button;
pub mod ranking;
pub mod synthesis;

pub use relfind_common::{dom, error, protocol, selector};
