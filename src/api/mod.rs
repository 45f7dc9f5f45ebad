//! Miniflux REST API access.
//!
//! - [`client`] - endpoint construction and authenticated calls
//! - [`types`] - request/response payloads

mod client;
mod types;

pub use client::{build_endpoint, ApiError, MinifluxClient, API_VERSION, AUTH_HEADER, DEFAULT_TIMEOUT};
pub use types::{
    Enclosure, EntriesPage, Entry, EntryFeed, EntryStatus, EntryStatusUpdate, Feed,
    FeedRulesUpdate,
};
