//! Regex block/keep rules for Miniflux feeds, with backlog triage.
//!
//! Adding a rule appends it to the feed's rule list on the server and then
//! marks the feed's matching unread entries as read.

pub mod api;
pub mod config;
pub mod i18n;
pub mod rules;
pub mod settings;
pub mod thumbnail;
pub mod ui;
pub mod util;
pub mod watch;
