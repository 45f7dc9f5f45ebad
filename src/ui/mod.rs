//! Terminal user interface.
//!
//! - `loop_runner` - event loops and terminal management
//! - `browse` - unread entry list
//! - `dialog` - rule dialog
//! - `helpers` - shared layout and formatting helpers

mod browse;
mod dialog;
mod helpers;
mod loop_runner;

pub use browse::{BrowseAction, BrowseState};
pub use dialog::{DialogAction, DialogField, DialogOutcome, RuleDialog};
pub use loop_runner::{run_browse, run_rule_dialog};
