//! Text helpers for rendering server-supplied strings in the terminal.

mod text;

pub use text::{display_width, single_line, truncate_to_width};
