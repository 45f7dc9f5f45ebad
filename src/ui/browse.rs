//! Unread entry list with a per-entry "add rule" action.

use chrono::Utc;
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::dialog::{self, DialogAction, RuleDialog};
use super::helpers::format_relative_time;
use crate::api::Entry;
use crate::i18n::Messages;
use crate::rules::RuleType;
use crate::thumbnail::ThumbnailIndex;
use crate::util::{single_line, truncate_to_width};

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseAction {
    None,
    Quit,
    Reload,
    OpenUrl(String),
    SaveRule {
        feed_id: i64,
        pattern: String,
        rule_type: RuleType,
    },
}

#[derive(Debug, Default)]
pub struct BrowseState {
    entries: Vec<Entry>,
    selected: usize,
    status: Option<String>,
    dialog: Option<RuleDialog>,
    thumbnails: Option<ThumbnailIndex>,
    loading: bool,
}

impl BrowseState {
    pub fn new(thumbnails: Option<ThumbnailIndex>) -> Self {
        Self {
            thumbnails,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn selected_entry(&self) -> Option<&Entry> {
        self.entries.get(self.selected)
    }

    pub fn dialog(&self) -> Option<&RuleDialog> {
        self.dialog.as_ref()
    }

    pub fn dialog_mut(&mut self) -> Option<&mut RuleDialog> {
        self.dialog.as_mut()
    }

    pub fn close_dialog(&mut self) {
        self.dialog = None;
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Replace the list, keeping the selection on the same entry when it survived.
    pub fn set_entries(&mut self, entries: Vec<Entry>) {
        let previous = self.selected_entry().map(|e| e.id);
        self.entries = entries;
        self.selected = previous
            .and_then(|id| self.entries.iter().position(|e| e.id == id))
            .unwrap_or(0)
            .min(self.entries.len().saturating_sub(1));
        self.loading = false;
    }

    fn open_dialog(&mut self) {
        let Some(entry) = self.selected_entry() else {
            return;
        };
        let Some(feed_id) = entry.owning_feed_id() else {
            tracing::debug!(entry_id = entry.id, "Entry has no feed id, not opening rule dialog");
            return;
        };
        let mut dialog = RuleDialog::new(feed_id);
        if let Some(feed) = &entry.feed {
            dialog = dialog.with_feed_title(feed.title.clone());
        }
        self.dialog = Some(dialog);
    }

    pub fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        messages: &Messages,
    ) -> BrowseAction {
        if let Some(dialog) = self.dialog.as_mut() {
            let feed_id = dialog.feed_id();
            return match dialog.handle_key(code, modifiers) {
                DialogAction::None => BrowseAction::None,
                DialogAction::Cancel => {
                    self.dialog = None;
                    BrowseAction::None
                }
                DialogAction::Save { pattern, rule_type } => BrowseAction::SaveRule {
                    feed_id,
                    pattern,
                    rule_type,
                },
            };
        }

        if self.loading {
            return match code {
                KeyCode::Char('q') | KeyCode::Esc => BrowseAction::Quit,
                _ => BrowseAction::None,
            };
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => BrowseAction::Quit,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => BrowseAction::Quit,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected + 1 < self.entries.len() {
                    self.selected += 1;
                }
                BrowseAction::None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                BrowseAction::None
            }
            KeyCode::Char('g') | KeyCode::Home => {
                self.selected = 0;
                BrowseAction::None
            }
            KeyCode::Char('G') | KeyCode::End => {
                self.selected = self.entries.len().saturating_sub(1);
                BrowseAction::None
            }
            KeyCode::Char('r') | KeyCode::Enter => {
                self.open_dialog();
                BrowseAction::None
            }
            KeyCode::Char('R') => BrowseAction::Reload,
            KeyCode::Char('o') => match self.selected_entry().and_then(|e| e.url.clone()) {
                Some(url) => BrowseAction::OpenUrl(url),
                None => {
                    if self.selected_entry().is_some() {
                        self.set_status(messages.get("noEntryUrl"));
                    }
                    BrowseAction::None
                }
            },
            _ => BrowseAction::None,
        }
    }
}

/// Draw the entry list, detail line, status bar and the dialog if open.
pub fn render(f: &mut Frame, state: &BrowseState, messages: &Messages) {
    let area = f.area();
    if area.width < 10 || area.height < 4 {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_list(f, state, messages, chunks[0]);
    render_detail(f, state, messages, chunks[1]);
    render_status(f, state, messages, chunks[2]);

    if let Some(dialog) = &state.dialog {
        dialog::render(f, dialog, messages);
    }
}

fn render_list(f: &mut Frame, state: &BrowseState, messages: &Messages, area: Rect) {
    let now = Utc::now();
    let inner_width = area.width.saturating_sub(2) as usize;

    let items: Vec<ListItem> = if state.entries.is_empty() {
        let text = if state.loading {
            messages.get("loading")
        } else {
            messages.get("browseEmpty")
        };
        vec![ListItem::new(Span::styled(text, Style::default().fg(Color::DarkGray)))]
    } else {
        state
            .entries
            .iter()
            .map(|entry| {
                let age = format_relative_time(entry.published_at, now);
                let feed_title = entry
                    .feed
                    .as_ref()
                    .map(|feed| single_line(&feed.title).into_owned())
                    .unwrap_or_default();
                let title = entry
                    .title
                    .as_deref()
                    .map(single_line)
                    .unwrap_or_default();

                let reserved = age.len() + feed_title.chars().count().min(24) + 4;
                let title_width = inner_width.saturating_sub(reserved).max(8);
                let feed_title = truncate_to_width(&feed_title, 24).into_owned();

                ListItem::new(Line::from(vec![
                    Span::styled(
                        truncate_to_width(&title, title_width).into_owned(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(format!("  {feed_title}"), Style::default().fg(Color::Cyan)),
                    Span::styled(format!("  {age}"), Style::default().fg(Color::DarkGray)),
                ]))
            })
            .collect()
    };

    let title = format!(" {} ({}) ", messages.get("browseTitle"), state.entries.len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

    let mut list_state = ListState::default();
    if !state.entries.is_empty() {
        list_state.select(Some(state.selected));
    }
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_detail(f: &mut Frame, state: &BrowseState, messages: &Messages, area: Rect) {
    let Some(entry) = state.selected_entry() else {
        return;
    };

    let thumbnail = state
        .thumbnails
        .as_ref()
        .and_then(|index| index.get(entry.id));
    let text = match (thumbnail, entry.url.as_deref()) {
        (Some(url), _) => messages.format("thumbnailLabel", &[&url]),
        (None, Some(url)) => url.to_string(),
        (None, None) => String::new(),
    };
    let text = truncate_to_width(&text, area.width as usize).into_owned();
    f.render_widget(
        Paragraph::new(Span::styled(text, Style::default().fg(Color::Gray))),
        area,
    );
}

fn render_status(f: &mut Frame, state: &BrowseState, messages: &Messages, area: Rect) {
    let text = match &state.status {
        Some(status) => status.clone(),
        None => messages.get("browseHint"),
    };
    let text = truncate_to_width(&text, area.width as usize).into_owned();
    f.render_widget(
        Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White)),
        area,
    );
}
