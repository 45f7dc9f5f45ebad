//! Rule dialog: pattern field, block/keep choice, save and cancel.
//!
//! The dialog is a plain state machine driven by key presses; the event loop
//! performs the actual save and feeds the result back through
//! [`RuleDialog::finish_save`].

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Position},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::helpers::centered_rect;
use crate::i18n::Messages;
use crate::rules::{RuleApplied, RuleError, RuleType};
use crate::util::{display_width, single_line, truncate_to_width};

/// Dialog controls in focus order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogField {
    Pattern,
    RuleType,
    Save,
    Cancel,
}

impl DialogField {
    fn next(self) -> Self {
        match self {
            DialogField::Pattern => DialogField::RuleType,
            DialogField::RuleType => DialogField::Save,
            DialogField::Save => DialogField::Cancel,
            DialogField::Cancel => DialogField::Pattern,
        }
    }

    fn prev(self) -> Self {
        match self {
            DialogField::Pattern => DialogField::Cancel,
            DialogField::RuleType => DialogField::Pattern,
            DialogField::Save => DialogField::RuleType,
            DialogField::Cancel => DialogField::Save,
        }
    }
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogAction {
    None,
    /// Persist `pattern` as a `rule_type` rule.
    Save { pattern: String, rule_type: RuleType },
    Cancel,
}

/// How a dialog session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    /// The rule reached the server. The entry list should be reloaded.
    Saved { message: String },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RuleDialog {
    feed_id: i64,
    feed_title: Option<String>,
    pattern: String,
    /// Cursor position in characters.
    cursor: usize,
    rule_type: RuleType,
    focus: DialogField,
    error: Option<String>,
    saving: bool,
}

impl RuleDialog {
    pub fn new(feed_id: i64) -> Self {
        Self {
            feed_id,
            feed_title: None,
            pattern: String::new(),
            cursor: 0,
            rule_type: RuleType::Block,
            focus: DialogField::Pattern,
            error: None,
            saving: false,
        }
    }

    pub fn with_feed_title(mut self, title: impl Into<String>) -> Self {
        self.feed_title = Some(title.into());
        self
    }

    pub fn feed_id(&self) -> i64 {
        self.feed_id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn focus(&self) -> DialogField {
        self.focus
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.pattern
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.pattern.len())
    }

    fn char_len(&self) -> usize {
        self.pattern.chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let idx = self.byte_index(self.cursor);
        self.pattern.insert(idx, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let idx = self.byte_index(self.cursor);
        self.pattern.remove(idx);
    }

    fn delete(&mut self) {
        if self.cursor < self.char_len() {
            let idx = self.byte_index(self.cursor);
            self.pattern.remove(idx);
        }
    }

    /// Save request for the current input, or `None` when the pattern is blank.
    fn submit(&mut self) -> DialogAction {
        if self.pattern.trim().is_empty() {
            return DialogAction::None;
        }
        self.saving = true;
        self.error = None;
        DialogAction::Save {
            pattern: self.pattern.clone(),
            rule_type: self.rule_type,
        }
    }

    /// Handle one key press. Keys are ignored while a save is in flight.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> DialogAction {
        if self.saving {
            return DialogAction::None;
        }

        match code {
            KeyCode::Esc => return DialogAction::Cancel,
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return DialogAction::None;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                return DialogAction::None;
            }
            KeyCode::Enter => {
                return match self.focus {
                    DialogField::Cancel => DialogAction::Cancel,
                    _ => self.submit(),
                };
            }
            _ => {}
        }

        match self.focus {
            DialogField::Pattern => match code {
                KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.pattern.clear();
                    self.cursor = 0;
                }
                KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
                    self.insert_char(c)
                }
                KeyCode::Backspace => self.backspace(),
                KeyCode::Delete => self.delete(),
                KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
                KeyCode::Right => self.cursor = (self.cursor + 1).min(self.char_len()),
                KeyCode::Home => self.cursor = 0,
                KeyCode::End => self.cursor = self.char_len(),
                KeyCode::Down => self.focus = DialogField::RuleType,
                _ => {}
            },
            DialogField::RuleType => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') => {
                    self.rule_type = self.rule_type.toggled()
                }
                KeyCode::Char('b') => self.rule_type = RuleType::Block,
                KeyCode::Char('k') => self.rule_type = RuleType::Keep,
                KeyCode::Up => self.focus = DialogField::Pattern,
                KeyCode::Down => self.focus = DialogField::Save,
                _ => {}
            },
            DialogField::Save | DialogField::Cancel => match code {
                KeyCode::Left => self.focus = DialogField::Save,
                KeyCode::Right => self.focus = DialogField::Cancel,
                KeyCode::Up => self.focus = DialogField::RuleType,
                _ => {}
            },
        }
        DialogAction::None
    }

    /// Feed back the result of a save.
    ///
    /// Returns the outcome when the dialog should close: on success, and on
    /// failures that happened after the rule was persisted. Any other failure
    /// keeps the dialog open with the error shown so the user can retry.
    pub fn finish_save(
        &mut self,
        result: &Result<RuleApplied, RuleError>,
        messages: &Messages,
    ) -> Option<DialogOutcome> {
        self.saving = false;
        match result {
            Ok(applied) => Some(DialogOutcome::Saved {
                message: applied.summary(messages),
            }),
            Err(e) if e.rule_persisted() => Some(DialogOutcome::Saved {
                message: messages.format("rulePersistedTriageFailed", &[&e.localized(messages)]),
            }),
            Err(e) => {
                self.error = Some(e.localized(messages));
                None
            }
        }
    }
}

const DIALOG_WIDTH: u16 = 64;
const DIALOG_HEIGHT: u16 = 14;

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Black).bg(Color::Cyan)
    } else {
        Style::default()
    }
}

/// Draw the dialog as a centered overlay.
pub fn render(f: &mut Frame, dialog: &RuleDialog, messages: &Messages) {
    let area = centered_rect(DIALOG_WIDTH, DIALOG_HEIGHT, f.area());
    if area.width < 20 || area.height < 10 {
        return;
    }
    f.render_widget(Clear, area);

    let mut title = messages.get("dialogTitle");
    let feed_label = match &dialog.feed_title {
        Some(t) => single_line(t).into_owned(),
        None => messages.format("dialogFeed", &[&dialog.feed_id.to_string()]),
    };
    title = format!(" {title}: {feed_label} ");
    if dialog.saving {
        title = format!("{title}- {} ", messages.get("saving"));
    }
    let title = truncate_to_width(&title, area.width.saturating_sub(2) as usize).into_owned();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // rule label
            Constraint::Length(3), // input
            Constraint::Length(1), // type label
            Constraint::Length(2), // radios
            Constraint::Length(1), // buttons
            Constraint::Length(1), // error
            Constraint::Min(1),    // hint
        ])
        .split(inner);

    f.render_widget(Paragraph::new(messages.get("ruleLabel")), rows[0]);

    let input_focused = dialog.focus == DialogField::Pattern;
    let input_block = Block::default().borders(Borders::ALL).border_style(if input_focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    });
    let input_inner = input_block.inner(rows[1]);
    let input = if dialog.pattern.is_empty() {
        Paragraph::new(Span::styled(
            messages.get("rulePlaceholder"),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        // Keep the cursor in view for long patterns
        let before: String = dialog.pattern.chars().take(dialog.cursor).collect();
        let overflow = display_width(&before).saturating_sub(input_inner.width.saturating_sub(1) as usize);
        let visible: String = dialog.pattern.chars().skip(overflow).collect();
        Paragraph::new(visible)
    };
    f.render_widget(input.block(input_block), rows[1]);
    if input_focused && !dialog.saving {
        let before: String = dialog.pattern.chars().take(dialog.cursor).collect();
        let x = (display_width(&before) as u16).min(input_inner.width.saturating_sub(1));
        f.set_cursor_position(Position::new(input_inner.x + x, input_inner.y));
    }

    f.render_widget(Paragraph::new(messages.get("typeLabel")), rows[2]);

    let radio = |rule_type: RuleType, key: &str| {
        let mark = if dialog.rule_type == rule_type { "(•) " } else { "( ) " };
        let focused = dialog.focus == DialogField::RuleType && dialog.rule_type == rule_type;
        Line::from(Span::styled(
            format!("{mark}{}", messages.get(key)),
            focus_style(focused),
        ))
    };
    f.render_widget(
        Paragraph::new(vec![
            radio(RuleType::Block, "blockRule"),
            radio(RuleType::Keep, "keepRule"),
        ]),
        rows[3],
    );

    let buttons = Line::from(vec![
        Span::styled(
            format!("[ {} ]", messages.get("saveButton")),
            focus_style(dialog.focus == DialogField::Save),
        ),
        Span::raw("  "),
        Span::styled(
            format!("[ {} ]", messages.get("cancelButton")),
            focus_style(dialog.focus == DialogField::Cancel),
        ),
    ]);
    f.render_widget(Paragraph::new(buttons), rows[4]);

    if let Some(error) = &dialog.error {
        f.render_widget(
            Paragraph::new(Span::styled(
                error.as_str(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))
            .wrap(Wrap { trim: true }),
            rows[5],
        );
    }

    f.render_widget(
        Paragraph::new(Span::styled(
            messages.get("dialogHint"),
            Style::default().fg(Color::DarkGray),
        )),
        rows[6],
    );
}
