//! Terminal event loops.
//!
//! Both loops multiplex crossterm's async event stream with SIGINT/SIGTERM.
//! A rule save is awaited inline, so at most one runs at a time and no key
//! presses are handled while it is in flight.

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io::{self, Stdout};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::browse::{self, BrowseAction, BrowseState};
use super::dialog::{self, DialogAction, DialogOutcome, RuleDialog};
use crate::api::Entry;
use crate::config::Config;
use crate::i18n::Messages;
use crate::rules::RuleService;
use crate::settings::SettingsStore;
use crate::thumbnail::ThumbnailIndex;
use crate::watch::EntryListEvents;

/// Raw mode and alternate screen for the lifetime of the guard.
///
/// The terminal is left exactly once: by `restore`, or on drop when a loop
/// exits early through `?`.
struct TerminalGuard<B: Backend = CrosstermBackend<Stdout>> {
    terminal: Terminal<B>,
    leave: fn(&mut Terminal<B>) -> io::Result<()>,
    active: bool,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        // Restore the terminal before the default hook prints the panic.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            original_hook(panic_info);
        }));

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                return Err(e.into());
            }
        };
        Ok(Self::new(terminal, leave_crossterm))
    }
}

impl<B: Backend> TerminalGuard<B> {
    fn new(terminal: Terminal<B>, leave: fn(&mut Terminal<B>) -> io::Result<()>) -> Self {
        Self {
            terminal,
            leave,
            active: true,
        }
    }

    fn leave_once(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        (self.leave)(&mut self.terminal)
    }

    fn restore(mut self) -> Result<()> {
        self.leave_once()?;
        Ok(())
    }
}

impl<B: Backend> Drop for TerminalGuard<B> {
    fn drop(&mut self) {
        if let Err(e) = self.leave_once() {
            tracing::warn!(error = %e, "Failed to restore terminal");
        }
    }
}

/// Every step runs even if an earlier one fails; the first error wins.
fn leave_crossterm(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    let raw = disable_raw_mode();
    let screen = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let cursor = terminal.show_cursor();
    raw.and(screen).and(cursor)
}

/// Shutdown signals, pending forever on platforms without them.
struct Signals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            sigterm: signal(SignalKind::terminate())?,
            #[cfg(unix)]
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = self.sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Next key press, or `None` when the input stream ended.
async fn next_key(
    events: &mut EventStream,
) -> Option<crossterm::event::KeyEvent> {
    loop {
        match events.next().await? {
            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => return Some(key),
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Terminal event stream error");
                return None;
            }
        }
    }
}

/// Fetch the unread list, localizing any failure for the status bar.
async fn load_entries<S: SettingsStore>(
    service: &RuleService<S>,
    limit: u32,
    messages: &Messages,
) -> Result<Vec<Entry>, String> {
    let client = service.client().map_err(|e| e.localized(messages))?;
    match client.unread_entries(limit).await {
        Ok(page) => Ok(page.into_entries()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load entries");
            Err(messages.format("loadEntriesError", &[&e.detail()]))
        }
    }
}

async fn reload<S: SettingsStore>(
    state: &mut BrowseState,
    events: &mut EntryListEvents,
    service: &RuleService<S>,
    config: &Config,
    messages: &Messages,
) {
    state.set_loading(true);
    match load_entries(service, config.browse_limit, messages).await {
        Ok(entries) => {
            tracing::debug!(count = entries.len(), "Loaded unread entries");
            events.publish(&entries);
            state.set_entries(entries);
        }
        Err(message) => {
            state.set_loading(false);
            state.set_status(message);
        }
    }
}

/// Browse unread entries and add rules from the selected entry's feed.
pub async fn run_browse<S: SettingsStore>(
    service: &RuleService<S>,
    config: &Config,
    messages: &Messages,
) -> Result<()> {
    let mut events = EntryListEvents::new();
    let thumbnails = config.thumbnails.then(|| {
        let index = ThumbnailIndex::new();
        index.attach(&mut events);
        index
    });
    let mut state = BrowseState::new(thumbnails);

    let mut signals = Signals::install()?;
    let mut guard = TerminalGuard::enter()?;
    let mut input = EventStream::new();

    guard.terminal.draw(|f| browse::render(f, &state, messages))?;
    reload(&mut state, &mut events, service, config, messages).await;

    loop {
        guard.terminal.draw(|f| browse::render(f, &state, messages))?;

        let key = tokio::select! {
            biased;
            _ = signals.recv() => break,
            key = next_key(&mut input) => match key {
                Some(key) => key,
                None => break,
            },
        };

        match state.handle_key(key.code, key.modifiers, messages) {
            BrowseAction::None => {}
            BrowseAction::Quit => break,
            BrowseAction::Reload => {
                reload(&mut state, &mut events, service, config, messages).await;
            }
            BrowseAction::OpenUrl(url) => {
                if let Err(e) = open::that(&url) {
                    tracing::warn!(url = %url, error = %e, "Failed to open browser");
                    state.set_status(messages.format("openFailed", &[&e.to_string()]));
                }
            }
            BrowseAction::SaveRule {
                feed_id,
                pattern,
                rule_type,
            } => {
                // Show the saving state before blocking on the request.
                guard.terminal.draw(|f| browse::render(f, &state, messages))?;
                let result = service.update_feed_rule(feed_id, &pattern, rule_type).await;

                let outcome = state
                    .dialog_mut()
                    .and_then(|dialog| dialog.finish_save(&result, messages));
                if let Some(DialogOutcome::Saved { message }) = outcome {
                    state.close_dialog();
                    reload(&mut state, &mut events, service, config, messages).await;
                    state.set_status(message);
                }
            }
        }
    }

    guard.restore()
}

/// Show only the rule dialog for `feed_id` and return how it ended.
pub async fn run_rule_dialog<S: SettingsStore>(
    service: &RuleService<S>,
    messages: &Messages,
    feed_id: i64,
) -> Result<DialogOutcome> {
    let mut dialog = RuleDialog::new(feed_id);

    let mut signals = Signals::install()?;
    let mut guard = TerminalGuard::enter()?;
    let mut input = EventStream::new();

    let outcome = loop {
        guard.terminal.draw(|f| dialog::render(f, &dialog, messages))?;

        let key = tokio::select! {
            biased;
            _ = signals.recv() => break DialogOutcome::Cancelled,
            key = next_key(&mut input) => match key {
                Some(key) => key,
                None => break DialogOutcome::Cancelled,
            },
        };

        match dialog.handle_key(key.code, key.modifiers) {
            DialogAction::None => {}
            DialogAction::Cancel => break DialogOutcome::Cancelled,
            DialogAction::Save { pattern, rule_type } => {
                guard.terminal.draw(|f| dialog::render(f, &dialog, messages))?;
                let result = service.update_feed_rule(feed_id, &pattern, rule_type).await;
                if let Some(outcome) = dialog.finish_save(&result, messages) {
                    break outcome;
                }
            }
        }
    };

    guard.restore()?;
    Ok(outcome)
}
