use std::io::{self, Stderr};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture, Event,
        EventStream, KeyEvent, KeyEventKind, MouseEvent,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, UnboundedSender};
use vegachat_core::Provider;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

pub const TICK_RATE: Duration = Duration::from_millis(120);

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Paste(String),
    Resize(u16, u16),
    Tick,
    /// Running text of the reply being streamed
    Stream(String),
    /// The request settled; `None` when it failed
    Reply(Option<String>),
    /// Models listed for a provider
    Models(Provider, Vec<String>),
}

impl AppEvent {
    /// Terminal events the app reacts to. Key releases and focus changes are dropped.
    fn from_terminal(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => Some(Self::Key(key)),
            Event::Mouse(mouse) => Some(Self::Mouse(mouse)),
            Event::Paste(text) => Some(Self::Paste(text)),
            Event::Resize(w, h) => Some(Self::Resize(w, h)),
            _ => None,
        }
    }
}

/// Terminal input, ticks and request progress merged into one ordered channel.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: UnboundedSender<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_terminal_reader(tx.clone());
        spawn_ticker(tx.clone(), TICK_RATE);
        Self { rx, tx }
    }

    /// Sender for background tasks that report into the event loop.
    pub fn sender(&self) -> UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

fn spawn_terminal_reader(tx: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut reader = EventStream::new();
        while let Some(event) = reader.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "terminal event stream failed");
                    return;
                }
            };
            if let Some(event) = AppEvent::from_terminal(event) {
                if tx.send(event).is_err() {
                    return;
                }
            }
        }
    });
}

/// Drives the spinner and copy feedback expiry.
fn spawn_ticker(tx: UnboundedSender<AppEvent>, rate: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(rate);
        while tx.send(AppEvent::Tick).is_ok() {
            interval.tick().await;
        }
    });
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(
        io::stderr(),
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    Ok(Terminal::new(CrosstermBackend::new(io::stderr()))?)
}

pub fn restore() -> Result<()> {
    execute!(
        io::stderr(),
        DisableBracketedPaste,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    disable_raw_mode()?;
    Ok(())
}

/// Put the terminal back before the default hook prints the panic.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        tracing::error!(%panic_info, "panic");
        original_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventState, KeyModifiers};

    #[test]
    fn key_releases_are_dropped() {
        let mut release = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        release.state = KeyEventState::NONE;
        assert!(AppEvent::from_terminal(Event::Key(release)).is_none());

        let press = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert!(matches!(
            AppEvent::from_terminal(Event::Key(press)),
            Some(AppEvent::Key(_))
        ));
    }

    #[test]
    fn paste_and_resize_pass_through() {
        assert!(matches!(
            AppEvent::from_terminal(Event::Paste("sk-1".to_string())),
            Some(AppEvent::Paste(text)) if text == "sk-1"
        ));
        assert!(matches!(
            AppEvent::from_terminal(Event::Resize(80, 24)),
            Some(AppEvent::Resize(80, 24))
        ));
        assert!(AppEvent::from_terminal(Event::FocusGained).is_none());
    }

    #[tokio::test]
    async fn ticker_emits_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_ticker(tx, TICK_RATE);

        assert!(matches!(rx.recv().await, Some(AppEvent::Tick)));
        assert!(matches!(rx.recv().await, Some(AppEvent::Tick)));
    }
}
