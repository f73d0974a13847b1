pub mod app;
pub mod event;
pub mod theme;
pub mod ui;

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::ExecutableCommand;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;

pub use app::App;
use event::{AppEvent, EventHandler};

/// Run the interactive recommender until the user quits.
pub fn run_tui(app: &mut App) -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
        original_hook(info);
    }));

    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;
    info!(books = app.catalog.dataset().len(), "tui started");

    let events = EventHandler::new(Duration::from_millis(250));
    let result = (|| -> Result<()> {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(frame, app))?;
            match events.next()? {
                AppEvent::Key(key) => app.handle_key(key),
                AppEvent::Resize | AppEvent::Tick => {}
            }
        }
        Ok(())
    })();

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}
