//! Interactive TUI dashboard for monitoring and driving harnesses.

pub mod app;
mod ui;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use sqlx::PgPool;
use warden_core::manager::HarnessManager;

use app::App;

/// Launch the interactive TUI dashboard.
pub async fn run_dashboard(manager: Arc<HarnessManager>, pool: PgPool) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(manager, pool);
    app.refresh().await?;

    let result = run_event_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = app.tick_rate;

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                app.status_message = None;

                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        app.navigate_back();
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.should_quit = true;
                    }
                    KeyCode::Enter => {
                        app.navigate_enter();
                        app.refresh().await?;
                    }
                    KeyCode::Char('j') | KeyCode::Down => {
                        app.move_down();
                    }
                    KeyCode::Char('k') | KeyCode::Up => {
                        app.move_up();
                    }
                    KeyCode::Char('s') => {
                        if let Err(e) = app.start_selected().await {
                            app.status_message = Some(format!("Start failed: {e}"));
                        }
                    }
                    KeyCode::Char('p') => {
                        if let Err(e) = app.pause_selected().await {
                            app.status_message = Some(format!("Pause failed: {e}"));
                        }
                    }
                    KeyCode::Char('u') => {
                        if let Err(e) = app.resume_selected().await {
                            app.status_message = Some(format!("Resume failed: {e}"));
                        }
                    }
                    KeyCode::Char('x') => {
                        if let Err(e) = app.stop_selected().await {
                            app.status_message = Some(format!("Stop failed: {e}"));
                        }
                    }
                    KeyCode::Char('a') => {
                        if let Err(e) = app.approve_selected().await {
                            app.status_message = Some(format!("Approve failed: {e}"));
                        }
                    }
                    KeyCode::Char('r') => {
                        if let Err(e) = app.reject_selected().await {
                            app.status_message = Some(format!("Reject failed: {e}"));
                        }
                    }
                    KeyCode::Char('?') => {
                        app.show_help();
                    }
                    _ => {}
                }
            }
        } else {
            app.refresh().await?;
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
