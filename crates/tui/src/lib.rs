mod effects;
mod render;

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use kozani_core::keymap::{Key, KeyInput, Modifiers};
use kozani_core::schema_tree::MetadataSource;
use kozani_core::{App, AppEvent};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

pub use effects::{EffectRunner, Services};

const TICK_RATE: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub fn run(services: Services) -> Result<(), TuiError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("kozani-worker")
        .build()?;

    let metadata = Arc::clone(&services.metadata);
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &runtime, services);
    let restore_result = restore_terminal(&mut terminal);
    runtime.block_on(close_metadata(metadata.as_ref()));

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(())
}

async fn close_metadata(metadata: &dyn MetadataSource) {
    if tokio::time::timeout(SHUTDOWN_GRACE, metadata.close())
        .await
        .is_err()
    {
        tracing::warn!("timed out closing database connections");
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &Runtime,
    services: Services,
) -> Result<(), TuiError> {
    let (events_tx, mut events_rx) = unbounded_channel();
    let runner = EffectRunner::new(runtime.handle().clone(), services, events_tx);
    let mut app = App::new();
    runner.run_all(app.boot());
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render::render(frame, &app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(input) = map_key_event(key) {
                        runner.run_all(app.handle(AppEvent::Key(input)));
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            drain_events(&mut app, &runner, &mut events_rx);
            last_tick = Instant::now();
        }

        if app.should_quit() {
            tracing::info!("exiting");
            break;
        }
    }

    Ok(())
}

fn drain_events(app: &mut App, runner: &EffectRunner, events: &mut UnboundedReceiver<AppEvent>) {
    while let Ok(event) = events.try_recv() {
        runner.run_all(app.handle(event));
    }
}

fn map_key_event(key: KeyEvent) -> Option<KeyInput> {
    let mapped = match key.code {
        KeyCode::Char(ch) => Key::Char(ch),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Tab => Key::Tab,
        _ => return None,
    };
    Some(KeyInput {
        key: mapped,
        modifiers: Modifiers {
            ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
            alt: key.modifiers.contains(KeyModifiers::ALT),
            shift: key.modifiers.contains(KeyModifiers::SHIFT),
        },
    })
}
