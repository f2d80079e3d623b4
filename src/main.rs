mod cli;
mod diagnostics;
mod document;
mod error;
mod file_watcher;
mod resolver;
mod runner;
mod scheduler;
mod session;
mod settings;
mod state;
mod terminal;

use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use file_watcher::FileWatcher;
use runner::ValidationRunner;
use scheduler::ValidationScheduler;
use session::{Submission, ValidationSession};
use settings::Settings;
use state::{Applied, DocumentState};
use terminal::TerminalSurface;

type TerminalSession = ValidationSession<TerminalSurface<Stdout>>;

const DEFAULT_LOG_FILTER: &str = "glsv=warn";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;

    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli)?;
    let source = cli.load_source()?;

    let runner = Arc::new(ValidationRunner::from_settings(&settings)?);
    tracing::debug!(
        program = %runner.tool().program().display(),
        cwd = %runner.tool().install_dir().display(),
        spec = ?settings.spec,
        "validator configured"
    );
    let scheduler = ValidationScheduler::new(runner, settings.workers);

    let name = match cli.document_path() {
        Some(path) => path.display().to_string(),
        None => "<stdin>".to_string(),
    };
    let state = DocumentState::new(cli.document_path().cloned(), source);
    let surface = TerminalSurface::new(stdout(), name, cli.watch);
    let mut session = ValidationSession::new(settings, state, scheduler, surface);
    place_cursor(&cli, &mut session);

    if cli.watch {
        run_watch(&cli, &mut session)
    } else {
        let clean = run_once(&mut session);
        if !clean {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(DEFAULT_LOG_FILTER),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;
    Ok(())
}

fn place_cursor(cli: &Cli, session: &mut TerminalSession) {
    let Some(cursor) = cli.at else {
        return;
    };
    match session
        .state()
        .document()
        .offset_at(cursor.line - 1, cursor.column - 1)
    {
        Some(offset) => session.on_selection_changed(offset),
        None => tracing::warn!(line = cursor.line, "cursor is past the end of the document"),
    }
}

// AIDEV-NOTE: One-shot mode still goes through the scheduler so both modes share a path
fn run_once(session: &mut TerminalSession) -> bool {
    match session.on_load() {
        Submission::Disabled => return true,
        Submission::Rejected => return false,
        Submission::Submitted => {}
    }

    match session.pump_blocking(None) {
        Some(Applied::Current) => session.state().errors().is_empty(),
        Some(Applied::Failed(_)) => false,
        // Nothing edits the document in one-shot mode, so no outcome can be stale
        Some(Applied::Stale) | None => false,
    }
}

fn run_watch(cli: &Cli, session: &mut TerminalSession) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = cli.document_path().cloned() else {
        return Err("--watch needs a shader file, not stdin".into());
    };

    let mut file_watcher = FileWatcher::new(&path)?;
    session.on_load();

    loop {
        if file_watcher.check_for_changes() {
            match std::fs::read_to_string(&path) {
                // A plain re-save still re-validates, like an editor's post-save hook
                Ok(source) if source == session.state().document().text() => {
                    session.on_save(None);
                }
                Ok(source) => {
                    session.on_modified(source);
                    place_cursor(cli, session);
                }
                Err(e) => tracing::warn!("File read error: {e}"),
            }
        }

        // Doubles as the loop's frame pacing
        session.pump_blocking(Some(Duration::from_millis(20)));
        session.pump();
    }
}
