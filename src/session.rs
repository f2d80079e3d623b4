use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::document::SourceDocument;
use crate::error::ToolInvocationError;
use crate::resolver::ResolvedDiagnostic;
use crate::scheduler::{ValidationOutcome, ValidationScheduler};
use crate::settings::Settings;
use crate::state::{Applied, DocumentState};

const VALID_FILE_ENDINGS: [&str; 6] = ["frag", "vert", "tess", "eval", "geo", "shader"];
pub const INVALID_FILE_ENDING_STATUS: &str = "File name must end in .frag or .vert or .shader";

/// Where diagnostics end up; the editor (or terminal) owns the drawing.
pub trait EditorSurface {
    fn highlight(&mut self, diagnostics: &[ResolvedDiagnostic], document: &SourceDocument);
    fn clear_highlights(&mut self);
    fn set_status(&mut self, message: &str);
    fn clear_status(&mut self);
    fn notify_error(&mut self, error: &ToolInvocationError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Submitted,
    Disabled,
    Rejected,
}

/// Unsaved documents always pass; the tool picks the stage from the extension.
pub fn has_valid_file_ending(filename: Option<&Path>) -> bool {
    match filename {
        None => true,
        Some(path) => {
            let name = path.to_string_lossy();
            VALID_FILE_ENDINGS.iter().any(|ending| name.ends_with(ending))
        }
    }
}

// AIDEV-NOTE: Editor-integration layer. Triggers submit work to the scheduler; outcomes
// are pulled back on the owning thread by pump()/pump_blocking() and filtered by revision.
pub struct ValidationSession<S: EditorSurface> {
    settings: Settings,
    state: DocumentState,
    scheduler: ValidationScheduler,
    surface: S,
    selection: Option<usize>,
}

impl<S: EditorSurface> ValidationSession<S> {
    pub fn new(
        settings: Settings,
        state: DocumentState,
        scheduler: ValidationScheduler,
        surface: S,
    ) -> Self {
        Self {
            settings,
            state,
            scheduler,
            surface,
            selection: None,
        }
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn on_load(&mut self) -> Submission {
        self.run_validator()
    }

    pub fn on_save(&mut self, filename: Option<PathBuf>) -> Submission {
        if filename.is_some() {
            self.state.set_filename(filename);
        }
        self.run_validator()
    }

    pub fn on_modified(&mut self, text: impl Into<String>) -> Submission {
        self.state.edit(text);
        self.run_validator()
    }

    pub fn on_selection_changed(&mut self, offset: usize) {
        self.selection = Some(offset);
        self.refresh_status();
    }

    fn run_validator(&mut self) -> Submission {
        if !self.settings.enabled {
            self.surface.clear_status();
            self.clear_errors();
            return Submission::Disabled;
        }

        if !has_valid_file_ending(self.state.filename()) {
            self.surface.set_status(INVALID_FILE_ENDING_STATUS);
            self.clear_errors();
            return Submission::Rejected;
        }

        self.surface.clear_status();
        tracing::debug!(revision = self.state.revision(), "requesting validation");
        self.scheduler.submit(self.state.request());
        Submission::Submitted
    }

    fn clear_errors(&mut self) {
        self.state.clear_errors();
        self.surface.clear_highlights();
    }

    /// Apply every outcome that is ready, returning how many were current.
    pub fn pump(&mut self) -> usize {
        self.scheduler
            .take_ready()
            .into_iter()
            .map(|outcome| self.deliver(outcome))
            .filter(|applied| !matches!(applied, Applied::Stale))
            .count()
    }

    /// Wait for the next outcome and apply it.
    pub fn pump_blocking(&mut self, timeout: Option<Duration>) -> Option<Applied> {
        let outcome = self.scheduler.wait_next(timeout)?;
        Some(self.deliver(outcome))
    }

    fn deliver(&mut self, outcome: ValidationOutcome) -> Applied {
        let applied = self.state.apply(outcome);
        match &applied {
            Applied::Current => {
                self.surface
                    .highlight(self.state.errors(), self.state.document());
                self.refresh_status();
            }
            Applied::Stale => {}
            Applied::Failed(err) => {
                tracing::error!("validation failed: {err}");
                self.surface.clear_highlights();
                self.surface.notify_error(err);
            }
        }
        applied
    }

    fn refresh_status(&mut self) {
        let message = self
            .selection
            .and_then(|offset| self.state.message_at(offset))
            .map(str::to_owned);
        match message {
            Some(message) => self.surface.set_status(&message),
            None => self.surface.clear_status(),
        }
    }
}
