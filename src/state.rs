use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::document::SourceDocument;
use crate::error::ToolInvocationError;
use crate::resolver::ResolvedDiagnostic;
use crate::scheduler::{ValidationOutcome, ValidationRequest};

/// What happened when an outcome reached the document.
#[derive(Debug)]
pub enum Applied {
    /// Outcome matched the current revision and replaced the errors
    Current,
    /// Outcome was computed for an older revision and was dropped
    Stale,
    /// Current revision, but the tool could not be run
    Failed(ToolInvocationError),
}

/// Per-document validation state, owned by the interactive thread.
#[derive(Debug)]
pub struct DocumentState {
    filename: Option<PathBuf>,
    document: Arc<SourceDocument>,
    revision: u64,
    errors: Vec<ResolvedDiagnostic>,
}

impl DocumentState {
    pub fn new(filename: Option<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            filename,
            document: Arc::new(SourceDocument::new(text)),
            revision: 0,
            errors: Vec::new(),
        }
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, filename: Option<PathBuf>) {
        self.filename = filename;
    }

    pub fn document(&self) -> &SourceDocument {
        &self.document
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn errors(&self) -> &[ResolvedDiagnostic] {
        &self.errors
    }

    /// Replace the text and bump the revision.
    pub fn edit(&mut self, text: impl Into<String>) -> u64 {
        self.document = Arc::new(SourceDocument::new(text));
        self.revision += 1;
        self.revision
    }

    /// Snapshot for a validation pass at the current revision.
    pub fn request(&self) -> ValidationRequest {
        ValidationRequest {
            revision: self.revision,
            filename: self.filename.clone(),
            document: Arc::clone(&self.document),
        }
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    // AIDEV-NOTE: Stale outcomes are expected whenever edits outpace the tool, not an error
    pub fn apply(&mut self, outcome: ValidationOutcome) -> Applied {
        if outcome.revision != self.revision {
            tracing::debug!(
                outcome_revision = outcome.revision,
                current_revision = self.revision,
                "discarding stale validation result"
            );
            return Applied::Stale;
        }

        match outcome.result {
            Ok(errors) => {
                self.errors = errors;
                Applied::Current
            }
            Err(err) => {
                self.errors.clear();
                Applied::Failed(err)
            }
        }
    }

    /// Message of the first error whose span contains `offset`.
    pub fn message_at(&self, offset: usize) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.span.contains(offset))
            .map(|error| error.message.as_str())
    }
}
