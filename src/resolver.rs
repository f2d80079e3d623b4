use crate::diagnostics::IntermediateDiagnostic;
use crate::document::{SourceDocument, Span};

/// A diagnostic with the span that should be highlighted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDiagnostic {
    pub span: Span,
    pub line_index: usize,
    pub category: String,
    pub message: String,
}

// AIDEV-NOTE: Tool line/column numbers drift after macro expansion, so the literal token
// is searched from the start of the reported line through the rest of the document.
// It can land on an unrelated later occurrence; that imprecision is accepted.
pub fn resolve(
    diagnostic: &IntermediateDiagnostic,
    document: &SourceDocument,
) -> ResolvedDiagnostic {
    let line_span = document
        .line_span(diagnostic.line_index)
        .unwrap_or(diagnostic.line_span);

    let span = if diagnostic.token.is_empty() {
        line_span
    } else {
        match document.find_literal(&diagnostic.token, line_span.start) {
            Some(found) => found,
            None => {
                tracing::trace!(token = %diagnostic.token, "token not found, using line span");
                line_span
            }
        }
    };

    ResolvedDiagnostic {
        span,
        line_index: diagnostic.line_index,
        category: diagnostic.category.clone(),
        message: diagnostic.description.clone(),
    }
}

pub fn resolve_all(
    diagnostics: &[IntermediateDiagnostic],
    document: &SourceDocument,
) -> Vec<ResolvedDiagnostic> {
    diagnostics
        .iter()
        .map(|diagnostic| resolve(diagnostic, document))
        .collect()
}
