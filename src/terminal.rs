use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
};

use crate::document::SourceDocument;
use crate::error::ToolInvocationError;
use crate::resolver::ResolvedDiagnostic;
use crate::session::EditorSurface;

// AIDEV-NOTE: Terminal stand-in for an editor: highlights become caret underlines
pub struct TerminalSurface<W: Write> {
    out: W,
    name: String,
    clear_screen: bool,
    status: Option<String>,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, name: impl Into<String>, clear_screen: bool) -> Self {
        Self {
            out,
            name: name.into(),
            clear_screen,
            status: None,
        }
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    fn render(
        &mut self,
        diagnostics: &[ResolvedDiagnostic],
        document: &SourceDocument,
    ) -> io::Result<()> {
        if self.clear_screen {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        }

        if diagnostics.is_empty() {
            queue!(
                self.out,
                SetForegroundColor(Color::Green),
                Print(format!("{}: no errors\n", self.name)),
                ResetColor
            )?;
        }

        for diagnostic in diagnostics {
            self.render_diagnostic(diagnostic, document)?;
        }

        self.out.flush()
    }

    fn render_diagnostic(
        &mut self,
        diagnostic: &ResolvedDiagnostic,
        document: &SourceDocument,
    ) -> io::Result<()> {
        let (line, column) = document.position_of(diagnostic.span.start);
        let line_span = document.line_spans()[line];
        let line_text = document.slice(line_span);

        // Underline stays on the first line of the span
        let end = diagnostic.span.end.min(line_span.end).max(diagnostic.span.start);
        let width = document
            .text()
            .get(diagnostic.span.start..end)
            .map(|text| text.chars().count())
            .unwrap_or(0)
            .max(1);

        let category = if diagnostic.category.is_empty() {
            "error"
        } else {
            diagnostic.category.as_str()
        };
        let color = if category.eq_ignore_ascii_case("warning") {
            Color::Yellow
        } else {
            Color::Red
        };

        let number = (line + 1).to_string();
        let gutter = " ".repeat(number.len());

        // The token search can move the span away from the line the tool blamed
        let moved = if line == diagnostic.line_index {
            String::new()
        } else {
            format!(" (reported on line {})", diagnostic.line_index + 1)
        };

        queue!(
            self.out,
            SetForegroundColor(color),
            SetAttribute(Attribute::Bold),
            Print(category),
            ResetColor,
            SetAttribute(Attribute::Reset),
            Print(format!(": {}\n", diagnostic.message)),
            SetForegroundColor(Color::Blue),
            Print(format!("{gutter}--> ")),
            ResetColor,
            Print(format!("{}:{}:{}{moved}\n", self.name, line + 1, column + 1)),
            SetForegroundColor(Color::Blue),
            Print(format!("{number} | ")),
            ResetColor,
            Print(format!("{line_text}\n")),
            SetForegroundColor(Color::Blue),
            Print(format!("{gutter} | ")),
            SetForegroundColor(color),
            Print(format!("{}{}\n", " ".repeat(column), "^".repeat(width))),
            ResetColor
        )
    }

    fn write_status(&mut self, message: &str) -> io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(Color::Cyan),
            Print(format!("{message}\n")),
            ResetColor
        )?;
        self.out.flush()
    }
}

impl<W: Write> EditorSurface for TerminalSurface<W> {
    fn highlight(&mut self, diagnostics: &[ResolvedDiagnostic], document: &SourceDocument) {
        if let Err(e) = self.render(diagnostics, document) {
            tracing::error!("failed to write diagnostics: {e}");
        }
    }

    // Scrollback can't be un-printed; the next highlight() redraws
    fn clear_highlights(&mut self) {}

    fn set_status(&mut self, message: &str) {
        if self.status.as_deref() == Some(message) {
            return;
        }
        self.status = Some(message.to_string());
        if let Err(e) = self.write_status(message) {
            tracing::error!("failed to write status: {e}");
        }
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn notify_error(&mut self, error: &ToolInvocationError) {
        let written = queue!(
            self.out,
            SetForegroundColor(Color::Red),
            SetAttribute(Attribute::Bold),
            Print("glsv: "),
            SetAttribute(Attribute::Reset),
            ResetColor,
            Print(format!("{error}\n"))
        )
        .and_then(|_| self.out.flush());
        if let Err(e) = written {
            tracing::error!("failed to write notice: {e}");
        }
    }
}
