use std::ops::Range;

/// Byte range inside a [`SourceDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    // AIDEV-NOTE: Inclusive at both ends so a caret sitting right after a token still counts
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Immutable snapshot of the text being validated.
///
/// Line spans exclude the `\n` terminator and a preceding `\r`. A text with
/// `n` newlines has `n + 1` lines, so the empty text has one empty line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    text: String,
    lines: Vec<Span>,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = compute_line_spans(&text);
        Self { text, lines }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line_spans(&self) -> &[Span] {
        &self.lines
    }

    pub fn line_span(&self, line_index: usize) -> Option<Span> {
        self.lines.get(line_index).copied()
    }

    pub fn slice(&self, span: Span) -> &str {
        &self.text[span.range()]
    }

    /// Literal (non-regex) forward search for `needle` starting at byte `from`.
    pub fn find_literal(&self, needle: &str, from: usize) -> Option<Span> {
        if needle.is_empty() {
            return None;
        }
        let haystack = self.text.get(from..)?;
        haystack
            .find(needle)
            .map(|pos| Span::new(from + pos, from + pos + needle.len()))
    }

    /// Index of the line containing `offset`, clamped to the last line.
    pub fn line_of_offset(&self, offset: usize) -> usize {
        match self.lines.binary_search_by(|span| span.start.cmp(&offset)) {
            Ok(index) => index,
            Err(0) => 0,
            Err(index) => index - 1,
        }
    }

    /// Byte offset of a 0-based (line, column), the column clamped to the line end.
    pub fn offset_at(&self, line_index: usize, column: usize) -> Option<usize> {
        let span = self.line_span(line_index)?;
        let offset = self
            .slice(span)
            .char_indices()
            .nth(column)
            .map_or(span.end, |(pos, _)| span.start + pos);
        Some(offset)
    }

    /// 0-based (line, column) of `offset`, column counted in chars.
    pub fn position_of(&self, offset: usize) -> (usize, usize) {
        let line = self.line_of_offset(offset);
        let start = self.lines[line].start;
        let column = self
            .text
            .get(start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        (line, column)
    }
}

fn compute_line_spans(text: &str) -> Vec<Span> {
    let mut lines = Vec::new();
    let mut start = 0;

    for (pos, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            let end = if pos > start && text.as_bytes()[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            lines.push(Span::new(start, end));
            start = pos + 1;
        }
    }

    lines.push(Span::new(start, text.len()));
    lines
}
