//! Source files and locations.

use std::fmt;

/// A 1-based line and column position in a source file.
///
/// Line and column 0 mean "no source location" (e.g. a diagnostic about
/// the compilation as a whole).
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Creates a location from a 1-based line and column.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Returns `true` if this location points into a file.
    pub fn is_valid(self) -> bool {
        self.line > 0 && self.column > 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open range `[start, end)` of locations in a single file.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    /// Creates a span covering `[start, end)`.
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Creates a zero-width span at a single location.
    pub fn point(at: Location) -> Self {
        Self { start: at, end: at }
    }

    /// Returns `true` if this span points into a file.
    pub fn is_valid(self) -> bool {
        self.start.is_valid()
    }

    /// Returns the smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// An immutable source file: a name plus UTF-8 content.
///
/// Line starts are indexed on construction so diagnostics can quote any
/// line without re-scanning. The content is never mutated after creation.
#[derive(Clone, Debug)]
pub struct SourceFile {
    name: String,
    content: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Creates a source file from a name and its full content.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut line_starts = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name: name.into(),
            content,
            line_starts,
        }
    }

    /// The file name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full source text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The number of lines in the file. An empty file has one (empty) line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns the text of the 1-based `line`, without the trailing
    /// newline. Returns `None` for out-of-range lines.
    pub fn line(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        let idx = (line - 1) as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&next| next - 1)
            .unwrap_or(self.content.len());
        let mut text = &self.content[start..end];
        if let Some(stripped) = text.strip_suffix('\r') {
            text = stripped;
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup() {
        let file = SourceFile::new("test.wgsl", "fn main() {\n    return;\n}\n");
        assert_eq!(file.line(1), Some("fn main() {"));
        assert_eq!(file.line(2), Some("    return;"));
        assert_eq!(file.line(3), Some("}"));
        assert_eq!(file.line(0), None);
        assert_eq!(file.line(5), None);
    }

    #[test]
    fn line_lookup_crlf() {
        let file = SourceFile::new("test.wgsl", "a\r\nb\r\n");
        assert_eq!(file.line(1), Some("a"));
        assert_eq!(file.line(2), Some("b"));
    }

    #[test]
    fn empty_file_has_one_line() {
        let file = SourceFile::new("empty.wgsl", "");
        assert_eq!(file.line_count(), 1);
        assert_eq!(file.line(1), Some(""));
    }

    #[test]
    fn no_trailing_newline() {
        let file = SourceFile::new("t", "one\ntwo");
        assert_eq!(file.line(2), Some("two"));
    }

    #[test]
    fn span_union() {
        let a = Span::new(Location::new(1, 3), Location::new(1, 7));
        let b = Span::new(Location::new(2, 1), Location::new(2, 4));
        let joined = a.to(b);
        assert_eq!(joined.start, Location::new(1, 3));
        assert_eq!(joined.end, Location::new(2, 4));
    }

    #[test]
    fn invalid_location() {
        assert!(!Location::default().is_valid());
        assert!(Location::new(1, 1).is_valid());
        assert!(!Span::default().is_valid());
    }
}
