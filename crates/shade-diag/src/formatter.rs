//! Renders diagnostics as text, quoting the source line with a caret
//! underline aligned to the 1-based column.

use crate::diagnostic::{Diagnostic, DiagnosticList};
use crate::source::SourceFile;

/// Controls which parts of a diagnostic are printed.
#[derive(Clone, Copy, Debug)]
pub struct Style {
    /// Prefix each diagnostic with the file name.
    pub print_file: bool,
    /// Print the severity between the location and the message.
    pub print_severity: bool,
    /// Quote the source line(s) with a caret underline.
    pub print_line: bool,
    /// End the rendered output with a newline.
    pub print_newline_at_end: bool,
    /// Number of spaces a tab expands to in quoted lines.
    pub tab_width: u32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            print_file: true,
            print_severity: true,
            print_line: true,
            print_newline_at_end: false,
            tab_width: 2,
        }
    }
}

/// Formats a [`DiagnosticList`] against the file it refers to.
#[derive(Clone, Debug, Default)]
pub struct Formatter {
    style: Style,
}

impl Formatter {
    /// Creates a formatter with the given style.
    pub fn new(style: Style) -> Self {
        Self { style }
    }

    /// Renders every diagnostic in `list`.
    pub fn format(&self, file: &SourceFile, list: &DiagnosticList) -> String {
        let chunks: Vec<String> = list
            .iter()
            .map(|diag| self.format_diagnostic(file, diag))
            .collect();
        let mut out = chunks.join("\n");
        if self.style.print_newline_at_end && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    fn format_diagnostic(&self, file: &SourceFile, diag: &Diagnostic) -> String {
        let mut out = String::new();
        let span = diag.span;

        if span.is_valid() {
            if self.style.print_file {
                out.push_str(file.name());
                out.push(':');
            }
            out.push_str(&format!("{}:{}", span.start.line, span.start.column));
            if self.style.print_severity {
                out.push_str(&format!(" {}", diag.severity));
            }
            out.push_str(": ");
        } else if self.style.print_severity {
            out.push_str(&format!("{}: ", diag.severity));
        }
        out.push_str(&diag.message);

        if self.style.print_line && span.is_valid() {
            out.push('\n');
            self.quote_lines(file, diag, &mut out);
        }
        out
    }

    /// Quotes each source line covered by the span, with tabs expanded,
    /// and underlines the spanned columns. Caret alignment is skipped for
    /// lines containing non-ASCII text, where column math does not match
    /// glyph widths.
    fn quote_lines(&self, file: &SourceFile, diag: &Diagnostic, out: &mut String) {
        let start = diag.span.start;
        let end = if diag.span.end >= diag.span.start {
            diag.span.end
        } else {
            diag.span.start
        };
        let last_line = end.line.max(start.line);

        for line_no in start.line..=last_line {
            let Some(text) = file.line(line_no) else {
                break;
            };
            let expanded = self.expand_tabs(text);
            out.push_str(&expanded);
            out.push('\n');

            if !text.is_ascii() {
                continue;
            }
            let line_len = expanded.chars().count();
            let (caret_start, caret_count) = if start.line == last_line {
                let s = self.rendered_column(text, start.column);
                let e = if end.column > start.column {
                    self.rendered_column(text, end.column)
                } else {
                    s + 1
                };
                (s, (e - s).max(1))
            } else if line_no == start.line {
                let s = self.rendered_column(text, start.column);
                (s, (line_len + 1 - s).max(1))
            } else if line_no == last_line {
                let e = self.rendered_column(text, end.column);
                (1, (e - 1).max(1))
            } else {
                (1, line_len.max(1))
            };

            for _ in 0..caret_start - 1 {
                out.push(' ');
            }
            for _ in 0..caret_count {
                out.push('^');
            }
            out.push('\n');
        }
    }

    fn expand_tabs(&self, text: &str) -> String {
        let tab: String = " ".repeat(self.style.tab_width as usize);
        text.replace('\t', &tab)
    }

    /// Maps a 1-based source column (counted in characters) to the
    /// corresponding column in the tab-expanded rendering.
    fn rendered_column(&self, text: &str, column: u32) -> usize {
        let mut rendered = 1usize;
        for (i, ch) in text.chars().enumerate() {
            if i + 1 >= column as usize {
                break;
            }
            rendered += if ch == '\t' {
                self.style.tab_width as usize
            } else {
                1
            };
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::source::{Location, Span};

    // Words are tab-delimited to exercise tab expansion.
    const CONTENT: &str = "alpha\tbeta\tgamma\ndelta\tepsilon\tzeta\neta\ttheta\tiota\n";

    fn file() -> SourceFile {
        SourceFile::new("file.wgsl", CONTENT)
    }

    fn diag(severity: Severity, span: Span, message: &str) -> Diagnostic {
        Diagnostic {
            severity,
            span,
            message: message.into(),
        }
    }

    fn range(l0: u32, c0: u32, l1: u32, c1: u32) -> Span {
        Span::new(Location::new(l0, c0), Location::new(l1, c1))
    }

    #[test]
    fn plain_without_line() {
        let fmt = Formatter::new(Style {
            print_file: false,
            print_severity: false,
            print_line: false,
            print_newline_at_end: false,
            tab_width: 2,
        });
        let mut list = DiagnosticList::new();
        list.add(diag(Severity::Note, range(1, 12, 1, 17), "purr"));
        list.add(diag(Severity::Error, range(2, 7, 2, 14), "hiss"));
        assert_eq!(fmt.format(&file(), &list), "1:12: purr\n2:7: hiss");
    }

    #[test]
    fn with_file_and_severity_and_caret() {
        let fmt = Formatter::new(Style::default());
        let mut list = DiagnosticList::new();
        // "gamma" occupies source columns 12..17 on line 1; two tabs
        // precede it, so the rendered caret starts at column 14.
        list.add(diag(Severity::Error, range(1, 12, 1, 17), "bad name"));
        let expect = "file.wgsl:1:12 error: bad name\n\
                      alpha  beta  gamma\n\
                      \u{20}            ^^^^^\n";
        assert_eq!(fmt.format(&file(), &list), expect);
    }

    #[test]
    fn point_span_single_caret() {
        let fmt = Formatter::new(Style {
            print_file: false,
            print_severity: false,
            ..Style::default()
        });
        let mut list = DiagnosticList::new();
        list.add(diag(Severity::Note, Span::point(Location::new(2, 7)), "here"));
        let expect = "2:7: here\n\
                      delta  epsilon  zeta\n\
                      \u{20}      ^\n";
        assert_eq!(fmt.format(&file(), &list), expect);
    }

    #[test]
    fn blank_line_between_quoted_diagnostics() {
        let fmt = Formatter::new(Style {
            print_file: false,
            print_severity: false,
            ..Style::default()
        });
        let mut list = DiagnosticList::new();
        list.add(diag(Severity::Warning, range(1, 1, 1, 6), "first"));
        list.add(diag(Severity::Error, range(2, 1, 2, 6), "second"));
        let expect = "1:1: first\n\
                      alpha  beta  gamma\n\
                      ^^^^^\n\
                      \n\
                      2:1: second\n\
                      delta  epsilon  zeta\n\
                      ^^^^^\n";
        assert_eq!(fmt.format(&file(), &list), expect);
    }

    #[test]
    fn multi_line_span_underlines_every_line() {
        let fmt = Formatter::new(Style {
            print_file: false,
            print_severity: false,
            ..Style::default()
        });
        let mut list = DiagnosticList::new();
        // Line 1 from "beta"'s second character to line 2 column 6.
        list.add(diag(Severity::Error, range(1, 8, 2, 6), "spans lines"));
        let expect = "1:8: spans lines\n\
                      alpha  beta  gamma\n\
                      \u{20}       ^^^^^^^^^^\n\
                      delta  epsilon  zeta\n\
                      ^^^^^\n";
        assert_eq!(fmt.format(&file(), &list), expect);
    }

    #[test]
    fn no_source_location() {
        let fmt = Formatter::new(Style::default());
        let mut list = DiagnosticList::new();
        list.add(diag(Severity::Error, Span::default(), "whole-program problem"));
        assert_eq!(
            fmt.format(&file(), &list),
            "error: whole-program problem"
        );
    }

    #[test]
    fn non_ascii_line_quoted_without_caret() {
        let file = SourceFile::new("u.wgsl", "let \u{1f431} = 1;\n");
        let fmt = Formatter::new(Style {
            print_file: false,
            print_severity: false,
            ..Style::default()
        });
        let mut list = DiagnosticList::new();
        list.add(diag(Severity::Error, range(1, 5, 1, 6), "bad identifier"));
        assert_eq!(
            fmt.format(&file, &list),
            "1:5: bad identifier\nlet \u{1f431} = 1;\n"
        );
    }

    #[test]
    fn trailing_newline_flag() {
        let fmt = Formatter::new(Style {
            print_file: false,
            print_severity: false,
            print_line: false,
            print_newline_at_end: true,
            tab_width: 2,
        });
        let mut list = DiagnosticList::new();
        list.add(diag(Severity::Error, range(1, 1, 1, 2), "x"));
        assert_eq!(fmt.format(&file(), &list), "1:1: x\n");
    }
}
