//! Indented text accumulation for the textual backends.

/// Accumulates lines of target source with an explicit indent-level
/// counter. Output depends only on the order of calls, never on
/// traversal internals.
#[derive(Debug, Default)]
pub struct IndentedWriter {
    out: String,
    level: u32,
    /// Spaces per indent level.
    width: u32,
}

impl IndentedWriter {
    /// A writer indenting by `width` spaces per level.
    pub fn new(width: u32) -> Self {
        Self {
            out: String::new(),
            level: 0,
            width,
        }
    }

    /// Appends one line at the current indent level.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.level * self.width {
                self.out.push(' ');
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    /// Appends an empty line.
    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Increments the indent level.
    pub fn indent(&mut self) {
        self.level += 1;
    }

    /// Decrements the indent level.
    ///
    /// # Panics
    ///
    /// Panics on underflow; unbalanced indentation is an emitter bug.
    pub fn dedent(&mut self) {
        self.level = self
            .level
            .checked_sub(1)
            .expect("unbalanced indentation in emitter");
    }

    /// The current indent level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Consumes the writer and returns the accumulated text.
    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_follow_the_indent_counter() {
        let mut w = IndentedWriter::new(2);
        w.line("fn main() {");
        w.indent();
        w.line("return;");
        w.dedent();
        w.line("}");
        assert_eq!(w.finish(), "fn main() {\n  return;\n}\n");
    }

    #[test]
    fn nested_levels() {
        let mut w = IndentedWriter::new(4);
        w.line("a");
        w.indent();
        w.indent();
        w.line("b");
        w.dedent();
        w.line("c");
        w.dedent();
        assert_eq!(w.finish(), "a\n        b\n    c\n");
    }

    #[test]
    fn empty_lines_carry_no_indent() {
        let mut w = IndentedWriter::new(2);
        w.indent();
        w.line("");
        w.blank();
        assert_eq!(w.finish(), "\n\n");
    }

    #[test]
    #[should_panic(expected = "unbalanced indentation")]
    fn dedent_underflow_panics() {
        IndentedWriter::new(2).dedent();
    }
}
