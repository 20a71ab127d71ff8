/// Indented line buffer for emitted source.
#[derive(Debug, Default)]
pub(crate) struct SourceWriter {
    out: String,
    indent: usize,
}

impl SourceWriter {
    pub(crate) fn with_indent(indent: usize) -> Self {
        Self {
            out: String::new(),
            indent,
        }
    }

    pub(crate) fn line(&mut self, text: &str) {
        self.out.push_str(&"    ".repeat(self.indent));
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Writes host-language code as given, one indented line per input line.
    pub(crate) fn verbatim(&mut self, code: &str) {
        for line in code.lines() {
            if line.trim().is_empty() {
                self.blank();
            } else {
                self.line(line.trim_end());
            }
        }
    }

    /// Emits `head` and indents until the matching [`Self::close`].
    pub(crate) fn open(&mut self, head: &str) {
        self.line(head);
        self.indent += 1;
    }

    pub(crate) fn close(&mut self, tail: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(tail);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_indent_their_contents() {
        let mut out = SourceWriter::with_indent(1);
        out.open("if x {");
        out.verbatim("a();\n\n  b();  ");
        out.close("}");
        assert_eq!(out.finish(), "    if x {\n        a();\n\n          b();\n    }\n");
    }
}
