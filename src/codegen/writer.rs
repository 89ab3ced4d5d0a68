//! Indenting line writer for C source

/// Accumulates C text, two spaces per nesting level
#[derive(Debug, Default)]
pub struct CWriter {
    out: String,
    indent: usize,
}

impl CWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, s: &str) {
        if s.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    /// Write `head {` and indent
    pub fn open(&mut self, head: &str) {
        self.line(&format!("{} {{", head));
        self.indent += 1;
    }

    /// Dedent and write `}` followed by `tail`
    pub fn close(&mut self, tail: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(&format!("}}{}", tail));
    }

    /// Close the open `if` block and open its `else` branch
    pub fn else_block(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("} else {");
        self.indent += 1;
    }

    /// Copy a user-supplied block unchanged, ensuring it ends a line
    pub fn verbatim(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    pub fn banner(&mut self, input: &str, tool: &str) {
        self.line("/*");
        self.line(&format!("  Auto-generated from {} by {}.", input, tool));
        self.line("  Do not edit this file!");
        self.line(" */");
    }

    pub fn finish(self) -> String {
        self.out
    }
}
