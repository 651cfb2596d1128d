use std::io::Write;

use lumen_chat::{InputSurface, Message, Role, ScrollMetrics, Transcript, Viewport};

/// Line-based viewport: output is appended to the terminal, so the view is
/// always at the tail and scrolling is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalViewport;

impl Viewport for TerminalViewport {
    fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics::new(0.0, 0.0, 0.0)
    }

    fn set_scroll_top(&mut self, _scroll_top: f32) {}
}

/// One line typed at the prompt.
#[derive(Debug, Default)]
pub struct PromptLine {
    line: String,
}

impl PromptLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

impl InputSurface for PromptLine {
    fn value(&self) -> &str {
        &self.line
    }

    fn clear(&mut self) {
        self.line.clear();
    }
}

/// Writes model turns to a terminal as they grow.
///
/// User turns are skipped since the user just typed them at the prompt. For the
/// pending turn only the new suffix is written; if the turn was rewritten instead
/// of extended (the failure notice) the replacement goes on a fresh line.
pub struct TranscriptPrinter<W> {
    out: W,
    seen_turns: usize,
    printed: String,
    line_open: bool,
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            seen_turns: 0,
            printed: String::new(),
            line_open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints whatever changed since the last call.
    pub fn render(&mut self, transcript: &Transcript) -> std::io::Result<()> {
        let start = self.seen_turns.saturating_sub(1);
        for (index, message) in transcript.iter().enumerate().skip(start) {
            if index >= self.seen_turns {
                self.seen_turns += 1;
                self.start_turn(message)?;
            }
            if message.role() == Role::Model {
                self.write_update(message.text())?;
            }
        }
        self.out.flush()
    }

    /// Ends the current line once a reply is finished.
    pub fn finish_turn(&mut self) -> std::io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        self.out.flush()
    }

    fn start_turn(&mut self, message: &Message) -> std::io::Result<()> {
        self.printed.clear();
        if message.role() == Role::User {
            return Ok(());
        }

        if self.line_open {
            writeln!(self.out)?;
        }
        write!(self.out, "model> ")?;
        self.line_open = true;
        Ok(())
    }

    fn write_update(&mut self, text: &str) -> std::io::Result<()> {
        match text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => write!(self.out, "{suffix}")?,
            None => write!(self.out, "\n{text}")?,
        }
        self.printed.clear();
        self.printed.push_str(text);
        Ok(())
    }
}
