//! Line-windowed rolling buffer for live stream rendering.
//!
//! Both the shell multiplexer and the AI generation loop push raw chunks into a
//! [`RenderBuffer`]. The buffer keeps two views of the same stream:
//!
//! - a lossless accumulator holding every chunk verbatim, in order, and
//! - a bounded window of the most recent completed lines plus the unterminated
//!   tail, used for live display.
//!
//! Callers that need the complete text (context recording, resume snapshots)
//! must read [`RenderBuffer::full_output`]. The window drops old lines.

use std::collections::VecDeque;

use memchr::memchr2;

/// Marker appended to the in-progress tail while a stream is still live.
pub const CURSOR_MARKER: char = '▊';

/// Default window height for shell output.
pub const DEFAULT_SHELL_VISIBLE_LINES: usize = 15;
/// Default window height for AI responses.
pub const DEFAULT_AI_VISIBLE_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderSnapshot {
    /// Completed lines currently inside the window, oldest first.
    pub lines: Vec<String>,
    /// Unterminated tail, if any text follows the last line break.
    pub tail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderBuffer {
    max_visible_lines: usize,
    completed_lines: VecDeque<String>,
    current_line: String,
    full_content: String,
    // A chunk ended in '\r'; a leading '\n' in the next chunk completes the
    // same line break.
    pending_cr: bool,
}

impl RenderBuffer {
    pub fn new(max_visible_lines: usize) -> Self {
        let max_visible_lines = max_visible_lines.max(1);
        Self {
            max_visible_lines,
            completed_lines: VecDeque::with_capacity(max_visible_lines + 1),
            current_line: String::new(),
            full_content: String::new(),
            pending_cr: false,
        }
    }

    pub fn max_visible_lines(&self) -> usize {
        self.max_visible_lines
    }

    pub fn reset(&mut self) {
        self.completed_lines.clear();
        self.current_line.clear();
        self.full_content.clear();
        self.pending_cr = false;
    }

    /// Reset the buffer and replay `content` so a resumed stream continues the
    /// visible tail instead of starting from an empty window.
    pub fn seed(&mut self, content: &str) {
        self.reset();
        self.add_chunk(content);
    }

    pub fn add_chunk(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        self.full_content.push_str(chunk);

        let mut rest = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            if let Some(stripped) = rest.strip_prefix('\n') {
                rest = stripped;
            }
        }

        while let Some(pos) = memchr2(b'\n', b'\r', rest.as_bytes()) {
            self.current_line.push_str(&rest[..pos]);
            let completed = std::mem::take(&mut self.current_line);
            self.push_completed(completed);

            let was_cr = rest.as_bytes()[pos] == b'\r';
            rest = &rest[pos + 1..];
            if was_cr {
                if let Some(stripped) = rest.strip_prefix('\n') {
                    rest = stripped;
                } else if rest.is_empty() {
                    self.pending_cr = true;
                }
            }
        }

        self.current_line.push_str(rest);
    }

    fn push_completed(&mut self, line: String) {
        self.completed_lines.push_back(line);
        while self.completed_lines.len() > self.max_visible_lines {
            self.completed_lines.pop_front();
        }
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            lines: self.completed_lines.iter().cloned().collect(),
            tail: (!self.current_line.is_empty()).then(|| self.current_line.clone()),
        }
    }

    /// Lines to draw for a live frame: the window followed by the tail, trimmed
    /// so the total never exceeds the configured maximum.
    pub fn render_lines(&self, with_cursor: bool) -> Vec<String> {
        let mut lines: Vec<String> = self.completed_lines.iter().cloned().collect();
        if !self.current_line.is_empty() {
            let mut tail = self.current_line.clone();
            if with_cursor {
                tail.push(CURSOR_MARKER);
            }
            lines.push(tail);
        }

        let overflow = lines.len().saturating_sub(self.max_visible_lines);
        lines.drain(..overflow);
        lines
    }

    pub fn full_output(&self) -> &str {
        &self.full_content
    }

    pub fn into_full_output(self) -> String {
        self.full_content
    }

    pub fn is_empty(&self) -> bool {
        self.full_content.is_empty()
    }

    /// Whitespace-separated word count of the accumulated text.
    ///
    /// Computed on demand so that `add_chunk` stays independent of the total
    /// stream length.
    pub fn word_count(&self) -> usize {
        self.full_content.split_whitespace().count()
    }
}

impl Default for RenderBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL_VISIBLE_LINES)
    }
}
