//! Render frames and the sinks that display them.
//!
//! The streaming engines never touch the terminal directly. They describe each
//! redraw as a [`Frame`] (a titled panel with a tone and a body) and hand it
//! to a [`FrameSink`].

use std::io;
use std::time::{Duration, Instant};

/// Colour role of a panel; maps onto the configured panel styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameTone {
    Default,
    Info,
    Success,
    Warning,
    Error,
}

impl FrameTone {
    pub fn key(self) -> &'static str {
        match self {
            FrameTone::Default => "default",
            FrameTone::Info => "info",
            FrameTone::Success => "success",
            FrameTone::Warning => "warning",
            FrameTone::Error => "error",
        }
    }

    pub fn all() -> [FrameTone; 5] {
        [
            FrameTone::Default,
            FrameTone::Info,
            FrameTone::Success,
            FrameTone::Warning,
            FrameTone::Error,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// A single centred status message.
    Notice(String),
    /// Pre-split plain text lines, shown as-is.
    Lines(Vec<String>),
    /// Markdown source, rendered with styling.
    Markdown(String),
}

impl FrameBody {
    pub fn text_lines(&self) -> Vec<String> {
        match self {
            FrameBody::Notice(text) => text.lines().map(str::to_string).collect(),
            FrameBody::Lines(lines) => lines.clone(),
            FrameBody::Markdown(text) => text.lines().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub title: String,
    pub subtitle: Option<String>,
    pub tone: FrameTone,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(title: impl Into<String>, tone: FrameTone, body: FrameBody) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            tone,
            body,
        }
    }

    pub fn notice(title: impl Into<String>, tone: FrameTone, text: impl Into<String>) -> Self {
        Self::new(title, tone, FrameBody::Notice(text.into()))
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Undecorated rendering used by plain-text sinks.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        if !self.title.is_empty() {
            out.push_str("── ");
            out.push_str(self.title.trim());
            out.push_str(" ──\n");
        }
        for line in self.body.text_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        if let Some(subtitle) = &self.subtitle {
            out.push_str("── ");
            out.push_str(subtitle.trim());
            out.push_str(" ──\n");
        }
        out
    }
}

/// Destination for render frames.
pub trait FrameSink {
    /// Replace the live region with `frame`.
    fn draw(&mut self, frame: &Frame) -> io::Result<()>;

    /// Show the closing frame of a session and leave it on screen.
    fn finalize(&mut self, frame: &Frame) -> io::Result<()>;

    /// Print a non-live block after the session's final frame.
    fn print_static(&mut self, frame: &Frame) -> io::Result<()>;
}

/// Limits live redraws to a steady refresh rate.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last_draw: Option<Instant>,
    dirty: bool,
}

impl FramePacer {
    pub fn new(refresh_per_second: u32) -> Self {
        let per_second = refresh_per_second.max(1);
        Self {
            interval: Duration::from_secs(1) / per_second,
            last_draw: None,
            dirty: false,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true (and records the draw) when a dirty frame is due.
    pub fn take_due(&mut self) -> bool {
        self.take_due_at(Instant::now())
    }

    fn take_due_at(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        let due = self
            .last_draw
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_draw = Some(now);
            self.dirty = false;
        }
        due
    }
}
