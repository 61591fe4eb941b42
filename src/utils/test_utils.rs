use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::terminal_mode::TerminalMode;
use crate::ui::frame::{Frame, FrameSink};

/// Terminal mode double that counts transitions instead of touching a tty.
#[derive(Debug, Clone, Default)]
pub struct RecordingMode {
    enters: Arc<AtomicUsize>,
    restores: Arc<AtomicUsize>,
    fail_enter: bool,
}

impl RecordingMode {
    pub fn failing() -> Self {
        Self {
            fail_enter: true,
            ..Self::default()
        }
    }

    pub fn enters(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl TerminalMode for RecordingMode {
    type Snapshot = ();

    fn enter(&mut self) -> io::Result<()> {
        if self.fail_enter {
            return Err(io::Error::other("not a terminal"));
        }
        self.enters.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&mut self, _snapshot: ()) -> io::Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that keeps every frame for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub live: Vec<Frame>,
    pub finals: Vec<Frame>,
    pub statics: Vec<Frame>,
    pub fail_draws: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail_draws: true,
            ..Self::default()
        }
    }

    pub fn final_frame(&self) -> &Frame {
        assert_eq!(self.finals.len(), 1, "expected exactly one final frame");
        &self.finals[0]
    }
}

impl FrameSink for RecordingSink {
    fn draw(&mut self, frame: &Frame) -> io::Result<()> {
        if self.fail_draws {
            return Err(io::Error::other("draw failed"));
        }
        self.live.push(frame.clone());
        Ok(())
    }

    fn finalize(&mut self, frame: &Frame) -> io::Result<()> {
        self.finals.push(frame.clone());
        Ok(())
    }

    fn print_static(&mut self, frame: &Frame) -> io::Result<()> {
        self.statics.push(frame.clone());
        Ok(())
    }
}
