//! Streams one shell command's output to a live frame while forwarding the
//! user's keystrokes to it.
//!
//! A session walks `Starting → Running → {Finishing, Cancelling} → Done`.
//! Everything happens on one task: a `tokio::select!` waits on the child's
//! merged stdout/stderr pipe, the keystroke source, the host interrupt token,
//! and a poll tick. Ctrl-C arrives either as byte `0x03` (raw mode) or through the
//! interrupt token (SIGINT delivered to this process); both cancel the same way.

use std::future::pending;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::StreamError;
use crate::core::process::{self, SecretSource, SpawnRequest, SpawnedProcess};
use crate::core::render_buffer::{RenderBuffer, DEFAULT_SHELL_VISIBLE_LINES};
use crate::core::terminal_mode::{
    input_forwarding_viable, CrosstermTerminal, RawModeGuard, TerminalMode,
};
use crate::ui::frame::{Frame, FrameBody, FramePacer, FrameSink, FrameTone};
use crate::utils::format::truncate_title;
use crate::utils::utf8::Utf8Decoder;

const READ_CHUNK: usize = 4096;
const DRAIN_LIMIT: usize = 1 << 20;
const CTRL_C: u8 = 0x03;
const TITLE_MAX_CHARS: usize = 60;

pub const WAITING_PLACEHOLDER: &str = " Waiting for output...";
pub const NO_OUTPUT: &str = "(no output)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Finishing,
    Cancelling,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Not produced by the multiplexer itself; available to callers that
    /// downgrade a result.
    Warning,
    Cancelled,
    Failed,
}

impl CommandStatus {
    /// A missing exit code without cancellation counts as success.
    pub fn classify(cancelled: bool, exit_code: Option<i32>) -> Self {
        if cancelled {
            return CommandStatus::Cancelled;
        }
        match exit_code {
            Some(0) | None => CommandStatus::Success,
            Some(_) => CommandStatus::Failed,
        }
    }

    pub fn tone(self) -> FrameTone {
        match self {
            CommandStatus::Success => FrameTone::Success,
            CommandStatus::Warning | CommandStatus::Cancelled => FrameTone::Warning,
            CommandStatus::Failed => FrameTone::Error,
        }
    }

    pub fn title(self, exit_code: Option<i32>) -> String {
        match (self, exit_code) {
            (CommandStatus::Cancelled, _) => " Shell Command - Cancelled".to_string(),
            (CommandStatus::Failed, Some(code)) => format!(" Shell Command - Exit {code}"),
            _ => " Shell Command - Complete".to_string(),
        }
    }
}

/// What the caller gets back once the session is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutcome {
    pub output: String,
    pub exit_code: Option<i32>,
    pub cancelled: bool,
}

impl ShellOutcome {
    pub fn status(&self) -> CommandStatus {
        CommandStatus::classify(self.cancelled, self.exit_code)
    }
}

#[derive(Debug, Clone)]
pub struct MultiplexerOptions {
    pub max_visible_lines: usize,
    pub poll_interval: Duration,
    /// First bounded wait for the exit status.
    pub exit_wait: Duration,
    /// Upper bound on the total exit-status wait. A cancelled child still
    /// running after this is killed.
    pub max_exit_wait: Duration,
    pub refresh_per_second: u32,
    pub summary_panel: bool,
    pub output_panel: bool,
}

impl Default for MultiplexerOptions {
    fn default() -> Self {
        Self {
            max_visible_lines: DEFAULT_SHELL_VISIBLE_LINES,
            poll_interval: Duration::from_millis(100),
            exit_wait: Duration::from_millis(100),
            max_exit_wait: Duration::from_secs(1),
            refresh_per_second: 12,
            summary_panel: true,
            output_panel: true,
        }
    }
}

/// Keystroke source plus the terminal mode to hold while reading it.
pub struct KeyInput<M, I> {
    pub mode: M,
    pub reader: I,
}

/// Convenience for callers that stream output only.
pub fn without_input() -> Option<KeyInput<CrosstermTerminal, tokio::io::Empty>> {
    None
}

pub struct ShellStreamer {
    options: MultiplexerOptions,
    state: SessionState,
}

impl ShellStreamer {
    pub fn new(options: MultiplexerOptions) -> Self {
        Self {
            options,
            state: SessionState::Done,
        }
    }

    pub fn options(&self) -> &MultiplexerOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "shell session state");
        self.state = next;
    }

    pub async fn execute<M, I>(
        &mut self,
        mut request: SpawnRequest,
        secrets: &mut dyn SecretSource,
        input: Option<KeyInput<M, I>>,
        sink: &mut dyn FrameSink,
        interrupt: &CancellationToken,
    ) -> Result<ShellOutcome, StreamError>
    where
        M: TerminalMode,
        I: AsyncRead + Unpin,
    {
        self.transition(SessionState::Starting);
        let title_command = truncate_title(request.command.trim(), TITLE_MAX_CHARS);
        request.forward_input = input.is_some();

        let mut process = match process::spawn(&request, secrets).await {
            Ok(process) => process,
            Err(err) => {
                self.transition(SessionState::Done);
                finalize(sink, &spawn_error_frame(&err));
                return Err(err);
            }
        };

        let (mut guard, mut keys) = match input {
            Some(KeyInput { mode, reader })
                if input_forwarding_viable(true, process.accepts_input()) =>
            {
                match RawModeGuard::acquire(mode) {
                    Ok(guard) => (Some(guard), Some(reader)),
                    Err(err) => {
                        warn!(error = %err, "raw mode unavailable; streaming output only");
                        (None, None)
                    }
                }
            }
            _ => (None, None),
        };
        if keys.is_none() {
            // Nothing will be forwarded; let the child see end-of-input.
            process.stdin = None;
        }

        draw(
            sink,
            &Frame::notice(
                " Shell Command",
                FrameTone::Info,
                format!("Executing: '{title_command}'"),
            ),
        );

        self.transition(SessionState::Running);
        let mut buffer = RenderBuffer::new(self.options.max_visible_lines);
        let cancelled = self
            .run_loop(
                &mut process,
                keys.as_mut(),
                &mut buffer,
                sink,
                &title_command,
                interrupt,
            )
            .await;

        self.transition(if cancelled {
            SessionState::Cancelling
        } else {
            SessionState::Finishing
        });

        let exit_code = self.collect_exit_code(&mut process, cancelled).await;

        if let Some(guard) = guard.as_mut() {
            if let Err(err) = guard.release() {
                warn!(error = %err, "failed to restore terminal mode");
            }
        }
        drop(keys);
        drop(guard);
        let output = buffer.into_full_output();
        drop(process);

        self.transition(SessionState::Done);
        let status = CommandStatus::classify(cancelled, exit_code);
        info!(exit_code = ?exit_code, cancelled, "shell command finished");

        finalize(sink, &self.final_frame(status, exit_code, &output));
        if let Some(frame) = self.output_frame(status, exit_code, &output) {
            if let Err(err) = sink.print_static(&frame) {
                debug!(error = %err, "failed to print command output");
            }
        }

        Ok(ShellOutcome {
            output,
            exit_code,
            cancelled,
        })
    }

    /// Returns whether the session was cancelled.
    async fn run_loop<I: AsyncRead + Unpin>(
        &self,
        process: &mut SpawnedProcess,
        mut keys: Option<&mut I>,
        buffer: &mut RenderBuffer,
        sink: &mut dyn FrameSink,
        title_command: &str,
        interrupt: &CancellationToken,
    ) -> bool {
        let mut out_buf = [0u8; READ_CHUNK];
        let mut key_buf = [0u8; READ_CHUNK];
        let mut decoder = Utf8Decoder::new();
        let mut output_open = true;
        let mut data_since_tick = false;
        let mut pacer = FramePacer::new(self.options.refresh_per_second);
        let live_title = format!(" {title_command}");

        let cancelled = loop {
            let mut ticked = false;
            tokio::select! {
                biased;

                _ = interrupt.cancelled() => {
                    debug!("host interrupt during shell command");
                    break true;
                }

                read = process.output.read(&mut out_buf), if output_open => match read {
                    Ok(0) | Err(_) => output_open = false,
                    Ok(n) => {
                        buffer.add_chunk(&decoder.push(&out_buf[..n]));
                        data_since_tick = true;
                        pacer.mark_dirty();
                    }
                },

                read = read_keys(keys.as_deref_mut(), &mut key_buf), if keys.is_some() => {
                    match read {
                        Ok(0) | Err(_) => keys = None,
                        Ok(n) => {
                            let bytes = &key_buf[..n];
                            if memchr::memchr(CTRL_C, bytes).is_some() {
                                break true;
                            }
                            forward_keys(process, bytes).await;
                        }
                    }
                }

                _ = sleep(self.options.poll_interval) => ticked = true,
            }

            if !output_open {
                break false;
            }
            if ticked {
                let exited = matches!(process.child.try_wait(), Ok(Some(_)));
                if exited && !data_since_tick {
                    break false;
                }
                data_since_tick = false;
            }
            if pacer.take_due() {
                draw(sink, &live_frame(&live_title, buffer));
            }
        };

        if cancelled {
            process::interrupt_child(process);
        } else {
            if output_open && drain_ready(&mut process.output, &mut decoder, buffer).await {
                pacer.mark_dirty();
            }
            buffer.add_chunk(&decoder.finish());
            if pacer.is_dirty() {
                draw(sink, &live_frame(&live_title, buffer));
            }
        }
        cancelled
    }

    async fn collect_exit_code(
        &self,
        process: &mut SpawnedProcess,
        cancelled: bool,
    ) -> Option<i32> {
        let started = Instant::now();
        if let Ok(Ok(status)) = timeout(self.options.exit_wait, process.child.wait()).await {
            return process::exit_code_of(status);
        }

        let remaining = self.options.max_exit_wait.saturating_sub(started.elapsed());
        if let Ok(Ok(status)) = timeout(remaining, process.child.wait()).await {
            return process::exit_code_of(status);
        }

        if !cancelled {
            warn!(pid = ?process.pid(), "exit status unavailable after maximum wait");
            return None;
        }

        warn!(pid = ?process.pid(), "child ignored interrupt; killing");
        if let Err(err) = process.child.start_kill() {
            debug!(error = %err, "kill failed");
        }
        match timeout(self.options.exit_wait, process.child.wait()).await {
            Ok(Ok(status)) => process::exit_code_of(status),
            _ => None,
        }
    }

    fn final_frame(&self, status: CommandStatus, exit_code: Option<i32>, output: &str) -> Frame {
        let code = exit_code.map_or_else(|| "unknown".to_string(), |code| code.to_string());

        if !self.options.summary_panel {
            return Frame::notice(
                "",
                FrameTone::Default,
                format!("Command finished with exit code {code}"),
            );
        }

        let lines = if status == CommandStatus::Cancelled {
            vec![" Command cancelled. Partial output shown below.".to_string()]
        } else {
            let detail = if output.is_empty() {
                "No output produced."
            } else {
                "Output printed below."
            };
            vec![format!(" Exit code: {code}"), detail.to_string()]
        };
        Frame::new(status.title(exit_code), status.tone(), FrameBody::Lines(lines))
    }

    fn output_frame(
        &self,
        status: CommandStatus,
        exit_code: Option<i32>,
        output: &str,
    ) -> Option<Frame> {
        let lines = if !output.is_empty() {
            output.lines().map(str::to_string).collect()
        } else if status != CommandStatus::Cancelled {
            vec![NO_OUTPUT.to_string()]
        } else {
            return None;
        };

        Some(if self.options.output_panel {
            Frame::new(status.title(exit_code), status.tone(), FrameBody::Lines(lines))
        } else {
            Frame::new("", FrameTone::Default, FrameBody::Lines(lines))
        })
    }
}

/// Read whatever the child left in the pipe without waiting for more.
///
/// The exit check runs on a tick, so the last chunk can land between a
/// pending read and the child's exit. Stops at EOF, on error, once a read
/// would block, or after `DRAIN_LIMIT` bytes when a lingering grandchild keeps
/// writing. Returns whether anything was read.
async fn drain_ready<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut Utf8Decoder,
    buffer: &mut RenderBuffer,
) -> bool {
    let mut chunk = [0u8; READ_CHUNK];
    let mut drained = 0;
    while drained < DRAIN_LIMIT {
        match timeout(Duration::ZERO, reader.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => {
                buffer.add_chunk(&decoder.push(&chunk[..n]));
                drained += n;
            }
            _ => break,
        }
    }
    drained > 0
}

async fn read_keys<I: AsyncRead + Unpin>(
    reader: Option<&mut I>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => pending().await,
    }
}

async fn forward_keys(process: &mut SpawnedProcess, bytes: &[u8]) {
    let Some(stdin) = process.stdin.as_mut() else {
        return;
    };
    let result = async {
        stdin.write_all(bytes).await?;
        stdin.flush().await
    }
    .await;
    if let Err(err) = result {
        debug!(error = %err, "dropping keystrokes; child stdin closed");
    }
}

fn live_frame(title: &str, buffer: &RenderBuffer) -> Frame {
    if buffer.is_empty() {
        return Frame::notice(title, FrameTone::Info, WAITING_PLACEHOLDER);
    }
    Frame::new(title, FrameTone::Info, FrameBody::Lines(buffer.render_lines(false)))
}

fn spawn_error_frame(err: &StreamError) -> Frame {
    let tone = if err.is_user_abort() {
        FrameTone::Warning
    } else {
        FrameTone::Error
    };
    Frame::notice(" Shell Command - Error", tone, err.to_string())
}

fn draw(sink: &mut dyn FrameSink, frame: &Frame) {
    if let Err(err) = sink.draw(frame) {
        debug!(error = %err, "live draw failed");
    }
}

fn finalize(sink: &mut dyn FrameSink, frame: &Frame) {
    if let Err(err) = sink.finalize(frame) {
        warn!(error = %err, "failed to render final frame");
    }
}

#[cfg(test)]
mod tests;
