//! The hybrid shell/AI prompt.
//!
//! Each line is classified, then either streamed through the
//! [`ShellStreamer`] or sent to the [`GenerationController`]. The session
//! keeps the working directory, a short record of recent shell activity that
//! is handed to the AI as context, and the in-memory conversation.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::data::{home_dir, path_display};
use crate::core::config::Config;
use crate::core::error::StreamError;
use crate::core::generation::{
    ChunkProducer, ChunkStream, Finalizer, GenerationController, GenerationOutcome,
    GenerationRequest,
};
use crate::core::interrupt::InterruptScope;
use crate::core::message::ChatMessage;
use crate::core::multiplexer::{without_input, ShellOutcome, ShellStreamer};
use crate::core::process::{SecretSource, SpawnRequest};
use crate::ui::frame::{Frame, FrameBody, FrameSink, FrameTone};
use crate::utils::format::format_duration;

pub const SHELL_CONTEXT_LIMIT: usize = 5;
const CONTEXT_OUTPUT_CHARS: usize = 2000;
const CONVERSATION_LIMIT: usize = 40;
const NOT_FOUND_EXIT: i32 = 127;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant embedded in a terminal \
shell. Answer concisely and use Markdown for code. Recent shell activity, when present, shows \
commands the user ran and their output.";

const HELP: &str = "\
Commands:
  /ai [message]     switch to AI mode, or ask once
  /shell [command]  switch to shell mode, or run once
  ?<question>       ask the AI without leaving shell mode
  cd [dir]          change the working directory (cd - returns)
  resume            continue the last cancelled AI response
  cancelstate       show the cancelled response waiting to resume
  help              show this help
  exit, quit        leave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Shell,
    Ai,
}

/// What one prompt line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Exit,
    Help,
    SwitchMode(Mode),
    Cd(Option<String>),
    Resume,
    CancelState,
    Ask(String),
    Shell(String),
}

pub fn classify(line: &str, mode: Mode) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    match line {
        "exit" | "quit" => return Input::Exit,
        "help" | "/help" => return Input::Help,
        "resume" | "/resume" => return Input::Resume,
        "cancelstate" | "/cancelstate" => return Input::CancelState,
        _ => {}
    }

    if let Some(rest) = strip_command(line, "/ai") {
        return match rest {
            "" => Input::SwitchMode(Mode::Ai),
            message => Input::Ask(message.to_string()),
        };
    }
    if let Some(rest) = strip_command(line, "/shell") {
        return match rest {
            "" => Input::SwitchMode(Mode::Shell),
            command => Input::Shell(command.to_string()),
        };
    }
    if let Some(question) = line.strip_prefix('?') {
        let question = question.trim();
        return if question.is_empty() {
            Input::Empty
        } else {
            Input::Ask(question.to_string())
        };
    }

    match mode {
        Mode::Ai => Input::Ask(line.to_string()),
        Mode::Shell => match strip_command(line, "cd") {
            Some("") => Input::Cd(None),
            Some(target) => Input::Cd(Some(target.to_string())),
            None => Input::Shell(line.to_string()),
        },
    }
}

/// `name` alone or followed by whitespace; returns the trimmed remainder.
fn strip_command<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Everything a turn writes to or reads from.
pub struct SessionIo<'a> {
    pub shell_sink: &'a mut dyn FrameSink,
    pub ai_sink: &'a mut dyn FrameSink,
    pub secrets: &'a mut dyn SecretSource,
    pub out: &'a mut dyn Write,
    /// Forward this process's terminal keystrokes to shell commands.
    pub forward_keys: bool,
    /// Cancels the running turn in addition to Ctrl-C.
    pub interrupt: Option<&'a CancellationToken>,
}

pub type SharedProducer = Arc<dyn ChunkProducer + Send + Sync>;

pub struct HybridSession {
    config: Config,
    mode: Mode,
    cwd: PathBuf,
    previous_cwd: Option<PathBuf>,
    shell: ShellStreamer,
    generation: GenerationController,
    producer: Result<SharedProducer, String>,
    conversation: Vec<ChatMessage>,
    shell_context: VecDeque<String>,
}

impl HybridSession {
    pub fn new(config: Config, cwd: PathBuf) -> Self {
        let shell = ShellStreamer::new(config.multiplexer_options());
        let generation = GenerationController::new(config.generation_options());
        Self {
            config,
            mode: Mode::Shell,
            cwd,
            previous_cwd: None,
            shell,
            generation,
            producer: Err("AI mode is not configured".to_string()),
            conversation: Vec::new(),
            shell_context: VecDeque::new(),
        }
    }

    pub fn with_producer(mut self, producer: SharedProducer) -> Self {
        self.producer = Ok(producer);
        self
    }

    /// Record why AI mode is unavailable; shown when the user asks anyway.
    pub fn without_producer(mut self, reason: impl Into<String>) -> Self {
        self.producer = Err(reason.into());
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn shell_context(&self) -> impl Iterator<Item = &str> {
        self.shell_context.iter().map(String::as_str)
    }

    pub fn prompt(&self) -> String {
        let dir = path_display(&self.cwd);
        match self.mode {
            Mode::Shell => format!("{dir} $ "),
            Mode::Ai => format!("{dir} ai> "),
        }
    }

    pub async fn handle_line(
        &mut self,
        line: &str,
        io: &mut SessionIo<'_>,
    ) -> io::Result<Flow> {
        match classify(line, self.mode) {
            Input::Empty => {}
            Input::Exit => return Ok(Flow::Exit),
            Input::Help => writeln!(io.out, "{HELP}")?,
            Input::SwitchMode(mode) => {
                self.mode = mode;
                let label = match mode {
                    Mode::Shell => "shell",
                    Mode::Ai => "AI",
                };
                writeln!(io.out, "Switched to {label} mode.")?;
            }
            Input::Cd(target) => {
                if let Err(message) = self.change_dir(target.as_deref()) {
                    writeln!(io.out, "{message}")?;
                }
            }
            Input::Resume => self.resume(io).await?,
            Input::CancelState => self.print_cancel_state(io.out)?,
            Input::Ask(message) => self.ask(message, io).await?,
            Input::Shell(command) => {
                self.run_shell(&command, io).await?;
            }
        }
        Ok(Flow::Continue)
    }

    fn change_dir(&mut self, target: Option<&str>) -> Result<(), String> {
        let destination = match target {
            None | Some("~") => home_dir().ok_or("cd: HOME not set")?,
            Some("-") => self
                .previous_cwd
                .clone()
                .ok_or("cd: no previous directory")?,
            Some(path) => match path.strip_prefix("~/") {
                Some(rest) => home_dir().ok_or("cd: HOME not set")?.join(rest),
                None => self.cwd.join(path),
            },
        };

        let resolved = destination
            .canonicalize()
            .map_err(|_| format!("cd: no such directory: {}", destination.display()))?;
        if !resolved.is_dir() {
            return Err(format!("cd: not a directory: {}", destination.display()));
        }
        debug!(dir = %resolved.display(), "changed directory");
        self.previous_cwd = Some(std::mem::replace(&mut self.cwd, resolved));
        Ok(())
    }

    /// Run one shell command in the session directory.
    ///
    /// Returns `None` when the command could not be started; the failure has
    /// already been shown on the shell sink.
    pub async fn run_shell(
        &mut self,
        command: &str,
        io: &mut SessionIo<'_>,
    ) -> io::Result<Option<ShellOutcome>> {
        let request = SpawnRequest::new(command, &self.cwd, self.config.shell_program());
        let interrupt = InterruptScope::linked(io.interrupt);

        match self.execute(request, io, &interrupt).await {
            Ok(outcome) => {
                if outcome.exit_code == Some(NOT_FOUND_EXIT) && !outcome.cancelled {
                    writeln!(
                        io.out,
                        "Command not found. Prefix a line with '?' to ask the AI instead."
                    )?;
                }
                self.record_shell(command, &outcome);
                Ok(Some(outcome))
            }
            Err(err) => {
                debug!(error = %err, "shell command did not start");
                Ok(None)
            }
        }
    }

    async fn execute(
        &mut self,
        request: SpawnRequest,
        io: &mut SessionIo<'_>,
        interrupt: &InterruptScope,
    ) -> Result<ShellOutcome, StreamError> {
        #[cfg(unix)]
        if io.forward_keys {
            use crate::core::multiplexer::KeyInput;
            use crate::core::terminal_mode::{CrosstermTerminal, TtyInput};

            match TtyInput::open() {
                Ok(reader) => {
                    let keys = KeyInput {
                        mode: CrosstermTerminal,
                        reader,
                    };
                    return self
                        .shell
                        .execute(
                            request,
                            io.secrets,
                            Some(keys),
                            io.shell_sink,
                            interrupt.token(),
                        )
                        .await;
                }
                Err(err) => debug!(error = %err, "keystroke forwarding unavailable"),
            }
        }

        self.shell
            .execute(
                request,
                io.secrets,
                without_input(),
                io.shell_sink,
                interrupt.token(),
            )
            .await
    }

    fn record_shell(&mut self, command: &str, outcome: &ShellOutcome) {
        let body = if outcome.cancelled {
            "Streaming command cancelled by user".to_string()
        } else if outcome.output.trim().is_empty() {
            match outcome.exit_code {
                Some(code) => format!("Exit code: {code}"),
                None => "Exit code: unknown".to_string(),
            }
        } else {
            tail_chars(outcome.output.trim_end(), CONTEXT_OUTPUT_CHARS)
        };
        self.shell_context.push_back(format!("$ {}\n{body}", command.trim()));
        while self.shell_context.len() > SHELL_CONTEXT_LIMIT {
            self.shell_context.pop_front();
        }
    }

    fn system_message(&self) -> ChatMessage {
        let prompt = self
            .config
            .ai
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        if self.shell_context.is_empty() {
            return ChatMessage::system(prompt);
        }
        let activity: Vec<&str> = self.shell_context().collect();
        ChatMessage::system(format!(
            "{prompt}\n\nWorking directory: {}\n\nRecent shell activity:\n{}",
            self.cwd.display(),
            activity.join("\n\n")
        ))
    }

    fn build_request(&self, user_message: String) -> GenerationRequest {
        let mut messages = Vec::with_capacity(self.conversation.len() + 2);
        messages.push(self.system_message());
        messages.extend(self.conversation.iter().cloned());
        messages.push(ChatMessage::user(user_message.clone()));
        GenerationRequest {
            user_message,
            messages,
        }
    }

    fn record_exchange(&mut self, user_message: String, reply: String) {
        self.conversation.push(ChatMessage::user(user_message));
        self.conversation.push(ChatMessage::assistant(reply));
        let excess = self.conversation.len().saturating_sub(CONVERSATION_LIMIT);
        self.conversation.drain(..excess);
    }

    fn producer(&self, out: &mut dyn Write) -> io::Result<Option<SharedProducer>> {
        match &self.producer {
            Ok(producer) => Ok(Some(Arc::clone(producer))),
            Err(reason) => {
                writeln!(out, "{reason}")?;
                Ok(None)
            }
        }
    }

    pub async fn ask(&mut self, message: String, io: &mut SessionIo<'_>) -> io::Result<()> {
        let Some(producer) = self.producer(io.out)? else {
            return Ok(());
        };
        let request = self.build_request(message.clone());
        let timed = TimedProducer::new(producer.as_ref());
        let finalizer = timed.finalizer("AI Assistant - Complete");
        let interrupt = InterruptScope::linked(io.interrupt);

        let outcome = self
            .generation
            .generate(request, &timed, Some(finalizer), io.ai_sink, interrupt.token())
            .await;
        self.after_generation(message, outcome, io.out)
    }

    async fn resume(&mut self, io: &mut SessionIo<'_>) -> io::Result<()> {
        let Some(user_message) = self
            .generation
            .cancelled_state()
            .map(|state| state.user_message.clone())
        else {
            writeln!(io.out, "No cancelled response to resume.")?;
            return Ok(());
        };
        let Some(producer) = self.producer(io.out)? else {
            return Ok(());
        };
        let timed = TimedProducer::new(producer.as_ref());
        let finalizer = timed.finalizer("AI Assistant - Resume Complete");
        let interrupt = InterruptScope::linked(io.interrupt);

        match self
            .generation
            .resume(&timed, Some(finalizer), io.ai_sink, interrupt.token())
            .await
        {
            Ok(outcome) => self.after_generation(user_message, outcome, io.out),
            Err(err) => writeln!(io.out, "{err}"),
        }
    }

    fn after_generation(
        &mut self,
        user_message: String,
        outcome: GenerationOutcome,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        match outcome {
            GenerationOutcome::Completed(reply) => {
                info!(chars = reply.len(), "AI turn completed");
                self.record_exchange(user_message, reply);
            }
            GenerationOutcome::Cancelled => {
                writeln!(out, "Type 'resume' to continue the response.")?;
            }
            GenerationOutcome::Failed(_) => {}
        }
        Ok(())
    }

    fn print_cancel_state(&self, out: &mut dyn Write) -> io::Result<()> {
        match self.generation.cancelled_state_info() {
            Some(info) => {
                writeln!(out, "Cancelled response waiting to resume:")?;
                writeln!(out, "  message: {}", info.user_message)?;
                writeln!(out, "  partial words: {}", info.partial_word_count)?;
                writeln!(
                    out,
                    "  cancelled at: {}",
                    info.timestamp.format("%Y-%m-%d %H:%M:%S")
                )
            }
            None => writeln!(out, "No cancelled response."),
        }
    }
}

/// Wraps a producer to note when its first chunk arrives.
struct TimedProducer<'a> {
    inner: &'a (dyn ChunkProducer + Send + Sync),
    started: Instant,
    first_chunk: Arc<Mutex<Option<Instant>>>,
}

impl<'a> TimedProducer<'a> {
    fn new(inner: &'a (dyn ChunkProducer + Send + Sync)) -> Self {
        Self {
            inner,
            started: Instant::now(),
            first_chunk: Arc::new(Mutex::new(None)),
        }
    }

    /// Closing frame with `"{total} | stream {stream}"` as its subtitle.
    fn finalizer(&self, title: &'static str) -> Finalizer {
        let started = self.started;
        let first_chunk = Arc::clone(&self.first_chunk);
        Box::new(move |body: FrameBody, _text: &str| {
            let total = started.elapsed();
            let stream = first_chunk
                .lock()
                .ok()
                .and_then(|slot| *slot)
                .map(|at| at.elapsed())
                .unwrap_or(total);
            Frame::new(title, FrameTone::Success, body).with_subtitle(format!(
                "{} | stream {}",
                format_duration(total),
                format_duration(stream)
            ))
        })
    }
}

impl ChunkProducer for TimedProducer<'_> {
    fn open(&self, messages: &[ChatMessage]) -> ChunkStream {
        let first_chunk = Arc::clone(&self.first_chunk);
        self.inner
            .open(messages)
            .inspect(move |item| {
                if item.is_ok() {
                    if let Ok(mut slot) = first_chunk.lock() {
                        slot.get_or_insert_with(Instant::now);
                    }
                }
            })
            .boxed()
    }
}

/// Last `max` characters of `text`, marked when cut.
fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests;
