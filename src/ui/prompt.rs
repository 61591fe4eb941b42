//! Line input for the hybrid prompt and for privilege passwords.

use std::io::{self, BufRead};

use tracing::debug;

use crate::core::process::SecretSource;
use crate::core::terminal_mode::stdin_is_interactive;
use crate::utils::line_editor::{
    prompt_line_editor, LineEditorError, LineEditorOptions,
};

const HISTORY_LIMIT: usize = 500;

/// Asks for the privilege password on the terminal with masked echo.
///
/// Escape, Ctrl-C and an empty entry all count as "no password".
#[derive(Debug, Default)]
pub struct TerminalSecretPrompt;

impl SecretSource for TerminalSecretPrompt {
    fn obtain(&mut self, prompt: &str) -> Option<String> {
        if !stdin_is_interactive() {
            debug!("stdin is not a terminal; cannot ask for a password");
            return None;
        }
        match prompt_line_editor(prompt, &LineEditorOptions::masked()) {
            Ok(secret) if !secret.is_empty() => Some(secret),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "password prompt ended without input");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// The user abandoned the current line.
    Interrupted,
    Eof,
}

/// Reads prompt lines, with editing and history on a terminal.
pub struct LineReader {
    history: Vec<String>,
    piped: Option<Box<dyn BufRead + Send>>,
}

impl LineReader {
    /// Editor-backed reader when stdin is a terminal, line reader otherwise.
    pub fn stdin() -> Self {
        if stdin_is_interactive() {
            Self {
                history: Vec::new(),
                piped: None,
            }
        } else {
            Self::from_reader(io::BufReader::new(io::stdin()))
        }
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            history: Vec::new(),
            piped: Some(Box::new(reader)),
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn read(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        let outcome = match self.piped.as_mut() {
            Some(reader) => read_piped(reader.as_mut())?,
            None => {
                let options = LineEditorOptions::with_history(self.history.clone());
                match prompt_line_editor(prompt, &options) {
                    Ok(line) => ReadOutcome::Line(line),
                    Err(LineEditorError::Cancelled) => ReadOutcome::Interrupted,
                    Err(LineEditorError::EndOfInput) => ReadOutcome::Eof,
                    Err(LineEditorError::Io(err)) => return Err(err),
                }
            }
        };
        if let ReadOutcome::Line(line) = &outcome {
            self.remember(line);
        }
        Ok(outcome)
    }

    fn remember(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || self.history.last().is_some_and(|last| last == line) {
            return;
        }
        self.history.push(line.to_string());
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }
}

fn read_piped(reader: &mut dyn BufRead) -> io::Result<ReadOutcome> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(ReadOutcome::Eof);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(ReadOutcome::Line(trimmed.to_string()))
}
