use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Failures surfaced by the streaming engine.
///
/// Cancellation is not an error. An interrupted command or generation is
/// reported through `ShellOutcome::cancelled` or `GenerationOutcome::Cancelled`.
#[derive(Debug)]
pub enum StreamError {
    /// The child process could not be created.
    SpawnFailure {
        command: String,
        reason: String,
        source: Option<io::Error>,
    },
    /// A privileged command needed a password and none was provided.
    SecretNotProvided,
    /// An interrupt signal could not be delivered to the child.
    SignalDelivery { pid: Option<u32>, source: io::Error },
    /// `resume` was requested without a pending cancellation.
    NothingToResume,
    /// The terminal could not be switched or restored.
    Terminal(io::Error),
}

impl StreamError {
    pub fn spawn(command: &str, reason: impl Into<String>) -> Self {
        StreamError::SpawnFailure {
            command: command.to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn spawn_io(command: &str, source: io::Error) -> Self {
        StreamError::SpawnFailure {
            command: command.to_string(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Whether the user backed out, as opposed to something breaking.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, StreamError::SecretNotProvided)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::SpawnFailure {
                command, reason, ..
            } => write!(f, "Failed to start '{command}': {reason}"),
            StreamError::SecretNotProvided => {
                write!(f, "Cancelled command: sudo password not provided.")
            }
            StreamError::SignalDelivery { pid, source } => match pid {
                Some(pid) => write!(f, "Failed to interrupt process {pid}: {source}"),
                None => write!(f, "Failed to interrupt process: {source}"),
            },
            StreamError::NothingToResume => write!(f, "No cancelled stream to resume"),
            StreamError::Terminal(source) => write!(f, "Terminal mode error: {source}"),
        }
    }
}

impl StdError for StreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StreamError::SpawnFailure {
                source: Some(source),
                ..
            } => Some(source),
            StreamError::SignalDelivery { source, .. } => Some(source),
            StreamError::Terminal(source) => Some(source),
            _ => None,
        }
    }
}

/// A chunk producer failed mid-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerError {
    message: String,
}

impl ProducerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for ProducerError {}
