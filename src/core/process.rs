//! Child process creation for streamed shell commands.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::core::error::StreamError;

const PRIVILEGE_PREFIX: &str = "sudo";
pub const PASSWORD_PROMPT: &str = "sudo password: ";

/// Everything needed to launch one fully assembled command.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub command: String,
    pub cwd: PathBuf,
    /// Shell used as `<shell> -c <command>`.
    pub shell: String,
    /// Replaces the inherited environment when set.
    pub env: Option<HashMap<String, String>>,
    /// The command needs a password fed through stdin before it runs.
    pub privileged: bool,
    /// Keystrokes will be forwarded, so stdin must be piped.
    pub forward_input: bool,
}

impl SpawnRequest {
    pub fn new(
        command: impl Into<String>,
        cwd: impl Into<PathBuf>,
        shell: impl Into<String>,
    ) -> Self {
        let command = command.into();
        Self {
            privileged: requires_privilege_password(&command),
            command,
            cwd: cwd.into(),
            shell: shell.into(),
            env: None,
            forward_input: false,
        }
    }

    pub fn with_input_forwarding(mut self, forward_input: bool) -> Self {
        self.forward_input = forward_input;
        self
    }
}

/// Supplies secrets such as a sudo password. May block while prompting.
pub trait SecretSource {
    /// `None` means the user declined or the prompt failed.
    fn obtain(&mut self, prompt: &str) -> Option<String>;
}

/// Secret source for non-interactive contexts; never provides anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecrets;

impl SecretSource for NoSecrets {
    fn obtain(&mut self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Read end of the child's output. On unix stdout and stderr share it.
#[cfg(unix)]
pub type OutputReader = tokio::net::unix::pipe::Receiver;
#[cfg(not(unix))]
pub type OutputReader = tokio::process::ChildStdout;

/// A running child with its pipes split out.
///
/// Dropping this value closes every pipe; the child itself is killed on drop
/// if it is still running.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub child: Child,
    pub output: OutputReader,
    pub stdin: Option<ChildStdin>,
}

impl SpawnedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn accepts_input(&self) -> bool {
        self.stdin.is_some()
    }
}

/// Whether the classifier would flag this command for password injection.
pub fn requires_privilege_password(command: &str) -> bool {
    command.trim_start().starts_with("sudo ")
}

/// Rewrite `sudo <rest>` into `sudo -S <rest>` so the password is read from
/// stdin. Commands without the prefix are returned unchanged.
pub fn privileged_command_line(command: &str) -> Result<String, StreamError> {
    let trimmed = command.trim();
    let Some(rest) = trimmed.strip_prefix(PRIVILEGE_PREFIX) else {
        return Ok(command.to_string());
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Ok(command.to_string());
    }

    let rest = rest.trim();
    if rest.is_empty() {
        return Err(StreamError::spawn(command, "sudo requires a command to execute."));
    }
    Ok(format!("{PRIVILEGE_PREFIX} -S {rest}"))
}

pub async fn spawn(
    request: &SpawnRequest,
    secrets: &mut dyn SecretSource,
) -> Result<SpawnedProcess, StreamError> {
    let mut command_line = request.command.clone();
    let mut password = None;

    if request.privileged {
        match secrets.obtain(PASSWORD_PROMPT) {
            Some(secret) if !secret.is_empty() => password = Some(secret),
            _ => {
                info!(command = %request.command, "privileged command aborted: no password");
                return Err(StreamError::SecretNotProvided);
            }
        }
        command_line = privileged_command_line(&request.command)?;
    }

    let stdin = if request.forward_input || password.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    let (output, stdout, stderr) =
        output_pipe().map_err(|err| StreamError::spawn_io(&request.command, err))?;

    let mut command = Command::new(&request.shell);
    command
        .arg("-c")
        .arg(&command_line)
        .current_dir(&request.cwd)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);

    if let Some(env) = &request.env {
        command.env_clear().envs(env);
    }

    let spawned = command.spawn();
    // The parent's copies of the write end must close for EOF to arrive.
    drop(command);
    let mut child = spawned.map_err(|err| StreamError::spawn_io(&request.command, err))?;

    #[cfg(not(unix))]
    let output = child
        .stdout
        .take()
        .ok_or_else(|| StreamError::spawn(&request.command, "stdout was not captured"))?;
    let mut stdin = child.stdin.take();

    debug!(pid = ?child.id(), shell = %request.shell, "spawned child process");

    if let (Some(secret), Some(pipe)) = (password, stdin.as_mut()) {
        if let Err(err) = feed_secret(pipe, &secret).await {
            debug!(error = %err, "failed to pre-feed password");
        }
    }

    // Without forwarding, the pipe only existed for the secret; close it so
    // the child sees end-of-input.
    if !request.forward_input {
        stdin = None;
    }

    Ok(SpawnedProcess {
        child,
        output,
        stdin,
    })
}

/// One pipe whose write end is installed as both stdout and stderr, so the
/// reader sees the two streams in the order the child wrote them.
#[cfg(unix)]
fn output_pipe() -> io::Result<(OutputReader, Stdio, Stdio)> {
    let (sender, receiver) = tokio::net::unix::pipe::pipe()?;
    let stdout = sender.into_blocking_fd()?;
    let stderr = stdout.try_clone()?;
    Ok((receiver, Stdio::from(stdout), Stdio::from(stderr)))
}

/// Without unix pipes only stdout is captured; stderr goes to the terminal.
#[cfg(not(unix))]
fn output_pipe() -> io::Result<((), Stdio, Stdio)> {
    Ok(((), Stdio::piped(), Stdio::inherit()))
}

async fn feed_secret(pipe: &mut ChildStdin, secret: &str) -> io::Result<()> {
    pipe.write_all(secret.as_bytes()).await?;
    pipe.write_all(b"\n").await?;
    pipe.flush().await
}

/// Ask the child to stop with SIGINT, falling back to a forced kill when the
/// signal cannot be delivered.
pub fn interrupt_child(process: &mut SpawnedProcess) {
    match send_interrupt(process) {
        Ok(()) => debug!(pid = ?process.pid(), "sent SIGINT to child"),
        Err(err) => {
            warn!(error = %err, "interrupt failed; terminating child");
            if let Err(kill_err) = process.child.start_kill() {
                debug!(error = %kill_err, "child already gone");
            }
        }
    }
}

#[cfg(unix)]
fn send_interrupt(process: &SpawnedProcess) -> Result<(), StreamError> {
    let pid = process.pid();
    let Some(raw) = pid else {
        return Err(StreamError::SignalDelivery {
            pid,
            source: io::Error::new(io::ErrorKind::NotFound, "process has already exited"),
        });
    };

    // SAFETY: kill(2) with a pid we own; no memory is touched.
    let rc = unsafe { libc::kill(raw as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(StreamError::SignalDelivery {
            pid,
            source: io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
fn send_interrupt(process: &SpawnedProcess) -> Result<(), StreamError> {
    Err(StreamError::SignalDelivery {
        pid: process.pid(),
        source: io::Error::new(io::ErrorKind::Unsupported, "SIGINT is not available"),
    })
}

/// Exit code in shell convention: signal terminations map to `128 + signo`.
pub fn exit_code_of(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|signal| 128 + signal)
    }

    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    struct FixedSecret(Option<&'static str>, usize);

    impl SecretSource for FixedSecret {
        fn obtain(&mut self, prompt: &str) -> Option<String> {
            assert_eq!(prompt, PASSWORD_PROMPT);
            self.1 += 1;
            self.0.map(str::to_string)
        }
    }

    fn request(command: &str) -> SpawnRequest {
        SpawnRequest::new(command, std::env::temp_dir(), "/bin/sh")
    }

    #[test]
    fn sudo_prefix_is_detected() {
        assert!(requires_privilege_password("sudo apt update"));
        assert!(requires_privilege_password("  sudo ls"));
        assert!(!requires_privilege_password("sudoku"));
        assert!(!requires_privilege_password("echo sudo"));
    }

    #[test]
    fn sudo_is_rewritten_to_read_stdin() {
        assert_eq!(
            privileged_command_line("sudo   apt update").unwrap(),
            "sudo -S apt update"
        );
        assert_eq!(privileged_command_line("ls -la").unwrap(), "ls -la");
        assert_eq!(privileged_command_line("sudoedit x").unwrap(), "sudoedit x");
    }

    #[test]
    fn bare_sudo_is_a_spawn_failure() {
        let err = privileged_command_line("sudo ").unwrap_err();
        assert!(matches!(err, StreamError::SpawnFailure { .. }));
    }

    #[tokio::test]
    async fn missing_password_aborts_before_spawning() {
        let mut secrets = FixedSecret(None, 0);
        let err = spawn(&request("sudo true"), &mut secrets)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::SecretNotProvided));
        assert_eq!(secrets.1, 1);
    }

    #[tokio::test]
    async fn unprivileged_commands_never_prompt() {
        let mut secrets = FixedSecret(Some("hunter2"), 0);
        let mut process = spawn(&request("echo hi"), &mut secrets).await.unwrap();
        assert_eq!(secrets.1, 0);
        assert!(!process.accepts_input());

        let mut out = String::new();
        process.output.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hi\n");
        let status = process.child.wait().await.unwrap();
        assert_eq!(exit_code_of(status), Some(0));
    }

    #[tokio::test]
    async fn secret_is_fed_to_stdin_with_newline() {
        // Exercise the pre-feed path without a real sudo.
        let mut req = request("read line; printf '%s' \"$line\"");
        req.privileged = true;
        let mut secrets = FixedSecret(Some("hunter2"), 0);

        let mut process = spawn(&req, &mut secrets).await.unwrap();
        let mut out = String::new();
        process.output.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hunter2");
        assert!(process.child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn stdout_and_stderr_share_one_ordered_stream() {
        let script = "echo a; echo b >&2; echo c; echo d >&2";
        let mut process = spawn(&request(script), &mut NoSecrets).await.unwrap();
        let mut out = String::new();
        process.output.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "a\nb\nc\nd\n");
        assert!(process.child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn missing_shell_is_reported() {
        let req = SpawnRequest::new("true", std::env::temp_dir(), "/definitely/not/a/shell");
        let err = spawn(&req, &mut NoSecrets).await.unwrap_err();
        assert!(matches!(err, StreamError::SpawnFailure { .. }));
    }

    #[tokio::test]
    async fn signal_exit_maps_to_shell_convention() {
        let mut process = spawn(&request("kill -INT $$"), &mut NoSecrets)
            .await
            .unwrap();
        let status = process.child.wait().await.unwrap();
        assert_eq!(exit_code_of(status), Some(130));
    }
}
