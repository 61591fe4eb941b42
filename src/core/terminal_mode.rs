//! Scoped raw-mode acquisition for keystroke passthrough.
//!
//! [`RawModeGuard`] owns the terminal mode for the duration of one streamed
//! command. The previous mode is restored exactly once, either through an
//! explicit [`RawModeGuard::release`] or when the guard is dropped, which also
//! covers early returns and panics.

use std::io::{self, IsTerminal};

use ratatui::crossterm::terminal;
use tracing::{debug, warn};

use crate::core::error::StreamError;

/// Something that can switch the terminal into character-at-a-time input and
/// back again.
pub trait TerminalMode {
    /// Opaque record of the mode that was active before `enter`.
    type Snapshot;

    fn enter(&mut self) -> io::Result<Self::Snapshot>;
    fn restore(&mut self, snapshot: Self::Snapshot) -> io::Result<()>;
}

/// The controlling terminal, switched through crossterm.
///
/// Raw mode clears `ISIG`, so Ctrl-C arrives as byte `0x03` instead of raising
/// SIGINT in both processes.
#[derive(Debug, Default)]
pub struct CrosstermTerminal;

/// Proof that raw mode was entered by this process. Consumed on restore.
#[derive(Debug)]
pub struct RawModeSnapshot {
    _private: (),
}

impl TerminalMode for CrosstermTerminal {
    type Snapshot = RawModeSnapshot;

    fn enter(&mut self) -> io::Result<RawModeSnapshot> {
        if terminal::is_raw_mode_enabled()? {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "raw mode is already held by another scope",
            ));
        }
        terminal::enable_raw_mode()?;
        Ok(RawModeSnapshot { _private: () })
    }

    fn restore(&mut self, _snapshot: RawModeSnapshot) -> io::Result<()> {
        terminal::disable_raw_mode()
    }
}

pub struct RawModeGuard<M: TerminalMode> {
    mode: M,
    snapshot: Option<M::Snapshot>,
}

impl<M: TerminalMode> RawModeGuard<M> {
    pub fn acquire(mut mode: M) -> Result<Self, StreamError> {
        let snapshot = mode.enter().map_err(StreamError::Terminal)?;
        debug!("entered raw terminal mode");
        Ok(Self {
            mode,
            snapshot: Some(snapshot),
        })
    }

    /// A guard that holds nothing; used when input forwarding is not viable.
    pub fn inactive(mode: M) -> Self {
        Self {
            mode,
            snapshot: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Restore the saved mode. Later calls, including the one from `Drop`, are
    /// no-ops.
    pub fn release(&mut self) -> Result<(), StreamError> {
        match self.snapshot.take() {
            Some(snapshot) => {
                debug!("restoring terminal mode");
                self.mode.restore(snapshot).map_err(StreamError::Terminal)
            }
            None => Ok(()),
        }
    }
}

impl<M: TerminalMode> Drop for RawModeGuard<M> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

/// Keystroke forwarding needs an interactive stdin and a child that accepts
/// piped input.
pub fn input_forwarding_viable(stdin_is_terminal: bool, child_accepts_input: bool) -> bool {
    stdin_is_terminal && child_accepts_input
}

/// Whether this process can read keystrokes from its own terminal.
pub fn stdin_is_interactive() -> bool {
    if !io::stdin().is_terminal() {
        return false;
    }
    !matches!(std::env::var("TERM").as_deref(), Ok("dumb"))
}

#[cfg(unix)]
pub use tty::TtyInput;

#[cfg(unix)]
mod tty {
    use std::io;
    use std::os::fd::{AsRawFd, RawFd};
    use std::pin::Pin;
    use std::task::{ready, Context, Poll};

    use tokio::io::unix::AsyncFd;
    use tokio::io::{AsyncRead, ReadBuf};

    struct StdinFd;

    impl AsRawFd for StdinFd {
        fn as_raw_fd(&self) -> RawFd {
            libc::STDIN_FILENO
        }
    }

    /// Non-blocking reader over the process's own stdin.
    ///
    /// Reads only happen after the reactor reports readiness, so dropping the
    /// reader never leaves a blocked `read` behind to swallow the next
    /// keystroke. The descriptor's original flags are restored on drop.
    pub struct TtyInput {
        fd: AsyncFd<StdinFd>,
        original_flags: libc::c_int,
    }

    impl TtyInput {
        pub fn open() -> io::Result<Self> {
            let fd = libc::STDIN_FILENO;
            // SAFETY: fcntl on a valid, process-owned descriptor.
            let original_flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            if original_flags < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: as above; only the O_NONBLOCK bit is added.
            if unsafe { libc::fcntl(fd, libc::F_SETFL, original_flags | libc::O_NONBLOCK) } < 0 {
                return Err(io::Error::last_os_error());
            }

            match AsyncFd::new(StdinFd) {
                Ok(fd) => Ok(Self { fd, original_flags }),
                Err(err) => {
                    // SAFETY: restoring the flags read above.
                    unsafe { libc::fcntl(libc::STDIN_FILENO, libc::F_SETFL, original_flags) };
                    Err(err)
                }
            }
        }
    }

    impl AsyncRead for TtyInput {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            loop {
                let mut guard = ready!(self.fd.poll_read_ready(cx))?;
                let unfilled = buf.initialize_unfilled();
                let result = guard.try_io(|inner| {
                    // SAFETY: `unfilled` is a valid, initialized, writable slice.
                    let n = unsafe {
                        libc::read(
                            inner.get_ref().as_raw_fd(),
                            unfilled.as_mut_ptr().cast(),
                            unfilled.len(),
                        )
                    };
                    if n < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(n as usize)
                    }
                });

                match result {
                    Ok(Ok(n)) => {
                        buf.advance(n);
                        return Poll::Ready(Ok(()));
                    }
                    Ok(Err(err)) => return Poll::Ready(Err(err)),
                    Err(_would_block) => continue,
                }
            }
        }
    }

    impl Drop for TtyInput {
        fn drop(&mut self) {
            // SAFETY: restoring the flags captured in `open`.
            unsafe { libc::fcntl(libc::STDIN_FILENO, libc::F_SETFL, self.original_flags) };
        }
    }
}
