//! Maps a host SIGINT onto a cancellation token for the duration of one
//! streamed turn.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Listens for Ctrl-C while alive and cancels [`InterruptScope::token`] when
/// it arrives. Dropping the scope stops listening, so a later Ctrl-C at the
/// prompt is handled by the prompt again.
pub struct InterruptScope {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl InterruptScope {
    pub fn new() -> Self {
        Self::linked(None)
    }

    /// Like [`InterruptScope::new`], but cancelling `parent` also cancels the
    /// scope's token.
    pub fn linked(parent: Option<&CancellationToken>) -> Self {
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let trigger = token.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => {
                            debug!("SIGINT received; cancelling active stream");
                            trigger.cancel();
                        }
                        Err(err) => debug!(error = %err, "cannot listen for SIGINT"),
                    }
                }
                _ = trigger.cancelled() => {}
            }
        });
        Self { token, watcher }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for InterruptScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
