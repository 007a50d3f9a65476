//! Cancellation signals.
//!
//! A [`ShutdownSignal`] fires at most once and can be observed by any number of
//! tasks, before or after it fires. The orchestrator uses two of them: one that
//! starts draining and one that forces the remaining connections closed when
//! the deadline passes.
//!
//! # Example
//!
//! ```rust
//! use portico_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let observer = shutdown.clone();
//!
//! assert!(shutdown.trigger());
//! assert!(!shutdown.trigger());
//! assert!(observer.is_triggered());
//! ```

use std::future::Future;

use tokio::sync::watch;

/// A one-shot, cloneable cancellation signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Creates a signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Fires the signal.
    ///
    /// Returns `true` for the call that fired it; later calls change nothing
    /// and return `false`.
    pub fn trigger(&self) -> bool {
        self.sender.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Returns `true` once the signal has fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Returns a future that completes once the signal has fired.
    ///
    /// Completes immediately if it already has.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            let closed = receiver.wait_for(|fired| *fired).await.is_err();
            if closed {
                // Every sender is gone, so the signal can never fire.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Creates a signal fired by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Only the first OS signal fires it. Later ones are logged and ignored;
    /// they neither restart nor shorten the drain.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let watched = signal.clone();
        tokio::spawn(async move {
            if let Err(err) = watch_os_signals(&watched).await {
                tracing::error!(error = %err, "cannot listen for OS signals");
            }
        });
        signal
    }

    fn note_os_signal(&self, name: &'static str) {
        if self.trigger() {
            tracing::info!(signal = name, "cancellation received, draining");
        } else {
            tracing::warn!(signal = name, "already draining, signal ignored");
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn watch_os_signals(signal: &ShutdownSignal) -> std::io::Result<()> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = unix_signal(SignalKind::terminate())?;
    let mut sigint = unix_signal(SignalKind::interrupt())?;

    loop {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        signal.note_os_signal(name);
    }
}

#[cfg(not(unix))]
async fn watch_os_signals(signal: &ShutdownSignal) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        signal.note_os_signal("ctrl-c");
    }
}
