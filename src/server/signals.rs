// Signal handling for graceful server shutdown

use crate::error::{FolioError, Result};
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};

/// Signals that stop the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
    Hangup,
}

pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
    sighup: TokioSignal,
}

impl SignalHandler {
    /// Install handlers for SIGTERM, SIGINT and SIGHUP
    pub fn new() -> Result<Self> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| FolioError::Io {
                source: e,
                context: format!("Failed to setup {} handler", name),
            })
        };

        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    /// Wait for the next signal
    pub async fn wait(&mut self) -> Signal {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                Signal::Terminate
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT");
                Signal::Interrupt
            }
            _ = self.sighup.recv() => {
                tracing::info!("Received SIGHUP");
                Signal::Hangup
            }
        }
    }
}
