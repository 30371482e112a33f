use anyhow::Result;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Signal types that can be received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// SIGTERM or SIGINT
    Shutdown,
    /// SIGHUP
    Reload,
}

/// Forwards process signals to the engine loop
#[derive(Clone)]
pub struct SignalHandler {
    signal_sender: mpsc::UnboundedSender<SignalType>,
}

impl SignalHandler {
    pub fn new(signal_sender: mpsc::UnboundedSender<SignalType>) -> Self {
        Self { signal_sender }
    }

    /// Listen until a shutdown signal arrives or the receiver goes away
    pub async fn listen_for_signals(&self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;
        let handle = signals.handle();

        info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGHUP");

        while let Some(signal) = signals.next().await {
            let signal_type = match signal {
                SIGTERM | SIGINT => {
                    info!(
                        "Received shutdown signal ({}), initiating graceful shutdown",
                        signal
                    );
                    SignalType::Shutdown
                }
                SIGHUP => {
                    info!("Received SIGHUP signal, reloading configuration");
                    SignalType::Reload
                }
                _ => {
                    warn!("Received unexpected signal: {}", signal);
                    continue;
                }
            };

            if self.signal_sender.send(signal_type).is_err() {
                warn!("Engine loop is gone, dropping {:?}", signal_type);
                break;
            }
            if signal_type == SignalType::Shutdown {
                break;
            }
        }

        handle.close();
        Ok(())
    }
}
