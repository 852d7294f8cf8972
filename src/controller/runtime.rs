use super::{ShutdownReason, StreamController};
use crate::error::Result;
use crate::events::{EventFilter, EventReceiver, StreamEvent};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl StreamController {
    /// Stream until SIGTERM or Ctrl+C, or until the encoder fails.
    ///
    /// Returns the process exit code.
    pub async fn run(&self) -> Result<i32> {
        let cancel = CancellationToken::new();
        self.setup_signal_handlers(cancel.clone());
        let exit_code = self.run_until_cancelled(cancel.clone()).await;
        cancel.cancel();
        exit_code
    }

    /// Stream until `cancel` fires or the encoder fails
    pub async fn run_until_cancelled(&self, cancel: CancellationToken) -> Result<i32> {
        let mut failures = self.event_bus().receiver(
            EventFilter::EventTypes(vec!["encoder_failed"]),
            "controller",
        );

        self.start_stream().await?;
        info!("xrlink is streaming");

        let reason = tokio::select! {
            _ = cancel.cancelled() => ShutdownReason::Cancelled,
            reason = next_failure(&mut failures) => ShutdownReason::EncoderFailed(reason),
        };

        info!("Shutdown initiated: {:?}", reason);
        let mut exit_code = match &reason {
            ShutdownReason::EncoderFailed(details) => {
                self.on_encoder_failed(details);
                1
            }
            ShutdownReason::Cancelled => 0,
        };

        if let Err(e) = self.stop_stream().await {
            error!("Failed to stop stream cleanly: {}", e);
            exit_code = 1;
        }

        info!("xrlink shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, cancel: CancellationToken) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let cancel_sigterm = cancel.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                tokio::select! {
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        cancel_sigterm.cancel();
                    }
                    _ = cancel_sigterm.cancelled() => {}
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            tokio::select! {
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });
    }
}

/// Resolves with the reason of the next encoder failure; pends forever
/// once the bus is gone
async fn next_failure(receiver: &mut EventReceiver) -> String {
    while let Some(event) = receiver.recv().await {
        if let StreamEvent::EncoderFailed { reason } = event {
            return reason;
        }
    }
    std::future::pending().await
}
