//! Signal handling for graceful shutdown and zone table reloads.
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) end the process gracefully.
//! SIGHUP, on Unix only, asks for the zone table to be re-read.

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Waits for a termination signal and logs it.
pub async fn wait_for_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    wait_for_shutdown_silent().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(())
}

/// Waits for a termination signal.
pub async fn wait_for_shutdown_silent() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Spawns a task that sends one `()` per SIGHUP.
///
/// The returned channel is closed right away on platforms without SIGHUP.
pub fn reload_requests() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        match signal(SignalKind::hangup()) {
            Ok(mut sighup) => {
                tokio::spawn(async move {
                    while sighup.recv().await.is_some() {
                        info!("📡 Received SIGHUP - reloading zone table");
                        // A reload already queued covers this one too.
                        let _ = tx.try_send(());
                    }
                });
            }
            Err(e) => warn!("SIGHUP reload unavailable: {}", e),
        }
    }

    #[cfg(not(unix))]
    drop(tx);

    rx
}
