//! Termination signals for long-running commands.

use anyhow::Result;
use tracing::info;

/// Name of the signal that ended the wait.
pub type SignalName = &'static str;

/// Waits for SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn shutdown_signal() -> Result<SignalName> {
    #[cfg(unix)]
    let name = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    };

    #[cfg(not(unix))]
    let name = {
        tokio::signal::ctrl_c().await?;
        "Ctrl+C"
    };

    info!("📡 Received {}, closing RCON sessions", name);
    Ok(name)
}
