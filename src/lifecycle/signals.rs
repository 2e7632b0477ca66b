//! OS signal handling.
//!
//! # Design Decisions
//! - A forwarder task turns SIGINT/SIGTERM into `ShutdownSignal` values on a
//!   channel with a single consumer
//! - Every signal is forwarded; the consumer decides that the first starts
//!   a drain and a second one forces shutdown
//! - Handlers are installed before the forwarder starts so install failures
//!   surface to the caller

use std::io;

use tokio::sync::mpsc;

use crate::lifecycle::shutdown::ShutdownSignal;

const SIGNAL_BUFFER: usize = 4;

/// Install SIGINT and SIGTERM handlers and return the signal stream.
#[cfg(unix)]
pub fn listen() -> io::Result<mpsc::Receiver<ShutdownSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
                Some(()) = terminate.recv() => ShutdownSignal::Terminate,
                else => break,
            };
            tracing::info!(signal = %received, "Signal received");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Install the Ctrl-C handler and return the signal stream.
#[cfg(not(unix))]
pub fn listen() -> io::Result<mpsc::Receiver<ShutdownSignal>> {
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                break;
            }
            tracing::info!(signal = %ShutdownSignal::Interrupt, "Signal received");
            if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Next signal; pends forever once every sender is gone.
pub(crate) async fn next_signal(signals: &mut mpsc::Receiver<ShutdownSignal>) -> ShutdownSignal {
    match signals.recv().await {
        Some(signal) => signal,
        None => std::future::pending().await,
    }
}
