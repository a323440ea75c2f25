//! Graceful shutdown coordinator.
//!
//! The first SIGINT / SIGTERM / SIGHUP cancels a [`CancellationToken`]; the
//! migrator finishes the asset it is working on (upload, location, album
//! links) and then stops, so no asset is left half-linked by the interrupt.
//! A second signal force-exits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

/// Install signal handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?,
            signal(SignalKind::hangup()).context("failed to register SIGHUP handler")?,
        )
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_err() {
                    tracing::warn!("Unable to listen for Ctrl+C; graceful shutdown disabled");
                    return;
                }
            }

            let prev = count.fetch_add(1, Ordering::SeqCst);
            if prev == 0 {
                tracing::info!("Received shutdown signal, finishing the current asset...");
                tracing::info!("Press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested; the current asset may be partially migrated");
                std::process::exit(130);
            }
        }
    });

    Ok(token)
}
