use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels the token when the process is asked to stop. Monitors run in the
/// foreground, so Ctrl-C is the usual path; on unix SIGTERM is honored too.
pub async fn watch(cancellation: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Can't install SIGTERM handler {e:?}");
                let _ = tokio::signal::ctrl_c().await;
                cancellation.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => (),
            _ = terminate.recv() => (),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal");
    cancellation.cancel();
}
