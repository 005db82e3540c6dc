//! Runs the gRPC and HTTP listeners side by side and stops them together.

use std::future::Future;

use anyhow::Context;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

pub type ListenerHandle<E> = JoinHandle<Result<(), E>>;

/// Resolves once `true` is sent on the shutdown channel, or the sender is gone.
pub async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Waits for `signal` or for either listener to exit, whichever comes first,
/// then tells both to drain through `shutdown` and waits for them.
///
/// A listener exiting before the signal is an error even when it exited
/// cleanly.
pub async fn supervise<G, H, S>(
    mut grpc: ListenerHandle<G>,
    mut http: ListenerHandle<H>,
    signal: S,
    shutdown: watch::Sender<bool>,
) -> anyhow::Result<()>
where
    G: std::error::Error + Send + Sync + 'static,
    H: std::error::Error + Send + Sync + 'static,
    S: Future<Output = ()>,
{
    tokio::select! {
        _ = signal => {
            info!("Shutdown signal received, draining listeners");
            let _ = shutdown.send(true);
            let (grpc_result, http_result) = tokio::join!(grpc, http);
            grpc_result?.context("gRPC server failed")?;
            http_result?.context("HTTP server failed")?;
            Ok(())
        }
        grpc_result = &mut grpc => {
            error!("gRPC server exited unexpectedly");
            let _ = shutdown.send(true);
            let http_result = http.await;
            grpc_result?.context("gRPC server failed")?;
            http_result?.context("HTTP server failed")?;
            anyhow::bail!("gRPC server stopped before shutdown was requested")
        }
        http_result = &mut http => {
            error!("HTTP server exited unexpectedly");
            let _ = shutdown.send(true);
            let grpc_result = grpc.await;
            http_result?.context("HTTP server failed")?;
            grpc_result?.context("gRPC server failed")?;
            anyhow::bail!("HTTP server stopped before shutdown was requested")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    fn draining(rx: watch::Receiver<bool>) -> ListenerHandle<io::Error> {
        tokio::spawn(async move {
            stopped(rx).await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn failed_grpc_bind_stops_the_process() {
        let (tx, rx) = watch::channel(false);
        let grpc: ListenerHandle<io::Error> = tokio::spawn(async {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"))
        });
        let http = draining(rx.clone());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            supervise(grpc, http, std::future::pending(), tx),
        )
        .await
        .expect("supervisor returns without a signal");

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("gRPC server failed"));
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn clean_early_exit_is_still_an_error() {
        let (tx, rx) = watch::channel(false);
        let grpc = draining(rx.clone());
        let http: ListenerHandle<io::Error> = tokio::spawn(async { Ok(()) });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            supervise(grpc, http, std::future::pending(), tx),
        )
        .await
        .expect("supervisor returns without a signal");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("HTTP server stopped"));
    }

    #[tokio::test]
    async fn signal_drains_both_listeners() {
        let (tx, rx) = watch::channel(false);
        let grpc = draining(rx.clone());
        let http = draining(rx);

        supervise(grpc, http, async {}, tx)
            .await
            .expect("clean shutdown");
    }
}
