//! TCP front end: accept calls, read the preamble, hand the connection to
//! the matching transfer handler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use shuttle_core::wire::CALL_HEADER_SIZE;
use shuttle_core::{
    CallHeader, Method, MultipleRequest, MultipleResponse, SingleRequest, SingleResponse,
};

use crate::channel::StreamChannel;
use crate::store::Store;
use crate::transfer::{MultipleTransfer, SingleTransfer};

/// How long in-flight calls may run after shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Server<S> {
    store: Arc<S>,
    shutdown_grace: Duration,
}

impl<S: Store> Server<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Accept calls until `shutdown` resolves, then drain.
    ///
    /// Each connection runs in its own task; a failed call is logged and
    /// dropped without touching the others. Calls still running when the
    /// grace period ends are aborted.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr().context("listener has no local address")?;
        tracing::info!(addr = %local, "accepting calls");

        let mut calls = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(in_flight = calls.len(), "shutdown requested, no longer accepting");
                    break;
                }

                Some(joined) = calls.join_next(), if !calls.is_empty() => reap(joined),

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
                    }

                    let store = self.store.clone();
                    let span = tracing::info_span!("call", %peer, method = tracing::field::Empty);
                    calls.spawn(
                        async move {
                            match serve_connection(store, stream).await {
                                Ok(method) => tracing::debug!(method = method.name(), "call complete"),
                                Err(e) => tracing::warn!(error = format!("{e:#}"), "call failed"),
                            }
                        }
                        .instrument(span),
                    );
                }
            }
        }

        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(joined) = calls.join_next().await {
                reap(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = calls.len(),
                grace_secs = self.shutdown_grace.as_secs_f64(),
                "grace period elapsed, aborting in-flight calls"
            );
            calls.abort_all();
            while calls.join_next().await.is_some() {}
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "call task panicked");
        }
    }
}

/// Run one call on an accepted connection: read the [`CallHeader`], serve
/// the method it names, then half-close the write side.
pub async fn serve_connection<S, IO>(store: Arc<S>, mut io: IO) -> Result<Method>
where
    S: Store,
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut raw = [0u8; CALL_HEADER_SIZE];
    io.read_exact(&mut raw)
        .await
        .context("failed to read call header")?;
    let method = CallHeader::parse(&raw).context("rejected call header")?;
    tracing::Span::current().record("method", method.name());

    match method {
        Method::Single => {
            let mut channel = StreamChannel::<_, SingleRequest, SingleResponse>::new(io);
            SingleTransfer::new(store).handle(&mut channel).await?;
            channel.close_send().await?;
        }
        Method::Multiple => {
            let mut channel = StreamChannel::<_, MultipleRequest, MultipleResponse>::new(io);
            MultipleTransfer::new(store).handle(&mut channel).await?;
            channel.close_send().await?;
        }
    }

    Ok(method)
}
