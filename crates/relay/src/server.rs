//! Loopback TCP listener: one request per connection, answered and closed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::framer::{FrameLimits, RequestFramer};
use crate::response::write_response;
use crate::router::Router;

pub struct RelayServer {
    listener: TcpListener,
    router: Arc<Router>,
    limits: FrameLimits,
}

impl RelayServer {
    /// Bind `addr`. Anything other than a loopback address is refused.
    pub async fn bind(addr: SocketAddr, router: Router, limits: FrameLimits) -> io::Result<Self> {
        if !addr.ip().is_loopback() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to bind non-loopback address {addr}"),
            ));
        }

        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: Arc::new(router),
            limits,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` flips to `true` or its sender is
    /// dropped. Accept failures are logged and the loop keeps going.
    ///
    /// After the signal the listener is closed and `serve` waits for every
    /// accepted connection to finish. There is no drain timeout.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        let RelayServer {
            listener,
            router,
            limits,
        } = self;
        if let Ok(addr) = listener.local_addr() {
            info!("Relay listening on http://{}", addr);
        }

        let mut connections = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join_failure(joined);
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("Accept failed: {}", err);
                            continue;
                        }
                    };

                    if !peer.ip().is_loopback() {
                        warn!(%peer, "Dropping connection from non-loopback peer");
                        continue;
                    }

                    let router = router.clone();
                    connections.spawn(async move {
                        if let Err(err) = serve_connection(stream, &router, limits).await {
                            error!(%peer, "Connection error: {}", err);
                        }
                    });
                }
            }
        }

        drop(listener);
        info!(
            in_flight = connections.len(),
            "Relay stopped accepting connections"
        );
        while let Some(joined) = connections.join_next().await {
            log_join_failure(joined);
        }
        info!("Relay drained");
    }
}

fn log_join_failure(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        error!("Connection task failed: {}", err);
    }
}

/// Frame one request from `stream`, route it, write the answer and close.
pub async fn serve_connection<S>(mut stream: S, router: &Router, limits: FrameLimits) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = match RequestFramer::read_from(&mut stream, limits).await {
        Ok(request) => {
            let response = router.handle(&request).await;
            debug!(
                method = %request.method,
                path = %request.path,
                status = response.status(),
                "request handled"
            );
            response
        }
        Err(err) => {
            let err = RelayError::from(err);
            debug!(code = err.code(), "rejecting unframeable request: {}", err);
            err.into_response()
        }
    };

    write_response(&mut stream, &response).await
}
