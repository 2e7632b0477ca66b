//! TCP listener binding for the RPC server.

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind `0.0.0.0:port`. Returns the listener and the address actually bound,
/// which differs from the request when `port` is 0.
pub async fn bind(port: u16) -> Result<(TcpListener, SocketAddr), ListenerError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let bind_error = |source| ListenerError::Bind { addr, source };

    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok((listener, local_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn port_zero_reports_assigned_port() {
        let (_listener, addr) = bind(0).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_unspecified());
    }

    #[tokio::test]
    async fn occupied_port_is_bind_error() {
        let (_held, addr) = bind(0).await.unwrap();
        let err = bind(addr.port()).await.unwrap_err();
        let ListenerError::Bind { addr: failed, .. } = err;
        assert_eq!(failed.port(), addr.port());
    }
}
