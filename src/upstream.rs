//! Opening the connection to the next hop.

use std::fmt;
use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::TunnelConfig;

/// Opens a byte stream to the upstream tunnel endpoint.
///
/// Sessions only see this trait, so a chain resolver can take the place of
/// [`TunnelEndpoint`] later without touching session or relay code.
pub trait Dial: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// A fixed host and port, dialed over TCP.
#[derive(Debug, Clone)]
pub struct TunnelEndpoint {
    host: String,
    port: u16,
}

impl TunnelEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<&TunnelConfig> for TunnelEndpoint {
    fn from(conf: &TunnelConfig) -> Self {
        Self::new(conf.host.clone(), conf.port)
    }
}

impl fmt::Display for TunnelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Dial for TunnelEndpoint {
    type Stream = TcpStream;

    async fn dial(&self) -> io::Result<TcpStream> {
        TcpStream::connect((self.host.as_str(), self.port)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dials_the_configured_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = TunnelEndpoint::new("127.0.0.1", port);
        assert_eq!(endpoint.to_string(), format!("127.0.0.1:{port}"));

        let (dialed, accepted) = tokio::join!(endpoint.dial(), listener.accept());
        let dialed = dialed.unwrap();
        let (_, peer) = accepted.unwrap();
        assert_eq!(dialed.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn refused_dial_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = TunnelEndpoint::from(&TunnelConfig {
            host: "127.0.0.1".into(),
            port,
        });
        assert!(endpoint.dial().await.is_err());
    }
}
