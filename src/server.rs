//! Accept loop for one listen endpoint.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{Chain, ListenEndpoint};
use crate::logger::Logger;
use crate::session::Session;
use crate::upstream::Dial;

pub struct Server<D> {
    endpoint: Arc<ListenEndpoint>,
    chains: Arc<[Chain]>,
    dialer: Arc<D>,
    idle_timeout: Duration,
    logger: Logger,
}

impl<D: Dial> Server<D> {
    pub fn new(
        endpoint: ListenEndpoint,
        chains: Arc<[Chain]>,
        dialer: Arc<D>,
        idle_timeout: Duration,
    ) -> Self {
        let logger = Logger::new(format_args!("[server] {endpoint}"));
        Self {
            endpoint: Arc::new(endpoint),
            chains,
            dialer,
            idle_timeout,
            logger,
        }
    }

    pub fn endpoint(&self) -> &ListenEndpoint {
        &self.endpoint
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub async fn bind(&self) -> io::Result<TcpListener> {
        TcpListener::bind(self.endpoint.addr()).await
    }

    /// Bind the endpoint and serve it until accepting fails.
    pub async fn run(self) -> io::Result<()> {
        self.logger.info(format_args!(
            "Starting server (socks4 enabled: {} socks5 enabled: {})",
            self.endpoint.enable_socks4, self.endpoint.enable_socks5
        ));

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.logger
                    .warn(format_args!("Could not open listener: {e}"));
                return Err(e);
            }
        };

        self.serve(listener).await
    }

    /// Accept forever, one session task per connection. An accept error
    /// stops this listener only.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        self.logger.info("Listener opened and awaiting connections");
        if !self.chains.is_empty() {
            self.logger.debug(format_args!(
                "{} proxy chain(s) configured, sessions use the fixed tunnel",
                self.chains.len()
            ));
        }

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    self.logger
                        .warn(format_args!("Error during accept loop: {e}"));
                    return Err(e);
                }
            };

            self.logger.info(format_args!("Accepted {peer}"));

            let session = Session::new(
                socket,
                Arc::clone(&self.endpoint),
                self.idle_timeout,
                self.logger.extend(format_args!("[client] {peer}")),
            );
            let dialer = Arc::clone(&self.dialer);
            tokio::spawn(async move {
                let _ = session.run(dialer.as_ref()).await;
            });
        }
    }
}
