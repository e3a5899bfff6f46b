//! One accepted client, from handshake to relay.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::ListenEndpoint;
use crate::logger::Logger;
use crate::socks::{self, Response, Version};
use crate::tunnel::{self, PumpEnd};
use crate::upstream::Dial;
use crate::Error;

/// Sessions only move forward through these; `Failed` can follow any of
/// the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Handshaking,
    Dialing,
    AwaitingUpstreamResponse,
    Relaying,
    Closed,
    Failed,
}

impl SessionState {
    fn advance(&mut self, next: SessionState, logger: &Logger) {
        debug_assert!(next > *self, "{:?} -> {:?}", self, next);
        logger.debug(format_args!("{:?} -> {:?}", self, next));
        *self = next;
    }
}

/// Why a session ended before relaying.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unacceptable socks command: {0}")]
    Handshake(#[source] Error),

    /// Listener policy, not bad input
    #[error("client tried to use {0} but it's disabled in config")]
    DisabledVersion(Version),

    /// Parsed fine, but never forwarded
    #[error("unsupported socks command: {0}")]
    Unsupported(#[source] Error),

    #[error("failed to create tunnel: {0}")]
    Dial(#[source] io::Error),

    #[error("upstream negotiation failed: {0}")]
    Negotiate(#[source] Error),

    #[error("failed to write command to tunnel socket: {0}")]
    SendCommand(#[source] Error),

    #[error("error reading socks response: {0}")]
    ReadResponse(#[source] Error),

    #[error("failed to forward response to client: {0}")]
    ForwardResponse(#[source] Error),
}

impl SessionError {
    pub fn state(&self) -> SessionState {
        match self {
            SessionError::Handshake(_)
            | SessionError::DisabledVersion(_)
            | SessionError::Unsupported(_) => SessionState::Handshaking,
            SessionError::Dial(_) => SessionState::Dialing,
            _ => SessionState::AwaitingUpstreamResponse,
        }
    }
}

pub struct Session<S> {
    client: BufReader<S>,
    endpoint: Arc<ListenEndpoint>,
    idle_timeout: Duration,
    logger: Logger,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        client: S,
        endpoint: Arc<ListenEndpoint>,
        idle_timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            client: BufReader::new(client),
            endpoint,
            idle_timeout,
            logger,
            state: SessionState::Handshaking,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion. Both sockets are closed when this
    /// returns; the error, if any, has already been logged. A relayed session
    /// yields how each direction ended, as `(client_to_server, server_to_client)`.
    pub async fn run<D: Dial>(mut self, dialer: &D) -> Result<(PumpEnd, PumpEnd), SessionError> {
        let upstream = match self.establish(dialer).await {
            Ok(upstream) => upstream,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.enter(SessionState::Relaying);
        let (c2s, s2c) =
            tunnel::bridge(self.client, upstream, self.idle_timeout, &self.logger).await;
        self.logger
            .debug(format_args!("Relay done (c->s: {c2s:?}, s->c: {s2c:?})"));
        self.state.advance(SessionState::Closed, &self.logger);
        Ok((c2s, s2c))
    }

    async fn establish<D: Dial>(&mut self, dialer: &D) -> Result<D::Stream, SessionError> {
        let version = socks::peek_version(&mut self.client)
            .await
            .map_err(SessionError::Handshake)?;
        if !self.allows(version) {
            return Err(SessionError::DisabledVersion(version));
        }

        let cmd = socks::read_command(&mut self.client)
            .await
            .map_err(SessionError::Handshake)?;
        self.logger.info(format_args!(
            "Got socks command {} {} (protocol version {})",
            cmd.kind(),
            cmd,
            version.code()
        ));

        let request = match cmd.encode() {
            Ok(request) => request,
            Err(e) => {
                if e.is_not_supported() {
                    if let Err(send) = Response::rejected(version).send(&mut self.client).await {
                        self.logger
                            .debug(format_args!("Could not send local rejection: {send}"));
                    }
                    return Err(SessionError::Unsupported(e));
                }
                return Err(SessionError::Handshake(e));
            }
        };

        self.enter(SessionState::Dialing);
        let mut upstream = dialer.dial().await.map_err(SessionError::Dial)?;

        self.enter(SessionState::AwaitingUpstreamResponse);
        socks::negotiate_upstream(&mut upstream, version)
            .await
            .map_err(SessionError::Negotiate)?;

        upstream
            .write_all(&request)
            .await
            .map_err(|e| SessionError::SendCommand(e.into()))?;

        let rsp = socks::read_response(&mut upstream, version)
            .await
            .map_err(SessionError::ReadResponse)?;
        if !rsp.is_success() {
            self.logger
                .info(format_args!("Upstream refused the request (code {})", rsp.code()));
        }

        // The client sees the upstream's real answer, success or not.
        rsp.send(&mut self.client)
            .await
            .map_err(SessionError::ForwardResponse)?;

        Ok(upstream)
    }

    fn allows(&self, version: Version) -> bool {
        match version {
            Version::Socks4 => self.endpoint.enable_socks4,
            Version::Socks5 => self.endpoint.enable_socks5,
        }
    }

    fn enter(&mut self, next: SessionState) {
        self.state.advance(next, &self.logger);
    }

    fn fail(&mut self, e: &SessionError) {
        match e {
            SessionError::Handshake(_)
            | SessionError::DisabledVersion(_)
            | SessionError::Unsupported(_) => self.logger.info(e),
            _ => self.logger.warn(e),
        }
        self.enter(SessionState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        assert!(SessionState::Handshaking < SessionState::Dialing);
        assert!(SessionState::Dialing < SessionState::AwaitingUpstreamResponse);
        assert!(SessionState::Relaying < SessionState::Closed);
        assert!(SessionState::AwaitingUpstreamResponse < SessionState::Failed);
    }

    #[test]
    fn relaying_advances_to_closed() {
        let logger = Logger::new("[test]");
        let mut state = SessionState::AwaitingUpstreamResponse;
        state.advance(SessionState::Relaying, &logger);
        state.advance(SessionState::Closed, &logger);
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn closed_is_never_left() {
        let mut state = SessionState::Closed;
        state.advance(SessionState::Relaying, &Logger::new("[test]"));
    }

    #[test]
    fn error_messages_tell_policy_from_protocol() {
        let policy = SessionError::DisabledVersion(Version::Socks4);
        assert_eq!(
            policy.to_string(),
            "client tried to use socks4 but it's disabled in config"
        );

        let protocol = SessionError::Handshake(Error::UnsupportedUserIdField);
        assert!(protocol.to_string().starts_with("unacceptable socks command"));

        let dial = SessionError::Dial(io::ErrorKind::ConnectionRefused.into());
        assert_eq!(dial.state(), SessionState::Dialing);
        assert!(dial.to_string().starts_with("failed to create tunnel"));

        let bind = SessionError::Unsupported(Error::NotSupported("socks4 bind"));
        assert_eq!(bind.state(), SessionState::Handshaking);
    }
}
