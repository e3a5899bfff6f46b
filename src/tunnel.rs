use std::future::{self, Future};
use std::io;
use std::time::Duration;

use strum_macros::Display;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};

use crate::logger::Logger;

pub const BUF_SIZE: usize = 64 * 1024;

/// Relay direction, used as the log label
#[derive(Display, Clone, Copy, Debug)]
pub enum Direction {
    #[strum(to_string = "[c->s]")]
    ClientToServer,
    #[strum(to_string = "[s->c]")]
    ServerToClient,
}

/// Why a pump stopped. None of these are fatal; every tunnel ends with one.
#[derive(Debug)]
pub enum PumpEnd {
    /// The source was closed from the other side of the tunnel
    SourceClosed,
    Eof,
    /// A read returned no bytes
    Disconnected,
    IdleTimeout,
    ReadError(io::Error),
    WriteError(io::Error),
}

/// Copy `source` into `destination` until the source stops producing.
///
/// Each read gets a fresh deadline of `now + idle_timeout`. A read is
/// written out in full before the next one starts, so a slow destination
/// stalls the source.
pub async fn pump<R, W>(
    source: &mut R,
    destination: &mut W,
    idle_timeout: Duration,
    logger: &Logger,
) -> PumpEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pump_until(source, destination, idle_timeout, future::pending(), logger).await
}

/// Like [`pump`], but stops with [`PumpEnd::SourceClosed`] as soon as
/// `closed` resolves, even while a read is pending.
pub async fn pump_until<R, W, F>(
    source: &mut R,
    destination: &mut W,
    idle_timeout: Duration,
    closed: F,
    logger: &Logger,
) -> PumpEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(closed);
    let mut buf = vec![0; BUF_SIZE];

    let end = loop {
        let deadline = Instant::now() + idle_timeout;
        let read = tokio::select! {
            biased;
            _ = &mut closed => break PumpEnd::SourceClosed,
            read = time::timeout_at(deadline, source.read(&mut buf)) => read,
        };
        let len = match read {
            Err(_) => break PumpEnd::IdleTimeout,
            Ok(Err(e)) => match e.kind() {
                io::ErrorKind::NotConnected => break PumpEnd::SourceClosed,
                io::ErrorKind::UnexpectedEof => break PumpEnd::Eof,
                _ => break PumpEnd::ReadError(e),
            },
            Ok(Ok(0)) => break PumpEnd::Disconnected,
            Ok(Ok(len)) => len,
        };

        if let Err(e) = destination.write_all(&buf[..len]).await {
            break PumpEnd::WriteError(e);
        }
    };

    match &end {
        PumpEnd::SourceClosed => logger.debug("Source already closed"),
        PumpEnd::Eof => logger.info("Disconnected (end of stream)"),
        PumpEnd::Disconnected => logger.info("Disconnected"),
        PumpEnd::IdleTimeout => logger.info(format_args!(
            "Idle for {}s, closing",
            idle_timeout.as_secs_f32()
        )),
        PumpEnd::ReadError(e) => logger.info(format_args!("Misc error: {e}")),
        PumpEnd::WriteError(e) => logger.info(format_args!("Write failed: {e}")),
    }

    end
}

/// Relay between client and upstream in both directions.
///
/// Client to upstream runs on its own task. Once it ends the upstream
/// socket is closed: its write half is shut down and the upstream to client
/// direction stops reading with [`PumpEnd::SourceClosed`]. Returns after
/// both directions ended, as `(client_to_server, server_to_client)`.
pub async fn bridge<C, U>(
    client: C,
    upstream: U,
    idle_timeout: Duration,
    logger: &Logger,
) -> (PumpEnd, PumpEnd)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    // Fires when the client side is done, or if its task is gone.
    let (upstream_closed, closed) = oneshot::channel::<()>();

    let c2s_logger = logger.extend(Direction::ClientToServer);
    let client_to_server = tokio::spawn(async move {
        let end = pump(&mut client_read, &mut upstream_write, idle_timeout, &c2s_logger).await;
        let _ = upstream_write.shutdown().await;
        drop(upstream_closed);
        end
    });

    let s2c_logger = logger.extend(Direction::ServerToClient);
    let s2c = pump_until(
        &mut upstream_read,
        &mut client_write,
        idle_timeout,
        async {
            let _ = closed.await;
        },
        &s2c_logger,
    )
    .await;
    let _ = client_write.shutdown().await;
    drop(upstream_read);

    let c2s = match client_to_server.await {
        Ok(end) => end,
        Err(e) => {
            logger.warn(format_args!("Relay task failed: {e}"));
            PumpEnd::ReadError(io::Error::other(e))
        }
    };

    (c2s, s2c)
}
