//! SOCKS message codec.
//!
//! The codec is version-agnostic: it never looks at listener configuration.
//! Whether a version is allowed is decided by the session.

pub mod v4;
pub mod v5;

use std::fmt;

use strum_macros::Display;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum Version {
    #[strum(to_string = "socks4")]
    Socks4 = v4::VERSION,
    #[strum(to_string = "socks5")]
    Socks5 = v5::VERSION,
}

impl Version {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            v4::VERSION => Ok(Version::Socks4),
            v5::VERSION => Ok(Version::Socks5),
            code => Err(Error::InvalidProtocolVersion(code)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CommandType {
    Connect,
    Bind,
    UdpAssociate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    V4(v4::Command),
    V5(v5::Command),
}

impl Command {
    pub fn version(&self) -> Version {
        match self {
            Command::V4(_) => Version::Socks4,
            Command::V5(_) => Version::Socks5,
        }
    }

    pub fn kind(&self) -> CommandType {
        match self {
            Command::V4(cmd) => cmd.kind(),
            Command::V5(cmd) => cmd.kind,
        }
    }

    /// Wire form for the upstream; `NotSupported` for commands that are
    /// never forwarded.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Command::V4(cmd) => cmd.encode(),
            Command::V5(cmd) => cmd.encode(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::V4(cmd) => write!(f, "{cmd}"),
            Command::V5(cmd) => write!(f, "{cmd}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    V4(v4::Response),
    V5(v5::Response),
}

impl Response {
    /// Locally made failure, for commands that are never forwarded.
    pub fn rejected(version: Version) -> Self {
        match version {
            Version::Socks4 => Response::V4(v4::Response::rejected()),
            Version::Socks5 => Response::V5(v5::Response::command_not_supported()),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            Response::V4(_) => Version::Socks4,
            Response::V5(_) => Version::Socks5,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::V4(rsp) => rsp.is_success(),
            Response::V5(rsp) => rsp.is_success(),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Response::V4(rsp) => rsp.result,
            Response::V5(rsp) => rsp.reply,
        }
    }

    pub async fn send<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            Response::V4(rsp) => rsp.send(writer).await,
            Response::V5(rsp) => rsp.send(writer).await,
        }
    }
}

/// Look at the first byte without consuming it.
pub async fn peek_version<R>(reader: &mut R) -> Result<Version>
where
    R: AsyncBufRead + Unpin,
{
    let buf = reader.fill_buf().await?;
    let code = *buf.first().ok_or(Error::UnexpectedEndOfStream)?;
    Version::try_from(code)
}

/// Read one client command, dispatching on the version byte.
///
/// SOCKS5 needs to answer method negotiation, hence the write bound.
pub async fn read_command<S>(stream: &mut S) -> Result<Command>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    match peek_version(stream).await? {
        Version::Socks4 => v4::Command::read(stream).await.map(Command::V4),
        Version::Socks5 => v5::Command::accept(stream).await.map(Command::V5),
    }
}

/// Anything the upstream expects before it will take a command.
pub async fn negotiate_upstream<S>(stream: &mut S, version: Version) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match version {
        Version::Socks4 => Ok(()),
        Version::Socks5 => v5::negotiate(stream).await,
    }
}

pub async fn read_response<R>(reader: &mut R, version: Version) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    match version {
        Version::Socks4 => v4::Response::read(reader).await.map(Response::V4),
        Version::Socks5 => v5::Response::read(reader).await.map(Response::V5),
    }
}
