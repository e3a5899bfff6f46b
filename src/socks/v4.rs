//! SOCKS4 framing.
//!
//! Only the fixed-size request is accepted: the user-id trailer must be
//! empty, so every request is exactly 9 bytes.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use bytebuffer::ByteBuffer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::CommandType;
use crate::addr;
use crate::{Error, Result};

pub const VERSION: u8 = 4;

const CMD_CONNECT: u8 = 1;
const CMD_BIND: u8 = 2;

pub const REQUEST_GRANTED: u8 = 90;
pub const REQUEST_REJECTED: u8 = 91;

const COMMAND_LEN: usize = 9;
const RESPONSE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { addr: IpAddr, port: u16 },
    /// Parsed so it can be reported, never forwarded
    Bind { addr: IpAddr, port: u16 },
}

impl Command {
    pub fn connect(addr: IpAddr, port: u16) -> Self {
        Command::Connect { addr, port }
    }

    pub fn kind(&self) -> CommandType {
        match self {
            Command::Connect { .. } => CommandType::Connect,
            Command::Bind { .. } => CommandType::Bind,
        }
    }

    pub fn addr(&self) -> IpAddr {
        match self {
            Command::Connect { addr, .. } | Command::Bind { addr, .. } => *addr,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Command::Connect { port, .. } | Command::Bind { port, .. } => *port,
        }
    }

    /// Read one request. Fails on a short stream, a non-empty user id or an
    /// unknown command code.
    pub async fn read<R>(reader: &mut R) -> Result<Command>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0; COMMAND_LEN];
        reader.read_exact(&mut raw).await?;

        let mut pkt = ByteBuffer::from_bytes(&raw);
        let version = pkt.read_u8()?;
        let code = pkt.read_u8()?;
        let port = pkt.read_u16()?;
        let ip = pkt.read_u32()?;
        let user_id = pkt.read_u8()?;

        if version != VERSION {
            return Err(Error::InvalidProtocolVersion(version));
        }

        if user_id != 0 {
            return Err(Error::UnsupportedUserIdField);
        }

        let addr = IpAddr::V4(addr::decode_ipv4(ip.to_be_bytes()));

        match code {
            CMD_CONNECT => Ok(Command::Connect { addr, port }),
            CMD_BIND => Ok(Command::Bind { addr, port }),
            code => Err(Error::InvalidCommandCode(code)),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let (addr, port) = match self {
            Command::Connect { addr, port } => (*addr, *port),
            Command::Bind { .. } => return Err(Error::NotSupported("socks4 bind")),
        };

        let ip = addr::ip_addr_to_wire(addr)?;

        let mut msg = ByteBuffer::new();
        msg.write_u8(VERSION);
        msg.write_u8(CMD_CONNECT);
        msg.write_u16(port);
        msg.write_bytes(&ip);
        msg.write_u8(0);
        Ok(msg.into_vec())
    }

    pub async fn send<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let msg = self.encode()?;
        writer.write_all(&msg).await?;
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr(), self.port())
    }
}

/// An 8-byte reply. Every field is kept so that re-encoding yields the
/// bytes the upstream sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: u8,
    pub result: u8,
    pub port: u16,
    pub addr: Ipv4Addr,
}

impl Response {
    pub fn rejected() -> Self {
        Response {
            version: 0,
            result: REQUEST_REJECTED,
            port: 0,
            addr: Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == REQUEST_GRANTED
    }

    pub async fn read<R>(reader: &mut R) -> Result<Response>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0; RESPONSE_LEN];
        reader.read_exact(&mut raw).await?;

        let mut pkt = ByteBuffer::from_bytes(&raw);
        let version = pkt.read_u8()?;
        let result = pkt.read_u8()?;
        let port = pkt.read_u16()?;
        let ip = pkt.read_u32()?;

        Ok(Response {
            version,
            result,
            port,
            addr: addr::decode_ipv4(ip.to_be_bytes()),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut msg = ByteBuffer::new();
        msg.write_u8(self.version);
        msg.write_u8(self.result);
        msg.write_u16(self.port);
        msg.write_bytes(&addr::encode_ipv4(self.addr));
        msg.into_vec()
    }

    pub async fn send<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        Ok(())
    }
}
