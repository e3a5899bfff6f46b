//! SOCKS5 framing (RFC 1928), without authentication sub-negotiation.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytebuffer::ByteBuffer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::CommandType;
use crate::addr;
use crate::{Error, Result};

pub const VERSION: u8 = 5;

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NONE_ACCEPTABLE: u8 = 0xff;

const CMD_CONNECT: u8 = 1;
const CMD_BIND: u8 = 2;
const CMD_UDP_ASSOCIATE: u8 = 3;

const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;

/// Domain names are kept as raw bytes; RFC 1928 gives them no encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
    Ipv4(Ipv4Addr),
    Domain(Vec<u8>),
    Ipv6(Ipv6Addr),
}

impl Addr {
    fn atyp(&self) -> u8 {
        match self {
            Addr::Ipv4(_) => ATYP_IPV4,
            Addr::Domain(_) => ATYP_DOMAIN,
            Addr::Ipv6(_) => ATYP_IPV6,
        }
    }

    async fn read<R>(reader: &mut R, atyp: u8) -> Result<Addr>
    where
        R: AsyncRead + Unpin,
    {
        match atyp {
            ATYP_IPV4 => {
                let mut ip = [0; 4];
                reader.read_exact(&mut ip).await?;
                Ok(Addr::Ipv4(addr::decode_ipv4(ip)))
            }
            ATYP_DOMAIN => {
                let len = reader.read_u8().await?;
                let mut domain = vec![0; len as usize];
                reader.read_exact(&mut domain).await?;
                Ok(Addr::Domain(domain))
            }
            ATYP_IPV6 => {
                let mut ip = [0; 16];
                reader.read_exact(&mut ip).await?;
                Ok(Addr::Ipv6(Ipv6Addr::from(ip)))
            }
            atyp => Err(Error::InvalidAddressType(atyp)),
        }
    }

    fn write(&self, msg: &mut ByteBuffer) -> Result<()> {
        match self {
            Addr::Ipv4(ip) => msg.write_bytes(&addr::encode_ipv4(*ip)),
            Addr::Domain(domain) => {
                let len = u8::try_from(domain.len()).map_err(|_| Error::InvalidDomain)?;
                msg.write_u8(len);
                msg.write_bytes(domain);
            }
            Addr::Ipv6(ip) => msg.write_bytes(&ip.octets()),
        }
        Ok(())
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Ipv4(ip) => write!(f, "{ip}"),
            Addr::Domain(domain) => write!(f, "{}", String::from_utf8_lossy(domain)),
            Addr::Ipv6(ip) => write!(f, "[{ip}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandType,
    pub addr: Addr,
    pub port: u16,
}

impl Command {
    pub fn connect(addr: Addr, port: u16) -> Self {
        Command {
            kind: CommandType::Connect,
            addr,
            port,
        }
    }

    /// Run the client side of method negotiation, then read the request.
    ///
    /// The client is told "no authentication" when it offers it. Otherwise
    /// it gets `0xff` and the call fails.
    pub async fn accept<S>(stream: &mut S) -> Result<Command>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let version = stream.read_u8().await?;
        if version != VERSION {
            return Err(Error::InvalidProtocolVersion(version));
        }

        let method_num = stream.read_u8().await?;
        let mut methods = vec![0; method_num as usize];
        stream.read_exact(&mut methods).await?;

        if !methods.contains(&METHOD_NO_AUTH) {
            stream
                .write_all(&[VERSION, METHOD_NONE_ACCEPTABLE])
                .await?;
            return Err(Error::NoAcceptableMethod);
        }
        stream.write_all(&[VERSION, METHOD_NO_AUTH]).await?;

        Self::read(stream).await
    }

    /// Read a request once negotiation is done.
    pub async fn read<R>(reader: &mut R) -> Result<Command>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0; 4];
        reader.read_exact(&mut head).await?;
        let [version, code, _reserved, atyp] = head;

        if version != VERSION {
            return Err(Error::InvalidProtocolVersion(version));
        }

        let kind = match code {
            CMD_CONNECT => CommandType::Connect,
            CMD_BIND => CommandType::Bind,
            CMD_UDP_ASSOCIATE => CommandType::UdpAssociate,
            code => return Err(Error::InvalidCommandCode(code)),
        };

        let addr = Addr::read(reader, atyp).await?;
        let port = reader.read_u16().await?;

        Ok(Command { kind, addr, port })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self.kind {
            CommandType::Connect => {}
            CommandType::Bind => return Err(Error::NotSupported("socks5 bind")),
            CommandType::UdpAssociate => {
                return Err(Error::NotSupported("socks5 udp associate"))
            }
        }

        let mut msg = ByteBuffer::new();
        msg.write_u8(VERSION);
        msg.write_u8(CMD_CONNECT);
        msg.write_u8(0);
        msg.write_u8(self.addr.atyp());
        self.addr.write(&mut msg)?;
        msg.write_u16(self.port);
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
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Greet an upstream SOCKS5 server, offering only "no authentication".
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[VERSION, 1, METHOD_NO_AUTH]).await?;

    let mut reply = [0; 2];
    stream.read_exact(&mut reply).await?;
    let [version, method] = reply;

    if version != VERSION {
        return Err(Error::InvalidProtocolVersion(version));
    }
    if method != METHOD_NO_AUTH {
        return Err(Error::UnexpectedMethod(method));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: u8,
    pub reply: u8,
    pub reserved: u8,
    pub addr: Addr,
    pub port: u16,
}

impl Response {
    pub fn command_not_supported() -> Self {
        Response {
            version: VERSION,
            reply: REPLY_COMMAND_NOT_SUPPORTED,
            reserved: 0,
            addr: Addr::Ipv4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.reply == REPLY_SUCCEEDED
    }

    pub async fn read<R>(reader: &mut R) -> Result<Response>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0; 4];
        reader.read_exact(&mut head).await?;
        let [version, reply, reserved, atyp] = head;

        if version != VERSION {
            return Err(Error::InvalidProtocolVersion(version));
        }

        let addr = Addr::read(reader, atyp).await?;
        let port = reader.read_u16().await?;

        Ok(Response {
            version,
            reply,
            reserved,
            addr,
            port,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut msg = ByteBuffer::new();
        msg.write_u8(self.version);
        msg.write_u8(self.reply);
        msg.write_u8(self.reserved);
        msg.write_u8(self.addr.atyp());
        self.addr.write(&mut msg)?;
        msg.write_u16(self.port);
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn accept_domain_connect() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[5, 2, 2, 0]).await.unwrap();
        client
            .write_all(&[5, 1, 0, 3, 11])
            .await
            .unwrap();
        client.write_all(b"example.com").await.unwrap();
        client.write_all(&[0x01, 0xbb]).await.unwrap();

        let cmd = Command::accept(&mut server).await.unwrap();
        assert_eq!(cmd.kind, CommandType::Connect);
        assert_eq!(cmd.addr, Addr::Domain("example.com".into()));
        assert_eq!(cmd.port, 443);
        assert_eq!(cmd.to_string(), "example.com:443");

        let mut method = [0; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [5, 0]);
    }

    #[tokio::test]
    async fn accept_without_no_auth_method() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 1, 2]).await.unwrap();

        let err = Command::accept(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::NoAcceptableMethod));

        let mut method = [0; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [5, 0xff]);
    }

    #[tokio::test]
    async fn request_codes_and_address_types() {
        let udp = [5, 3, 0, 1, 0, 0, 0, 0, 0, 0];
        let cmd = Command::read(&mut &udp[..]).await.unwrap();
        assert_eq!(cmd.kind, CommandType::UdpAssociate);
        assert!(cmd.encode().unwrap_err().is_not_supported());

        let bind = [5, 2, 0, 1, 127, 0, 0, 1, 0, 80];
        let cmd = Command::read(&mut &bind[..]).await.unwrap();
        assert_eq!(cmd.kind, CommandType::Bind);
        assert!(cmd.encode().unwrap_err().is_not_supported());

        let bad_code = [5, 9, 0, 1, 0, 0, 0, 0, 0, 0];
        let err = Command::read(&mut &bad_code[..]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCommandCode(9)));

        let bad_atyp = [5, 1, 0, 2, 0, 0, 0, 0, 0, 0];
        let err = Command::read(&mut &bad_atyp[..]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddressType(2)));
    }

    #[tokio::test]
    async fn ipv6_connect_reencodes() {
        let mut raw = vec![5, 1, 0, 4];
        raw.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        raw.extend_from_slice(&[0, 22]);

        let cmd = Command::read(&mut &raw[..]).await.unwrap();
        assert_eq!(cmd.addr, Addr::Ipv6(Ipv6Addr::LOCALHOST));
        assert_eq!(cmd.encode().unwrap(), raw);
    }

    #[tokio::test]
    async fn upstream_negotiation() {
        let (mut upstream, mut gateway) = duplex(64);
        upstream.write_all(&[5, 0]).await.unwrap();
        negotiate(&mut gateway).await.unwrap();

        let mut greeting = [0; 3];
        upstream.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [5, 1, 0]);

        upstream.write_all(&[5, 2]).await.unwrap();
        let err = negotiate(&mut gateway).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedMethod(2)));
    }

    #[tokio::test]
    async fn reply_is_kept_verbatim() {
        let raw = [5, 5, 0, 1, 10, 0, 0, 1, 0x04, 0x38];
        let rsp = Response::read(&mut &raw[..]).await.unwrap();
        assert!(!rsp.is_success());
        assert_eq!(rsp.reply, 5);
        assert_eq!(rsp.encode().unwrap(), raw);

        let truncated = [5, 0, 0, 1, 10];
        let err = Response::read(&mut &truncated[..]).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfStream));
    }

    #[tokio::test]
    async fn reply_with_raw_domain_bytes() {
        let raw = [5, 0, 0, 3, 3, b'a', 0xff, b'b', 0, 80];
        let rsp = Response::read(&mut &raw[..]).await.unwrap();
        assert_eq!(rsp.addr, Addr::Domain(vec![b'a', 0xff, b'b']));
        assert_eq!(rsp.addr.to_string(), "a\u{fffd}b");
        assert_eq!(rsp.encode().unwrap(), raw);
    }

    #[test]
    fn synthesized_failure() {
        let rsp = Response::command_not_supported();
        assert!(!rsp.is_success());
        assert_eq!(rsp.encode().unwrap(), [5, 7, 0, 1, 0, 0, 0, 0, 0, 0]);
    }
}
