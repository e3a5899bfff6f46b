//! Errors raised while framing SOCKS messages.

use std::io;

use thiserror::Error;

/// Codec failure for a single SOCKS exchange.
#[derive(Error, Debug)]
pub enum Error {
    /// The stream ended before a full message was read
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    #[error("invalid socks version {0}")]
    InvalidProtocolVersion(u8),

    /// SOCKS4 user-id extension, refused rather than skipped
    #[error("socks4: specifying a user id is unsupported")]
    UnsupportedUserIdField,

    #[error("invalid command code {0}")]
    InvalidCommandCode(u8),

    #[error("invalid address type {0}")]
    InvalidAddressType(u8),

    #[error("can't encode an IPv6 address in 4 bytes")]
    UnsupportedAddressFamily,

    #[error("unknown ip size {0}")]
    InvalidAddressSize(usize),

    #[error("domain name is not valid utf-8")]
    InvalidDomain,

    /// Client offered no method we accept (only "no authentication" is)
    #[error("no acceptable authentication method offered")]
    NoAcceptableMethod,

    /// Upstream picked a method other than "no authentication"
    #[error("upstream selected authentication method {0}")]
    UnexpectedMethod(u8),

    /// Recognised on the wire, but never forwarded
    #[error("{0} is not supported")]
    NotSupported(&'static str),

    #[error("network error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEndOfStream,
            _ => Error::Io(e),
        }
    }
}

impl Error {
    /// Malformed or hostile input, as opposed to transport trouble or an
    /// unimplemented feature.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::NotSupported(_))
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Error::NotSupported(_))
    }
}
