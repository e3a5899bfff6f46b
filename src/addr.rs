//! IPv4 <-> network byte order.
//!
//! SOCKS4 can only carry 4-byte addresses, so nothing here tries to squeeze
//! an IPv6 address onto the wire.

use std::net::{IpAddr, Ipv4Addr};

use crate::{Error, Result};

pub fn encode_ipv4(addr: Ipv4Addr) -> [u8; 4] {
    addr.octets()
}

pub fn decode_ipv4(bytes: [u8; 4]) -> Ipv4Addr {
    Ipv4Addr::from(bytes)
}

/// Raw address bytes to the 4-byte wire form.
pub fn ip_to_wire(ip: &[u8]) -> Result<[u8; 4]> {
    match ip.len() {
        4 => Ok([ip[0], ip[1], ip[2], ip[3]]),
        16 => Err(Error::UnsupportedAddressFamily),
        n => Err(Error::InvalidAddressSize(n)),
    }
}

pub fn ip_addr_to_wire(ip: IpAddr) -> Result<[u8; 4]> {
    match ip {
        IpAddr::V4(v4) => Ok(encode_ipv4(v4)),
        IpAddr::V6(_) => Err(Error::UnsupportedAddressFamily),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn big_endian_octets() {
        let addr = Ipv4Addr::new(93, 184, 216, 34);
        assert_eq!(encode_ipv4(addr), [93, 184, 216, 34]);
        assert_eq!(decode_ipv4([93, 184, 216, 34]), addr);
        assert_eq!(u32::from_be_bytes(encode_ipv4(addr)), u32::from(addr));
    }

    #[test]
    fn wire_format_rejects_other_sizes() {
        assert_eq!(ip_to_wire(&[10, 0, 0, 1]).unwrap(), [10, 0, 0, 1]);
        assert!(matches!(
            ip_to_wire(&Ipv6Addr::LOCALHOST.octets()),
            Err(Error::UnsupportedAddressFamily)
        ));
        assert!(matches!(ip_to_wire(&[1, 2, 3]), Err(Error::InvalidAddressSize(3))));
        assert!(matches!(ip_to_wire(&[]), Err(Error::InvalidAddressSize(0))));
    }

    #[test]
    fn typed_address() {
        assert_eq!(
            ip_addr_to_wire(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap(),
            [127, 0, 0, 1]
        );
        assert!(matches!(
            ip_addr_to_wire(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            Err(Error::UnsupportedAddressFamily)
        ));
    }
}
