//! MAC-48 link-layer addresses

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC-48 address {0:?}")]
pub struct AddressParseError(pub String);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Mac48Address([u8; 6]);

impl Mac48Address {
    pub const BROADCAST: Mac48Address = Mac48Address([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Mac48Address(octets)
    }

    /// Deterministic address for the `index`-th allocated interface, using the
    /// low 48 bits of `index` in network order.
    pub fn from_index(index: u64) -> Self {
        let b = index.to_be_bytes();
        Mac48Address([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// True for group (multicast or broadcast) addresses.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// 01:00:5e followed by the low 23 bits of the group address.
    pub fn multicast_ipv4(group: Ipv4Addr) -> Self {
        let g = group.octets();
        Mac48Address([0x01, 0x00, 0x5e, g[1] & 0x7f, g[2], g[3]])
    }

    /// 33:33 followed by the low 32 bits of the group address.
    pub fn multicast_ipv6(group: Ipv6Addr) -> Self {
        let g = group.octets();
        Mac48Address([0x33, 0x33, g[12], g[13], g[14], g[15]])
    }
}

impl fmt::Display for Mac48Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for Mac48Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Mac48Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| !p.is_empty() && p.len() <= 2)
                .ok_or_else(|| AddressParseError(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(Mac48Address(octets))
    }
}

impl Serialize for Mac48Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Mac48Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: Mac48Address = "00:00:00:00:00:2a".parse().unwrap();
        assert_eq!(addr, Mac48Address::from_index(42));
        assert_eq!(addr.to_string(), "00:00:00:00:00:2a");
        assert!("00:00:00:00:00".parse::<Mac48Address>().is_err());
        assert!("00:00:00:00:00:00:00".parse::<Mac48Address>().is_err());
        assert!("zz:00:00:00:00:00".parse::<Mac48Address>().is_err());
    }

    #[test]
    fn test_classification() {
        assert!(Mac48Address::BROADCAST.is_broadcast());
        assert!(Mac48Address::BROADCAST.is_group());
        let mcast = Mac48Address::multicast_ipv4(Ipv4Addr::new(224, 129, 2, 3));
        assert_eq!(mcast.to_string(), "01:00:5e:01:02:03");
        assert!(mcast.is_group());
        assert!(!mcast.is_broadcast());
        assert!(!Mac48Address::from_index(1).is_group());
    }

    #[test]
    fn test_serde_as_string() {
        let addr = Mac48Address::from_index(7);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"00:00:00:00:00:07\"");
        let back: Mac48Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
