//! Packets, the Ethernet-style link header and queue-side packet tags

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Mac48Address;
use crate::time::SimTime;
use crate::types::{NodeId, PacketUid, ProtocolNumber};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short for link header: {available} of {needed} bytes")]
    Truncated { needed: usize, available: usize },
}

/// An opaque byte-bearing unit travelling through the model.
///
/// Copies made with [`Packet::deep_copy`] keep the uid of the original so
/// traces can correlate the fan-out of a single transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    uid: PacketUid,
    data: Bytes,
}

impl Packet {
    /// A packet of `size` zero bytes.
    pub fn new(size: usize) -> Self {
        Self::from_payload(vec![0u8; size])
    }

    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            data: payload.into(),
        }
    }

    pub fn uid(&self) -> PacketUid {
        self.uid
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// A copy with its own buffer.
    pub fn deep_copy(&self) -> Packet {
        Packet {
            uid: self.uid,
            data: Bytes::copy_from_slice(&self.data),
        }
    }

    pub fn add_header(&mut self, header: &EthernetHeader) {
        let mut buf = BytesMut::with_capacity(EthernetHeader::SIZE + self.data.len());
        header.write(&mut buf);
        buf.put_slice(&self.data);
        self.data = buf.freeze();
    }

    pub fn peek_header(&self) -> Result<EthernetHeader, PacketError> {
        EthernetHeader::read(&self.data)
    }

    pub fn remove_header(&mut self) -> Result<EthernetHeader, PacketError> {
        let header = self.peek_header()?;
        self.data = self.data.slice(EthernetHeader::SIZE..);
        Ok(header)
    }
}

/// 14-byte link header: destination, source, protocol (length/type).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetHeader {
    pub destination: Mac48Address,
    pub source: Mac48Address,
    pub protocol: ProtocolNumber,
}

impl EthernetHeader {
    pub const SIZE: usize = 14;

    pub fn new(source: Mac48Address, destination: Mac48Address, protocol: ProtocolNumber) -> Self {
        Self {
            destination,
            source,
            protocol,
        }
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.destination.octets());
        buf.put_slice(&self.source.octets());
        buf.put_u16(self.protocol);
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut cursor = &mut out[..];
        self.write(&mut cursor);
        out
    }

    pub fn read(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::Truncated {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        Ok(Self {
            destination: Mac48Address::new(dst),
            source: Mac48Address::new(src),
            protocol: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// The frame a sniffer would see: header followed by `payload`.
    pub fn frame(&self, payload: &[u8]) -> Packet {
        let mut buf = BytesMut::with_capacity(Self::SIZE + payload.len());
        self.write(&mut buf);
        buf.put_slice(payload);
        Packet::from_payload(buf.freeze())
    }
}

/// Which nodes a queued transmission is meant for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Broadcast to every interface on the channel.
    #[default]
    All,
    /// Only the interface owned by this node.
    Node(NodeId),
}

impl Destination {
    pub fn admits(&self, node: NodeId) -> bool {
        match self {
            Destination::All => true,
            Destination::Node(id) => *id == node,
        }
    }
}

/// Side-channel metadata attached while a packet sits in a device queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketTags {
    pub timestamp: Option<SimTime>,
    pub destination: Option<Destination>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedPacket {
    pub packet: Packet,
    pub tags: PacketTags,
}

impl TaggedPacket {
    pub fn new(packet: Packet, enqueued_at: SimTime, destination: Destination) -> Self {
        Self {
            packet,
            tags: PacketTags {
                timestamp: Some(enqueued_at),
                destination: Some(destination),
            },
        }
    }

    /// Bare packet with no tags, as handled by queue unit tests.
    pub fn untagged(packet: Packet) -> Self {
        Self {
            packet,
            tags: PacketTags::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    /// Strips both tags, returning the packet and what the tags carried.
    pub fn detach(self) -> (Packet, Option<SimTime>, Destination) {
        let TaggedPacket { packet, tags } = self;
        (packet, tags.timestamp, tags.destination.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = EthernetHeader::new(
            Mac48Address::from_index(1),
            Mac48Address::BROADCAST,
            0x0800,
        );
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..6], &[0xff; 6]);
        assert_eq!(&bytes[6..12], &[0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[12..14], &[0x08, 0x00]);
        assert_eq!(EthernetHeader::read(&bytes).unwrap(), header);
    }

    #[test]
    fn test_add_and_remove_header() {
        let mut packet = Packet::from_payload(vec![1u8, 2, 3]);
        let uid = packet.uid();
        let header = EthernetHeader::new(Mac48Address::from_index(2), Mac48Address::from_index(3), 17);
        packet.add_header(&header);
        assert_eq!(packet.size(), 17);
        assert_eq!(packet.peek_header().unwrap(), header);
        assert_eq!(packet.remove_header().unwrap(), header);
        assert_eq!(packet.data(), &[1, 2, 3]);
        assert_eq!(packet.uid(), uid);
        assert!(matches!(
            packet.remove_header(),
            Err(PacketError::Truncated { needed: 14, available: 3 })
        ));
    }

    #[test]
    fn test_deep_copy_keeps_uid_and_bytes() {
        let packet = Packet::from_payload(vec![9u8; 32]);
        let copy = packet.deep_copy();
        assert_eq!(copy, packet);
        assert_ne!(copy.data().as_ptr(), packet.data().as_ptr());
        assert_ne!(Packet::new(1).uid(), Packet::new(1).uid());
    }

    #[test]
    fn test_detach_defaults_to_broadcast() {
        let (_, ts, dest) = TaggedPacket::untagged(Packet::new(4)).detach();
        assert_eq!(ts, None);
        assert_eq!(dest, Destination::All);
        assert!(Destination::All.admits(7));
        assert!(Destination::Node(7).admits(7));
        assert!(!Destination::Node(7).admits(8));
    }
}
