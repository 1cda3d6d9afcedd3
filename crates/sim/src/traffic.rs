//! Constant bit rate packet sources

use bytes::{BufMut, BytesMut};
use log::debug;
use serde::{Deserialize, Serialize};
use simple_wireless_core::{DataRate, DeviceId, Mac48Address, NodeId, Packet, ProtocolNumber, SimTime};
use simple_wireless_radio::{RadioError, Scheduler, WirelessNetwork};

use crate::simulator::SimContext;

pub const ETHERTYPE_IPV4: ProtocolNumber = 0x0800;

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// An IPv4/UDP datagram of `size` bytes in total, padded with zeros.
/// Checksums are left at zero.
pub fn udp_datagram(src_port: u16, dst_port: u16, size: usize) -> Vec<u8> {
    let size = size.max(IPV4_HEADER_LEN + UDP_HEADER_LEN);
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u8(0x45);
    buf.put_u8(0);
    buf.put_u16(size as u16);
    buf.put_u32(0);
    buf.put_u8(64);
    buf.put_u8(17);
    buf.put_u16(0);
    buf.put_slice(&[10, 1, 1, 1]);
    buf.put_slice(&[10, 1, 1, 255]);
    buf.put_u16(src_port);
    buf.put_u16(dst_port);
    buf.put_u16((size - IPV4_HEADER_LEN) as u16);
    buf.put_u16(0);
    buf.resize(size, 0);
    buf.to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Zero bytes.
    Raw,
    /// UDP to the given destination port.
    Udp(u16),
}

impl Payload {
    fn build(self, size: usize) -> Packet {
        match self {
            Payload::Raw => Packet::new(size),
            Payload::Udp(port) => Packet::from_payload(udp_datagram(port, port, size)),
        }
    }
}

/// Always-on source sending fixed-size packets at a fixed rate between
/// its start and stop times.
#[derive(Debug, Clone)]
pub struct ConstantRateSource {
    device: DeviceId,
    node: NodeId,
    to: Mac48Address,
    protocol: ProtocolNumber,
    packet_size: usize,
    payload: Payload,
    interval: SimTime,
    start: SimTime,
    stop: SimTime,
    max_packets: Option<u64>,
    sent: u64,
}

impl ConstantRateSource {
    pub fn new(device: DeviceId, node: NodeId, to: Mac48Address, packet_size: usize, rate: DataRate) -> Self {
        Self {
            device,
            node,
            to,
            protocol: ETHERTYPE_IPV4,
            packet_size,
            payload: Payload::Raw,
            interval: rate.tx_time(packet_size),
            start: SimTime::ZERO,
            stop: SimTime::MAX,
            max_packets: None,
            sent: 0,
        }
    }

    pub fn with_window(mut self, start: SimTime, stop: SimTime) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn with_max_packets(mut self, max: u64) -> Self {
        self.max_packets = Some(max);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolNumber) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn start(&self) -> SimTime {
        self.start
    }

    pub fn interval(&self) -> SimTime {
        self.interval
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn exhausted(&self, now: SimTime) -> bool {
        now >= self.stop || self.max_packets.is_some_and(|max| self.sent >= max)
    }

    /// Sends one packet and returns the delay until the next one, or `None`
    /// once the source is done.
    pub fn fire(
        &mut self,
        network: &mut WirelessNetwork,
        ctx: &mut SimContext,
    ) -> Result<Option<SimTime>, RadioError> {
        let now = ctx.now();
        if self.exhausted(now) {
            debug!("Source on {} done after {} packets", self.device, self.sent);
            return Ok(None);
        }
        let packet = self.payload.build(self.packet_size);
        network.send(self.device, packet, self.to, self.protocol, ctx)?;
        self.sent += 1;
        if self.exhausted(now + self.interval) {
            return Ok(None);
        }
        Ok(Some(self.interval))
    }
}
