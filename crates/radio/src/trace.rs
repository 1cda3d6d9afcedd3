//! Observation hooks and upward delivery callbacks of a network device

use simple_wireless_core::{DeviceId, Mac48Address, Packet, ProtocolNumber, SimTime};

/// How a received frame relates to the receiving interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Host,
    Broadcast,
    Multicast,
    OtherHost,
}

impl PacketType {
    pub fn classify(to: Mac48Address, own: Mac48Address) -> Self {
        if to == own {
            PacketType::Host
        } else if to.is_broadcast() {
            PacketType::Broadcast
        } else if to.is_group() {
            PacketType::Multicast
        } else {
            PacketType::OtherHost
        }
    }
}

/// Link addressing that travels alongside a header-less packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub from: Mac48Address,
    pub to: Mac48Address,
    pub protocol: ProtocolNumber,
}

/// Receives every observable step of a device. All methods default to
/// doing nothing, so implementors pick the ones they care about.
#[allow(unused_variables)]
pub trait DeviceObserver {
    /// Packet handed down by the upper layer, link header already added.
    fn mac_tx(&mut self, device: DeviceId, packet: &Packet) {}

    /// Packet passed up to the upper layer (non-promiscuous).
    fn mac_rx(&mut self, device: DeviceId, packet: &Packet) {}

    fn phy_tx_begin(&mut self, device: DeviceId, packet: &Packet, meta: FrameMeta) {}

    fn phy_rx_begin(&mut self, device: DeviceId, packet: &Packet, meta: FrameMeta) {}

    fn phy_rx_end(&mut self, device: DeviceId, packet: &Packet, meta: FrameMeta) {}

    fn phy_rx_drop(&mut self, device: DeviceId, packet: &Packet, meta: FrameMeta) {}

    /// Time the packet spent in the transmit queue.
    fn queue_latency(&mut self, device: DeviceId, packet: &Packet, latency: SimTime) {}

    /// Complete frame, link header included, as a capture tool would see it.
    fn sniffer(&mut self, device: DeviceId, frame: &Packet) {}
}

/// `(device, packet, protocol, from)`
pub type ReceiveCallback = Box<dyn FnMut(DeviceId, &Packet, ProtocolNumber, Mac48Address)>;

/// `(device, packet, protocol, from, to, packet type)`
pub type PromiscReceiveCallback =
    Box<dyn FnMut(DeviceId, &Packet, ProtocolNumber, Mac48Address, Mac48Address, PacketType)>;
