//! Network interface attached to a simple wireless channel
//!
//! Transmission is a two-state machine: a device is READY until a frame
//! starts transmitting, BUSY until that frame's transmit time elapses, and
//! then pulls the next frame off its queue. At most one frame is in flight
//! per device.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use log::{debug, info, trace};
use simple_wireless_core::{
    ChannelId, DataRate, Destination, DeviceId, EthernetHeader, Mac48Address, NodeId, Packet,
    ProtocolNumber, SimTime, TaggedPacket,
};

use crate::channel::{SimpleWirelessChannel, Transmission};
use crate::config::DeviceConfig;
use crate::context::{Arrival, RadioContext, RadioEvent};
use crate::queue::{self, PacketQueue};
use crate::receive_error::{self, ReceiveErrorModel};
use crate::trace::{DeviceObserver, FrameMeta, PacketType, PromiscReceiveCallback, ReceiveCallback};
use crate::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Ready,
    Busy,
}

/// Number of devices contending with this one, itself included.
///
/// Zero until the channel first counts, which leaves transmit time
/// unscaled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NeighborCount(u32);

impl NeighborCount {
    /// Resets to one: a device always contends with itself.
    pub fn clear(&mut self) {
        self.0 = 1;
    }

    pub fn increment(&mut self) {
        self.0 += 1;
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// Frames that started transmitting.
    pub packets_sent: u64,
    /// Frames that arrived from the channel, dropped ones included.
    pub packets_received: u64,
    pub packets_dropped_rx: u64,
    /// Directional unicasts with no matching neighbour.
    pub packets_not_routed: u64,
    pub packets_dropped_queue: u64,
}

pub struct SimpleWirelessNetDevice {
    id: DeviceId,
    node: NodeId,
    if_index: u32,
    address: Mac48Address,
    channel: Option<ChannelId>,
    data_rate: DataRate,
    mtu: u16,
    state: TxState,
    in_flight: Option<Packet>,
    queue: Option<Box<dyn PacketQueue>>,
    receive_error: Option<Box<dyn ReceiveErrorModel>>,
    directional: bool,
    neighbors: BTreeMap<NodeId, Mac48Address>,
    neighbor_count: NeighborCount,
    pcap: bool,
    rx_callback: Option<ReceiveCallback>,
    promisc_callback: Option<PromiscReceiveCallback>,
    observers: Vec<Box<dyn DeviceObserver>>,
    stats: DeviceStats,
}

impl SimpleWirelessNetDevice {
    pub fn new(
        id: DeviceId,
        node: NodeId,
        address: Mac48Address,
        config: &DeviceConfig,
    ) -> Result<Self, RadioError> {
        let queue = config.queue.as_ref().map(queue::build).transpose()?;
        let receive_error = config
            .receive_error
            .as_ref()
            .map(receive_error::build)
            .transpose()?;
        Ok(Self {
            id,
            node,
            if_index: 0,
            address,
            channel: None,
            data_rate: config.data_rate,
            mtu: config.mtu,
            state: TxState::Ready,
            in_flight: None,
            queue,
            receive_error,
            directional: config.directional,
            neighbors: BTreeMap::new(),
            neighbor_count: NeighborCount::default(),
            pcap: config.pcap,
            rx_callback: None,
            promisc_callback: None,
            observers: Vec::new(),
            stats: DeviceStats::default(),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    pub fn set_if_index(&mut self, index: u32) {
        self.if_index = index;
    }

    pub fn address(&self) -> Mac48Address {
        self.address
    }

    pub fn set_address(&mut self, address: Mac48Address) {
        self.address = address;
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub(crate) fn set_channel(&mut self, channel: ChannelId) {
        self.channel = Some(channel);
    }

    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    pub fn set_data_rate(&mut self, rate: DataRate) {
        self.data_rate = rate;
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn set_mtu(&mut self, mtu: u16) -> bool {
        self.mtu = mtu;
        true
    }

    pub fn is_link_up(&self) -> bool {
        true
    }

    pub fn is_broadcast(&self) -> bool {
        true
    }

    pub fn broadcast(&self) -> Mac48Address {
        Mac48Address::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        false
    }

    pub fn multicast_ipv4(&self, group: Ipv4Addr) -> Mac48Address {
        Mac48Address::multicast_ipv4(group)
    }

    pub fn multicast_ipv6(&self, group: Ipv6Addr) -> Mac48Address {
        Mac48Address::multicast_ipv6(group)
    }

    pub fn is_point_to_point(&self) -> bool {
        false
    }

    pub fn is_bridge(&self) -> bool {
        false
    }

    pub fn needs_arp(&self) -> bool {
        true
    }

    pub fn supports_send_from(&self) -> bool {
        true
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// The frame currently being transmitted, header removed.
    pub fn in_flight(&self) -> Option<&Packet> {
        self.in_flight.as_ref()
    }

    pub fn queue(&self) -> Option<&dyn PacketQueue> {
        self.queue.as_deref()
    }

    pub fn set_queue(&mut self, queue: Option<Box<dyn PacketQueue>>) {
        self.queue = queue;
    }

    pub fn set_receive_error_model(&mut self, model: Option<Box<dyn ReceiveErrorModel>>) {
        self.receive_error = model;
    }

    pub fn set_receive_callback(&mut self, callback: ReceiveCallback) {
        self.rx_callback = Some(callback);
    }

    pub fn set_promisc_receive_callback(&mut self, callback: PromiscReceiveCallback) {
        self.promisc_callback = Some(callback);
    }

    pub fn add_observer(&mut self, observer: Box<dyn DeviceObserver>) {
        self.observers.push(observer);
    }

    /// Turns on the sniffer frames passed to [`DeviceObserver::sniffer`].
    pub fn enable_pcap(&mut self, enabled: bool) {
        self.pcap = enabled;
    }

    pub fn is_pcap_enabled(&self) -> bool {
        self.pcap
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    // Directional neighbours

    pub fn is_directional(&self) -> bool {
        self.directional
    }

    pub fn set_directional(&mut self, enabled: bool) {
        self.directional = enabled;
    }

    /// Registers `node` as reachable at `address`. Fails unless directional
    /// mode is on. An existing entry for the node is kept.
    pub fn add_directional_neighbor(&mut self, node: NodeId, address: Mac48Address) -> bool {
        if !self.directional {
            return false;
        }
        self.neighbors.entry(node).or_insert(address);
        info!(
            "Node {} added directional neighbor {} mac address {}",
            self.node, node, address
        );
        true
    }

    pub fn add_directional_neighbors(
        &mut self,
        neighbors: impl IntoIterator<Item = (NodeId, Mac48Address)>,
    ) -> bool {
        if !self.directional {
            return false;
        }
        for (node, address) in neighbors {
            self.add_directional_neighbor(node, address);
        }
        true
    }

    pub fn delete_directional_neighbor(&mut self, node: NodeId) {
        if let Some(address) = self.neighbors.remove(&node) {
            info!(
                "Node {} deleted directional neighbor {} mac address {}",
                self.node, node, address
            );
        }
    }

    pub fn delete_directional_neighbors(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            self.delete_directional_neighbor(node);
        }
    }

    pub fn directional_neighbors(&self) -> impl Iterator<Item = (NodeId, Mac48Address)> + '_ {
        self.neighbors.iter().map(|(n, a)| (*n, *a))
    }

    // Contention

    pub fn clear_neighbor_count(&mut self) {
        self.neighbor_count.clear();
    }

    pub fn increment_neighbor_count(&mut self) {
        self.neighbor_count.increment();
    }

    pub fn neighbor_count(&self) -> u32 {
        self.neighbor_count.get()
    }

    /// Transmit time of `bytes`, stretched when contention is engaged:
    /// doubled for a directional device, otherwise multiplied by the number
    /// of contending devices.
    pub fn scaled_tx_time(&self, bytes: usize) -> SimTime {
        let base = self.data_rate.tx_time(bytes);
        match self.neighbor_count.get() {
            0 => base,
            _ if self.directional => {
                let scaled = base * 2;
                debug!(
                    "Node {} tx time increased to {} for directional neighbors, {} bytes",
                    self.node, scaled, bytes
                );
                scaled
            }
            n => {
                let scaled = base * n;
                debug!(
                    "Node {} tx time increased to {} for {} neighbors, {} bytes",
                    self.node, scaled, n, bytes
                );
                scaled
            }
        }
    }

    // Transmit path

    pub fn send<C: RadioContext>(
        &mut self,
        packet: Packet,
        to: Mac48Address,
        protocol: ProtocolNumber,
        channel: &mut SimpleWirelessChannel,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        let from = self.address;
        self.send_from(packet, from, to, protocol, channel, ctx)
    }

    /// Frames `packet` and queues it for transmission. Under directional
    /// mode a broadcast is queued once per neighbour and a unicast only
    /// toward the neighbour owning `to`, if any.
    pub fn send_from<C: RadioContext>(
        &mut self,
        mut packet: Packet,
        from: Mac48Address,
        to: Mac48Address,
        protocol: ProtocolNumber,
        channel: &mut SimpleWirelessChannel,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        info!("Node {} sending packet {} to {}", self.node, packet.uid(), to);
        packet.add_header(&EthernetHeader::new(from, to, protocol));
        for observer in &mut self.observers {
            observer.mac_tx(self.id, &packet);
        }

        if !self.directional {
            return self.enqueue_packet(packet, from, to, protocol, Destination::All, channel, ctx);
        }

        if to.is_broadcast() {
            let targets: Vec<NodeId> = self.neighbors.keys().copied().collect();
            for target in targets {
                info!(
                    "Node {} queueing packet to directional neighbor {}",
                    self.node, target
                );
                self.enqueue_packet(
                    packet.deep_copy(),
                    from,
                    to,
                    protocol,
                    Destination::Node(target),
                    channel,
                    ctx,
                )?;
            }
            return Ok(());
        }

        let target = self
            .neighbors
            .iter()
            .find(|(_, address)| **address == to)
            .map(|(node, _)| *node);
        match target {
            Some(target) => {
                info!(
                    "Node {} found directional neighbor {} with address {}",
                    self.node, target, to
                );
                self.enqueue_packet(packet, from, to, protocol, Destination::Node(target), channel, ctx)
            }
            None => {
                debug!(
                    "Node {} has no directional neighbor with address {}, packet {} not sent",
                    self.node,
                    to,
                    packet.uid()
                );
                self.stats.packets_not_routed += 1;
                Ok(())
            }
        }
    }

    /// Queues a framed packet, starting it at once if the device is idle.
    /// Without a queue the frame goes straight to the channel, bypassing
    /// the state machine.
    #[allow(clippy::too_many_arguments)]
    fn enqueue_packet<C: RadioContext>(
        &mut self,
        mut packet: Packet,
        from: Mac48Address,
        to: Mac48Address,
        protocol: ProtocolNumber,
        destination: Destination,
        channel: &mut SimpleWirelessChannel,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        if let Some(queue) = self.queue.as_mut() {
            debug!(
                "Queueing packet for destination {:?}, protocol {}, state {:?}",
                destination, protocol, self.state
            );
            if !queue.enqueue(TaggedPacket::new(packet, ctx.now(), destination)) {
                self.stats.packets_dropped_queue += 1;
                return Ok(());
            }
            let next = match self.state {
                TxState::Ready => queue.dequeue(),
                TxState::Busy => None,
            };
            return match next {
                Some(next) => self.transmit_start(next, channel, ctx),
                None => Ok(()),
            };
        }

        if self.pcap {
            for observer in &mut self.observers {
                observer.sniffer(self.id, &packet);
            }
        }
        packet.remove_header()?;
        let meta = FrameMeta {
            from: self.address,
            to,
            protocol,
        };
        for observer in &mut self.observers {
            observer.phy_tx_begin(self.id, &packet, meta);
        }
        let tx_time = self.scaled_tx_time(packet.size());
        self.stats.packets_sent += 1;
        channel.send(
            Transmission {
                packet,
                protocol,
                to,
                from,
                sender: self.id,
                tx_time,
                destination,
            },
            &mut self.neighbor_count,
            ctx,
        )?;
        Ok(())
    }

    /// Puts `item` on the air and schedules its completion.
    ///
    /// # Panics
    ///
    /// If a transmission is already in progress.
    pub fn transmit_start<C: RadioContext>(
        &mut self,
        item: TaggedPacket,
        channel: &mut SimpleWirelessChannel,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        assert_eq!(self.state, TxState::Ready, "{} must be READY to transmit", self.id);
        self.state = TxState::Busy;
        trace!("{} READY -> BUSY", self.id);

        if self.pcap {
            for observer in &mut self.observers {
                observer.sniffer(self.id, &item.packet);
            }
        }

        let now = ctx.now();
        let (mut packet, enqueued_at, destination) = item.detach();
        let latency = now - enqueued_at.unwrap_or(now);
        debug!("{} dequeued packet with latency {}", now, latency);
        for observer in &mut self.observers {
            observer.queue_latency(self.id, &packet, latency);
        }

        let header = packet.remove_header()?;
        let meta = FrameMeta {
            from: header.source,
            to: header.destination,
            protocol: header.protocol,
        };
        let tx_time = self.scaled_tx_time(packet.size());
        self.in_flight = Some(packet.clone());

        debug!("Schedule transmit complete in {}", tx_time);
        ctx.schedule(tx_time, self.node, RadioEvent::TransmitComplete { device: self.id });
        for observer in &mut self.observers {
            observer.phy_tx_begin(self.id, &packet, meta);
        }
        self.stats.packets_sent += 1;

        channel.send(
            Transmission {
                packet,
                protocol: meta.protocol,
                to: meta.to,
                from: meta.from,
                sender: self.id,
                tx_time,
                destination,
            },
            &mut self.neighbor_count,
            ctx,
        )?;
        Ok(())
    }

    /// Ends the transmission in flight and starts the next queued frame.
    ///
    /// # Panics
    ///
    /// If no transmission is in progress.
    pub fn transmit_complete<C: RadioContext>(
        &mut self,
        channel: &mut SimpleWirelessChannel,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        assert_eq!(self.state, TxState::Busy, "{} must be BUSY if transmitting", self.id);
        self.state = TxState::Ready;
        trace!("{} BUSY -> READY", self.id);
        assert!(self.in_flight.take().is_some(), "{} completed with no frame in flight", self.id);

        let Some(queue) = self.queue.as_mut() else {
            return Ok(());
        };
        debug!(
            "{} tx complete, {} packets and {} bytes queued",
            ctx.now(),
            queue.n_packets(),
            queue.n_bytes()
        );
        match queue.dequeue() {
            Some(next) => self.transmit_start(next, channel, ctx),
            None => Ok(()),
        }
    }

    // Receive path

    /// Hands an arriving frame to the upper layer unless the receive error
    /// model corrupts it.
    pub fn receive(&mut self, arrival: Arrival) {
        let Arrival {
            packet,
            protocol,
            to,
            from,
        } = arrival;
        let meta = FrameMeta { from, to, protocol };
        for observer in &mut self.observers {
            observer.phy_rx_begin(self.id, &packet, meta);
        }
        self.stats.packets_received += 1;
        info!(
            "Node {} receiving packet {} from {} to {}",
            self.node,
            packet.uid(),
            from,
            to
        );

        if let Some(model) = self.receive_error.as_mut() {
            if model.is_corrupt(&packet) {
                for observer in &mut self.observers {
                    observer.phy_rx_drop(self.id, &packet, meta);
                }
                self.stats.packets_dropped_rx += 1;
                return;
            }
        }

        if self.pcap {
            let frame = EthernetHeader::new(from, to, protocol).frame(packet.data());
            for observer in &mut self.observers {
                observer.sniffer(self.id, &frame);
            }
        }

        let packet_type = PacketType::classify(to, self.address);
        for observer in &mut self.observers {
            observer.phy_rx_end(self.id, &packet, meta);
        }

        if packet_type != PacketType::OtherHost {
            for observer in &mut self.observers {
                observer.mac_rx(self.id, &packet);
            }
            if let Some(callback) = self.rx_callback.as_mut() {
                callback(self.id, &packet, protocol, from);
            }
        }

        if let Some(callback) = self.promisc_callback.as_mut() {
            callback(self.id, &packet, protocol, from, to, packet_type);
        }
        debug!(
            "Total received: {} total dropped: {}",
            self.stats.packets_received, self.stats.packets_dropped_rx
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::{ChannelConfig, QueueConfig, QueueLimit, ReceiveErrorConfig};
    use crate::test_support::RecordingContext;
    use simple_wireless_core::Vector3;

    const IPV4: ProtocolNumber = 0x0800;

    struct Rig {
        channel: SimpleWirelessChannel,
        ctx: RecordingContext,
    }

    /// A channel with nodes 0..n on the x axis, 10 units apart.
    fn rig(n: usize) -> Rig {
        let mut channel = SimpleWirelessChannel::new(ChannelId(0), &ChannelConfig::default()).unwrap();
        let mut ctx = RecordingContext::default();
        for i in 0..n {
            channel.attach(DeviceId(i), i as NodeId);
            ctx.place(i as NodeId, Vector3::new(i as f64 * 10.0, 0.0, 0.0));
        }
        Rig { channel, ctx }
    }

    fn device(config: DeviceConfig) -> SimpleWirelessNetDevice {
        let mut dev = SimpleWirelessNetDevice::new(DeviceId(0), 0, Mac48Address::from_index(1), &config).unwrap();
        dev.set_channel(ChannelId(0));
        dev
    }

    fn queued() -> DeviceConfig {
        DeviceConfig {
            queue: Some(QueueConfig::default()),
            ..Default::default()
        }
    }

    fn receivers(events: &[(SimTime, NodeId, RadioEvent)]) -> Vec<NodeId> {
        events
            .iter()
            .filter(|(_, _, e)| matches!(e, RadioEvent::Receive { .. }))
            .map(|(_, node, _)| *node)
            .collect()
    }

    fn completions(events: &[(SimTime, NodeId, RadioEvent)]) -> Vec<SimTime> {
        events
            .iter()
            .filter(|(_, _, e)| matches!(e, RadioEvent::TransmitComplete { .. }))
            .map(|(delay, _, _)| *delay)
            .collect()
    }

    #[derive(Default)]
    struct Log {
        latencies: Vec<SimTime>,
        sniffed: Vec<Packet>,
        tx_begin: Vec<FrameMeta>,
        rx_drops: usize,
        mac_tx: usize,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl DeviceObserver for Recorder {
        fn mac_tx(&mut self, _: DeviceId, _: &Packet) {
            self.0.borrow_mut().mac_tx += 1;
        }

        fn phy_tx_begin(&mut self, _: DeviceId, _: &Packet, meta: FrameMeta) {
            self.0.borrow_mut().tx_begin.push(meta);
        }

        fn phy_rx_drop(&mut self, _: DeviceId, _: &Packet, _: FrameMeta) {
            self.0.borrow_mut().rx_drops += 1;
        }

        fn queue_latency(&mut self, _: DeviceId, _: &Packet, latency: SimTime) {
            self.0.borrow_mut().latencies.push(latency);
        }

        fn sniffer(&mut self, _: DeviceId, frame: &Packet) {
            self.0.borrow_mut().sniffed.push(frame.clone());
        }
    }

    fn record(dev: &mut SimpleWirelessNetDevice) -> Rc<RefCell<Log>> {
        let log = Rc::new(RefCell::new(Log::default()));
        dev.add_observer(Box::new(Recorder(log.clone())));
        log
    }

    #[test]
    fn test_directional_broadcast_fans_out_to_neighbours() {
        let Rig { mut channel, mut ctx } = rig(5);
        let mut dev = device(DeviceConfig { directional: true, ..Default::default() });
        assert!(dev.add_directional_neighbors([
            (1, Mac48Address::from_index(2)),
            (2, Mac48Address::from_index(3)),
            (3, Mac48Address::from_index(4)),
        ]));

        dev.send(Packet::new(100), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
            .unwrap();
        let mut nodes = receivers(&ctx.scheduled);
        nodes.sort();
        // node 4 is in range but not a neighbour
        assert_eq!(nodes, vec![1, 2, 3]);
        assert_eq!(dev.stats().packets_sent, 3);
        assert_eq!(channel.stats().skipped_directional, 9);
    }

    #[test]
    fn test_directional_broadcast_queues_one_copy_per_neighbour() {
        let Rig { mut channel, mut ctx } = rig(4);
        let mut dev = device(DeviceConfig { directional: true, ..queued() });
        for node in 1..=3u32 {
            assert!(dev.add_directional_neighbor(node, Mac48Address::from_index(node as u64 + 1)));
        }

        let packet = Packet::new(100);
        let uid = packet.uid();
        dev.send(packet, Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx).unwrap();
        assert_eq!(dev.queue().unwrap().stats().enqueued, 3);
        // first copy is on the air, the other two wait
        assert_eq!(dev.queue().unwrap().n_packets(), 2);
        assert_eq!(dev.in_flight().unwrap().uid(), uid);

        let mut hints = Vec::new();
        while dev.state() == TxState::Busy {
            dev.transmit_complete(&mut channel, &mut ctx).unwrap();
        }
        for (_, node, event) in ctx.take() {
            if let RadioEvent::Receive { arrival, .. } = event {
                assert_eq!(arrival.to, Mac48Address::BROADCAST);
                hints.push(node);
            }
        }
        assert_eq!(hints, vec![1, 2, 3]);
    }

    #[test]
    fn test_directional_unicast() {
        let Rig { mut channel, mut ctx } = rig(3);
        let mut dev = device(DeviceConfig { directional: true, ..Default::default() });
        dev.add_directional_neighbor(1, Mac48Address::from_index(2));
        dev.add_directional_neighbor(2, Mac48Address::from_index(3));

        dev.send(Packet::new(10), Mac48Address::from_index(3), IPV4, &mut channel, &mut ctx)
            .unwrap();
        assert_eq!(receivers(&ctx.take()), vec![2]);

        dev.send(Packet::new(10), Mac48Address::from_index(9), IPV4, &mut channel, &mut ctx)
            .unwrap();
        assert!(ctx.scheduled.is_empty());
        assert_eq!(dev.stats().packets_not_routed, 1);
    }

    #[test]
    fn test_neighbour_registration_needs_directional_mode() {
        let mut dev = device(DeviceConfig::default());
        assert!(!dev.add_directional_neighbor(1, Mac48Address::from_index(2)));
        assert!(!dev.add_directional_neighbors([(1, Mac48Address::from_index(2))]));
        assert_eq!(dev.directional_neighbors().count(), 0);

        dev.set_directional(true);
        assert!(dev.add_directional_neighbor(1, Mac48Address::from_index(2)));
        assert!(dev.add_directional_neighbor(1, Mac48Address::from_index(7)));
        assert_eq!(
            dev.directional_neighbors().collect::<Vec<_>>(),
            vec![(1, Mac48Address::from_index(2))]
        );
        dev.delete_directional_neighbors([1, 5]);
        dev.delete_directional_neighbor(1);
        assert_eq!(dev.directional_neighbors().count(), 0);
    }

    #[test]
    fn test_contention_scales_tx_time() {
        let mut dev = device(DeviceConfig::default());
        let base = dev.data_rate().tx_time(1000);
        assert_eq!(dev.scaled_tx_time(1000), base);

        dev.clear_neighbor_count();
        dev.increment_neighbor_count();
        dev.increment_neighbor_count();
        assert_eq!(dev.neighbor_count(), 3);
        assert_eq!(dev.scaled_tx_time(1000), base * 3);

        dev.set_directional(true);
        assert_eq!(dev.scaled_tx_time(1000), base * 2);
        dev.increment_neighbor_count();
        assert_eq!(dev.scaled_tx_time(1000), base * 2);
    }

    #[test]
    fn test_first_contended_packet_goes_at_full_rate() {
        let Rig { mut channel, mut ctx } = rig(3);
        channel.set_fixed_contention(true);
        let mut dev = device(queued());

        dev.send(Packet::new(1000), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
            .unwrap();
        assert_eq!(dev.neighbor_count(), 3);
        ctx.take();
        dev.send(Packet::new(1000), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
            .unwrap();
        dev.transmit_complete(&mut channel, &mut ctx).unwrap();
        assert_eq!(
            completions(&ctx.take()),
            vec![SimTime::from_millis(24)]
        );
    }

    #[test]
    fn test_state_machine_serializes_transmissions() {
        let Rig { mut channel, mut ctx } = rig(2);
        let mut dev = device(queued());
        let log = record(&mut dev);

        for _ in 0..3 {
            dev.send(Packet::new(1000), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
                .unwrap();
        }
        assert_eq!(dev.state(), TxState::Busy);
        assert_eq!(dev.queue().unwrap().n_packets(), 2);
        assert_eq!(completions(&ctx.take()), vec![SimTime::from_millis(8)]);

        ctx.now = SimTime::from_millis(8);
        dev.transmit_complete(&mut channel, &mut ctx).unwrap();
        assert_eq!(dev.state(), TxState::Busy);
        assert_eq!(completions(&ctx.take()).len(), 1);

        ctx.now = SimTime::from_millis(16);
        dev.transmit_complete(&mut channel, &mut ctx).unwrap();
        ctx.now = SimTime::from_millis(24);
        dev.transmit_complete(&mut channel, &mut ctx).unwrap();
        assert_eq!(dev.state(), TxState::Ready);
        assert!(dev.in_flight().is_none());
        assert!(dev.queue().unwrap().is_empty());

        let log = log.borrow();
        assert_eq!(log.mac_tx, 3);
        assert_eq!(
            log.latencies,
            vec![SimTime::ZERO, SimTime::from_millis(8), SimTime::from_millis(16)]
        );
        assert_eq!(dev.stats().packets_sent, 3);
    }

    #[test]
    #[should_panic(expected = "must be BUSY")]
    fn test_complete_while_ready_panics() {
        let Rig { mut channel, mut ctx } = rig(1);
        let mut dev = device(queued());
        dev.transmit_complete(&mut channel, &mut ctx).unwrap();
    }

    #[test]
    #[should_panic(expected = "must be READY")]
    fn test_start_while_busy_panics() {
        let Rig { mut channel, mut ctx } = rig(2);
        let mut dev = device(queued());
        let mut frame = Packet::new(10);
        frame.add_header(&EthernetHeader::new(dev.address(), Mac48Address::BROADCAST, IPV4));
        let item = TaggedPacket::new(frame, SimTime::ZERO, Destination::All);
        dev.transmit_start(item.clone(), &mut channel, &mut ctx).unwrap();
        dev.transmit_start(item, &mut channel, &mut ctx).unwrap();
    }

    #[test]
    fn test_queue_overflow_is_silent() {
        let Rig { mut channel, mut ctx } = rig(2);
        let mut dev = device(DeviceConfig {
            queue: Some(QueueConfig::DropTail { limit: QueueLimit::Packets(1) }),
            ..Default::default()
        });
        for _ in 0..4 {
            dev.send(Packet::new(10), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
                .unwrap();
        }
        // one on the air, one queued, two dropped
        assert_eq!(dev.queue().unwrap().n_packets(), 1);
        assert_eq!(dev.stats().packets_dropped_queue, 2);
    }

    #[test]
    fn test_no_queue_path_bypasses_state_machine() {
        let Rig { mut channel, mut ctx } = rig(2);
        let mut dev = device(DeviceConfig { pcap: true, ..Default::default() });
        let log = record(&mut dev);
        dev.send(Packet::new(10), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
            .unwrap();
        dev.send(Packet::new(10), Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
            .unwrap();
        assert_eq!(dev.state(), TxState::Ready);
        let events = ctx.take();
        assert!(completions(&events).is_empty());
        assert_eq!(receivers(&events), vec![1, 1]);

        let log = log.borrow();
        assert_eq!(log.sniffed.len(), 2);
        assert_eq!(log.sniffed[0].size(), 10 + EthernetHeader::SIZE);
        assert_eq!(log.tx_begin[0].from, dev.address());
    }

    #[test]
    fn test_send_from_keeps_given_source() {
        let Rig { mut channel, mut ctx } = rig(2);
        let mut dev = device(queued());
        let spoofed = Mac48Address::from_index(42);
        dev.send_from(Packet::new(10), spoofed, Mac48Address::BROADCAST, IPV4, &mut channel, &mut ctx)
            .unwrap();
        let arrival = ctx
            .take()
            .into_iter()
            .find_map(|(_, _, e)| match e {
                RadioEvent::Receive { arrival, .. } => Some(arrival),
                _ => None,
            })
            .unwrap();
        assert_eq!(arrival.from, spoofed);
        assert_eq!(arrival.protocol, IPV4);
        assert_eq!(arrival.packet.size(), 10);
    }

    type Delivered = Rc<RefCell<Vec<(Mac48Address, Option<PacketType>)>>>;

    fn listening_device() -> (SimpleWirelessNetDevice, Delivered, Delivered) {
        let mut dev = device(DeviceConfig::default());
        let up: Delivered = Rc::default();
        let promisc: Delivered = Rc::default();
        let sink = up.clone();
        dev.set_receive_callback(Box::new(move |_, _: &Packet, _, from| sink.borrow_mut().push((from, None))));
        let sink = promisc.clone();
        dev.set_promisc_receive_callback(Box::new(move |_, _: &Packet, _, _, to, kind| {
            sink.borrow_mut().push((to, Some(kind)))
        }));
        (dev, up, promisc)
    }

    fn arrival(to: Mac48Address) -> Arrival {
        Arrival {
            packet: Packet::new(20),
            protocol: IPV4,
            to,
            from: Mac48Address::from_index(9),
        }
    }

    #[test]
    fn test_receive_classification() {
        let (mut dev, up, promisc) = listening_device();
        let own = dev.address();
        let group = dev.multicast_ipv4("224.0.0.251".parse().unwrap());
        for to in [own, Mac48Address::BROADCAST, group, Mac48Address::from_index(77)] {
            dev.receive(arrival(to));
        }
        assert_eq!(up.borrow().len(), 3);
        let kinds: Vec<_> = promisc.borrow().iter().map(|(_, k)| k.unwrap()).collect();
        assert_eq!(
            kinds,
            vec![
                PacketType::Host,
                PacketType::Broadcast,
                PacketType::Multicast,
                PacketType::OtherHost
            ]
        );
        assert_eq!(dev.stats().packets_received, 4);
    }

    #[test]
    fn test_receive_error_model_drops() {
        let (mut dev, up, promisc) = listening_device();
        let log = record(&mut dev);
        let bad = arrival(Mac48Address::BROADCAST);
        dev.set_receive_error_model(Some(receive_error::build(&ReceiveErrorConfig::List {
            uids: vec![bad.packet.uid()],
        })
        .unwrap()));
        dev.receive(bad);
        dev.receive(arrival(Mac48Address::BROADCAST));
        assert_eq!(up.borrow().len(), 1);
        assert_eq!(promisc.borrow().len(), 1);
        assert_eq!(log.borrow().rx_drops, 1);
        assert_eq!(dev.stats().packets_dropped_rx, 1);
        assert_eq!(dev.stats().packets_received, 2);
    }

    #[test]
    fn test_receive_sniffer_rebuilds_header() {
        let mut dev = device(DeviceConfig { pcap: true, ..Default::default() });
        let log = record(&mut dev);
        let incoming = arrival(Mac48Address::BROADCAST);
        dev.receive(incoming.clone());
        let frame = log.borrow().sniffed[0].clone();
        let header = frame.peek_header().unwrap();
        assert_eq!(header.destination, Mac48Address::BROADCAST);
        assert_eq!(header.source, incoming.from);
        assert_eq!(header.protocol, IPV4);
        assert_eq!(&frame.data()[EthernetHeader::SIZE..], incoming.packet.data());
    }

    #[test]
    fn test_device_surface() {
        let mut dev = device(DeviceConfig::default());
        assert_eq!(dev.mtu(), 0xffff);
        assert!(dev.set_mtu(1500));
        assert_eq!(dev.mtu(), 1500);
        assert!(dev.is_broadcast() && dev.is_link_up() && dev.needs_arp() && dev.supports_send_from());
        assert!(!dev.is_point_to_point() && !dev.is_bridge() && !dev.is_multicast());
        assert_eq!(dev.broadcast(), Mac48Address::BROADCAST);
        assert_eq!(
            dev.multicast_ipv4("239.255.0.1".parse().unwrap()).to_string(),
            "01:00:5e:7f:00:01"
        );
    }
}
