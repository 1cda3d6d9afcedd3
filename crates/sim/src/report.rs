//! Per-device trace collection and scenario results

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use simple_wireless_core::{DeviceId, Packet, SimTime};
use simple_wireless_radio::{ChannelStats, DeviceObserver, FrameMeta};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceTrace {
    pub mac_tx: u64,
    pub mac_rx: u64,
    pub phy_tx_begin: u64,
    pub phy_rx_begin: u64,
    pub phy_rx_end: u64,
    pub phy_rx_drop: u64,
    pub latency_samples: u64,
    pub latency_total: SimTime,
    pub latency_max: SimTime,
}

impl DeviceTrace {
    pub fn mean_latency(&self) -> SimTime {
        match self.latency_samples {
            0 => SimTime::ZERO,
            n => SimTime::from_nanos(self.latency_total.as_nanos() / n),
        }
    }
}

/// Observer counting every hook per device. Clones share one table.
#[derive(Debug, Default, Clone)]
pub struct TraceCollector {
    traces: Rc<RefCell<BTreeMap<DeviceId, DeviceTrace>>>,
}

impl TraceCollector {
    pub fn get(&self, device: DeviceId) -> DeviceTrace {
        self.traces.borrow().get(&device).cloned().unwrap_or_default()
    }

    fn with(&self, device: DeviceId, f: impl FnOnce(&mut DeviceTrace)) {
        f(self.traces.borrow_mut().entry(device).or_default());
    }
}

impl DeviceObserver for TraceCollector {
    fn mac_tx(&mut self, device: DeviceId, _: &Packet) {
        self.with(device, |t| t.mac_tx += 1);
    }

    fn mac_rx(&mut self, device: DeviceId, _: &Packet) {
        self.with(device, |t| t.mac_rx += 1);
    }

    fn phy_tx_begin(&mut self, device: DeviceId, _: &Packet, _: FrameMeta) {
        self.with(device, |t| t.phy_tx_begin += 1);
    }

    fn phy_rx_begin(&mut self, device: DeviceId, _: &Packet, _: FrameMeta) {
        self.with(device, |t| t.phy_rx_begin += 1);
    }

    fn phy_rx_end(&mut self, device: DeviceId, _: &Packet, _: FrameMeta) {
        self.with(device, |t| t.phy_rx_end += 1);
    }

    fn phy_rx_drop(&mut self, device: DeviceId, _: &Packet, _: FrameMeta) {
        self.with(device, |t| t.phy_rx_drop += 1);
    }

    fn queue_latency(&mut self, device: DeviceId, _: &Packet, latency: SimTime) {
        self.with(device, |t| {
            t.latency_samples += 1;
            t.latency_total += latency;
            t.latency_max = t.latency_max.max(latency);
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: u32,
    pub address: String,
    /// Packets handed to the device by traffic sources.
    pub offered: u64,
    pub transmitted: u64,
    pub received: u64,
    pub rx_dropped: u64,
    pub queue_dropped: u64,
    pub not_routed: u64,
    pub mean_queue_latency_us: f64,
    pub max_queue_latency_us: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub transmissions: u64,
    pub deliveries_scheduled: u64,
    pub skipped_directional: u64,
    pub skipped_link_down: u64,
    pub skipped_out_of_range: u64,
    pub skipped_in_error: u64,
}

impl From<ChannelStats> for ChannelReport {
    fn from(s: ChannelStats) -> Self {
        Self {
            transmissions: s.transmissions,
            deliveries_scheduled: s.deliveries_scheduled,
            skipped_directional: s.skipped_directional,
            skipped_link_down: s.skipped_link_down,
            skipped_out_of_range: s.skipped_out_of_range,
            skipped_in_error: s.skipped_in_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub end_time_secs: f64,
    pub events: u64,
    pub channel: ChannelReport,
    pub nodes: Vec<NodeReport>,
    pub pcap_files: Vec<String>,
}

impl ScenarioReport {
    pub fn node(&self, node: u32) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node == node)
    }

    pub fn total_received(&self) -> u64 {
        self.nodes.iter().map(|n| n.received).sum()
    }

    /// Bits delivered to upper layers per simulated second.
    pub fn goodput_bps(&self, packet_size: usize) -> f64 {
        if self.end_time_secs <= 0.0 {
            return 0.0;
        }
        (self.total_received() * packet_size as u64 * 8) as f64 / self.end_time_secs
    }
}
