//! Data-driven scenarios: layout, configuration and traffic in, report out

use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use simple_wireless_core::{DataRate, DeviceId, Mac48Address, NodeId, SimTime, Vector3};
use simple_wireless_radio::{ChannelConfig, DeviceConfig, RadioError};
use thiserror::Error;

use crate::capture::{PcapObserver, PcapWriter};
use crate::report::{NodeReport, ScenarioReport, TraceCollector};
use crate::simulator::Simulator;
use crate::traffic::{ConstantRateSource, Payload};

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error("capture file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub duration_secs: f64,
    pub channel: ChannelConfig,
    /// Used by every node without its own device configuration.
    pub device: DeviceConfig,
    /// Node ids are positions in this list.
    pub nodes: Vec<NodeSpec>,
    pub traffic: Vec<TrafficSpec>,
    /// Writes `<prefix>-<node>-<device>.pcap` per device when set.
    pub pcap_prefix: Option<String>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "scenario".into(),
            duration_secs: 10.0,
            channel: ChannelConfig::default(),
            device: DeviceConfig::default(),
            nodes: Vec::new(),
            traffic: Vec::new(),
            pcap_prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub position: Vector3,
    /// A non-empty list puts the node's device in directional mode.
    #[serde(default)]
    pub directional_neighbors: Vec<NodeId>,
    #[serde(default)]
    pub device: Option<DeviceConfig>,
}

impl NodeSpec {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Vector3::new(x, y, 0.0),
            directional_neighbors: Vec::new(),
            device: None,
        }
    }

    pub fn with_neighbors(mut self, neighbors: impl IntoIterator<Item = NodeId>) -> Self {
        self.directional_neighbors = neighbors.into_iter().collect();
        self
    }

    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = Some(device);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSpec {
    pub node: NodeId,
    /// Unicast target; broadcast when absent.
    #[serde(default)]
    pub to: Option<NodeId>,
    pub packet_size: usize,
    pub rate: DataRate,
    #[serde(default)]
    pub start_secs: f64,
    #[serde(default)]
    pub stop_secs: Option<f64>,
    #[serde(default)]
    pub max_packets: Option<u64>,
    #[serde(default = "raw_payload")]
    pub payload: Payload,
}

fn raw_payload() -> Payload {
    Payload::Raw
}

impl TrafficSpec {
    pub fn broadcast(node: NodeId, packet_size: usize, rate: DataRate) -> Self {
        Self {
            node,
            to: None,
            packet_size,
            rate,
            start_secs: 0.0,
            stop_secs: None,
            max_packets: None,
            payload: Payload::Raw,
        }
    }
}

impl Scenario {
    pub fn validate(&self) -> Result<(), SimError> {
        let n = self.nodes.len() as u64;
        if self.duration_secs <= 0.0 {
            return Err(SimError::InvalidScenario("duration must be positive".into()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(bad) = node.directional_neighbors.iter().find(|&&nb| nb as u64 >= n) {
                return Err(SimError::InvalidScenario(format!(
                    "node {i} lists unknown directional neighbor {bad}"
                )));
            }
        }
        for flow in &self.traffic {
            if flow.node as u64 >= n || flow.to.is_some_and(|to| to as u64 >= n) {
                return Err(SimError::InvalidScenario(format!(
                    "traffic from node {} references an unknown node",
                    flow.node
                )));
            }
        }
        Ok(())
    }
}

/// Builds the network a scenario describes, runs it for its duration and
/// summarises what every node saw.
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, SimError> {
    scenario.validate()?;
    info!("Running scenario {:?}", scenario.name);

    let mut sim = Simulator::new();
    let channel = sim.network.add_channel(&scenario.channel)?;
    let collector = TraceCollector::default();
    let mut captures = Vec::new();
    let mut pcap_files = Vec::new();

    let mut devices: Vec<DeviceId> = Vec::with_capacity(scenario.nodes.len());
    for (i, layout) in scenario.nodes.iter().enumerate() {
        let node = i as NodeId;
        sim.set_position(node, layout.position);
        let mut config = layout.device.clone().unwrap_or_else(|| scenario.device.clone());
        if !layout.directional_neighbors.is_empty() {
            config.directional = true;
        }
        let id = sim.network.add_device(node, channel, &config)?;
        let clock = sim.clock();
        let device = sim
            .network
            .device_mut(id)
            .ok_or(RadioError::UnknownDevice(id))?;
        device.add_observer(Box::new(collector.clone()));

        if let Some(prefix) = &scenario.pcap_prefix {
            let path = PathBuf::from(format!("{prefix}-{node}-{}.pcap", id.0));
            let writer = Rc::new(RefCell::new(PcapWriter::create(&path)?));
            device.enable_pcap(true);
            device.add_observer(Box::new(PcapObserver::new(writer.clone(), clock)));
            captures.push(writer);
            pcap_files.push(path.display().to_string());
        }
        devices.push(id);
    }

    for (i, layout) in scenario.nodes.iter().enumerate() {
        let neighbors: Vec<(NodeId, Mac48Address)> = layout
            .directional_neighbors
            .iter()
            .filter_map(|&nb| {
                let address = sim.network.device(devices[nb as usize])?.address();
                Some((nb, address))
            })
            .collect();
        if neighbors.is_empty() {
            continue;
        }
        let device = sim
            .network
            .device_mut(devices[i])
            .ok_or(RadioError::UnknownDevice(devices[i]))?;
        if !device.add_directional_neighbors(neighbors) {
            warn!("Node {} rejected its directional neighbors", i);
        }
    }

    if scenario.channel.fixed_contention {
        sim.network
            .enable_fixed_contention(channel, scenario.channel.fixed_contention_range)?;
    }
    sim.network.init_stochastic_model(SimTime::ZERO);

    let mut offered_by = vec![Vec::new(); devices.len()];
    for flow in &scenario.traffic {
        let device = devices[flow.node as usize];
        let to = match flow.to {
            Some(target) => sim
                .network
                .device(devices[target as usize])
                .map(|d| d.address())
                .ok_or(RadioError::UnknownDevice(devices[target as usize]))?,
            None => Mac48Address::BROADCAST,
        };
        let stop = flow
            .stop_secs
            .map(SimTime::from_secs_f64)
            .unwrap_or(SimTime::MAX);
        let mut source = ConstantRateSource::new(device, flow.node, to, flow.packet_size, flow.rate)
            .with_window(SimTime::from_secs_f64(flow.start_secs), stop)
            .with_payload(flow.payload);
        if let Some(max) = flow.max_packets {
            source = source.with_max_packets(max);
        }
        let index = sim.add_source(source);
        offered_by[flow.node as usize].push(index);
    }

    let end = SimTime::from_secs_f64(scenario.duration_secs);
    sim.run_until(end)?;

    for writer in &captures {
        writer.borrow_mut().flush()?;
    }

    let nodes = devices
        .iter()
        .enumerate()
        .filter_map(|(i, &id)| {
            let device = sim.network.device(id)?;
            let stats = device.stats();
            let trace = collector.get(id);
            Some(NodeReport {
                node: i as u32,
                address: device.address().to_string(),
                offered: offered_by[i].iter().map(|&s| sim.sources()[s].sent()).sum(),
                transmitted: stats.packets_sent,
                received: trace.mac_rx,
                rx_dropped: stats.packets_dropped_rx,
                queue_dropped: device.queue().map(|q| q.stats().dropped_packets).unwrap_or(0),
                not_routed: stats.packets_not_routed,
                mean_queue_latency_us: trace.mean_latency().as_micros_f64(),
                max_queue_latency_us: trace.latency_max.as_micros_f64(),
            })
        })
        .collect();

    let channel_stats = sim
        .network
        .channel(channel)
        .map(|c| c.stats().into())
        .unwrap_or_default();

    Ok(ScenarioReport {
        name: scenario.name.clone(),
        end_time_secs: sim.now().as_secs_f64(),
        events: sim.events_run(),
        channel: channel_stats,
        nodes,
        pcap_files,
    })
}
