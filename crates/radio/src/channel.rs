//! Broadcast wireless channel with distance, error-model and contention logic

use log::{debug, error, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use simple_wireless_core::{
    ChannelId, Destination, DeviceId, Mac48Address, NodeId, Packet, ProtocolNumber, SimTime,
    PROPAGATION_NS_PER_UNIT,
};

use crate::config::{ChannelConfig, ErrorModelConfig};
use crate::context::{Arrival, RadioContext, RadioEvent};
use crate::device::NeighborCount;
use crate::error_model::{ConstantErrorModel, ErrorModelKind, PerCurve, RangeErrorModel};
use crate::stochastic::StochasticLinks;
use crate::RadioError;

/// One interface attached to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub device: DeviceId,
    pub node: NodeId,
}

/// A frame handed to the channel by a transmitting device.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub packet: Packet,
    pub protocol: ProtocolNumber,
    pub to: Mac48Address,
    pub from: Mac48Address,
    pub sender: DeviceId,
    pub tx_time: SimTime,
    pub destination: Destination,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub transmissions: u64,
    pub deliveries_scheduled: u64,
    pub skipped_directional: u64,
    pub skipped_link_down: u64,
    pub skipped_out_of_range: u64,
    pub skipped_in_error: u64,
}

enum LinkModel {
    Range(Box<dyn RangeErrorModel>),
    Stochastic(StochasticLinks),
}

pub struct SimpleWirelessChannel {
    id: ChannelId,
    attachments: Vec<Attachment>,
    max_range: f64,
    model: LinkModel,
    fixed_contention: bool,
    contention_range: f64,
    rng: StdRng,
    stats: ChannelStats,
}

impl SimpleWirelessChannel {
    pub fn new(id: ChannelId, config: &ChannelConfig) -> Result<Self, RadioError> {
        let model = match &config.error_model {
            ErrorModelConfig::Constant { rate } => {
                LinkModel::Range(Box::new(ConstantErrorModel::new(*rate)?))
            }
            ErrorModelConfig::PerCurve { points } => {
                LinkModel::Range(Box::new(PerCurve::new(points.iter().copied())?))
            }
            ErrorModelConfig::Stochastic { mean_up, mean_down } => {
                LinkModel::Stochastic(StochasticLinks::new(*mean_up, *mean_down)?)
            }
        };
        let max_range = match &model {
            LinkModel::Range(m) => m.max_range().unwrap_or(config.max_range),
            LinkModel::Stochastic(_) => config.max_range,
        };
        if !(max_range >= 0.0) {
            return Err(RadioError::InvalidConfig(format!("invalid max range {max_range}")));
        }

        info!(
            "{} created: range {}, error model {:?}, contention {}",
            id,
            max_range,
            config.error_model,
            config.fixed_contention
        );

        Ok(Self {
            id,
            attachments: Vec::new(),
            max_range,
            model,
            fixed_contention: config.fixed_contention,
            contention_range: config.fixed_contention_range,
            rng: StdRng::seed_from_u64(config.seed),
            stats: ChannelStats::default(),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn attach(&mut self, device: DeviceId, node: NodeId) {
        debug!("{} attaching {} of node {}", self.id, device, node);
        self.attachments.push(Attachment { device, node });
    }

    pub fn n_devices(&self) -> usize {
        self.attachments.len()
    }

    pub fn device(&self, index: usize) -> Option<DeviceId> {
        self.attachments.get(index).map(|a| a.device)
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }

    pub fn error_model_kind(&self) -> ErrorModelKind {
        match &self.model {
            LinkModel::Range(m) => m.kind(),
            LinkModel::Stochastic(_) => ErrorModelKind::Stochastic,
        }
    }

    pub fn is_fixed_contention_enabled(&self) -> bool {
        self.fixed_contention
    }

    pub fn contention_range(&self) -> f64 {
        self.contention_range
    }

    pub fn set_fixed_contention(&mut self, enabled: bool) {
        self.fixed_contention = enabled;
    }

    pub fn set_fixed_contention_range(&mut self, range: f64) {
        self.contention_range = range;
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn stochastic_links(&self) -> Option<&StochasticLinks> {
        match &self.model {
            LinkModel::Stochastic(links) => Some(links),
            LinkModel::Range(_) => None,
        }
    }

    /// Builds the link table for every ordered pair of attached nodes.
    /// Call once every device is attached; no-op for other models.
    pub fn init_stochastic_model(&mut self, now: SimTime) {
        let LinkModel::Stochastic(links) = &mut self.model else {
            return;
        };
        if self.attachments.is_empty() {
            error!(
                "{}: stochastic model initialised with no devices attached; attach devices first",
                self.id
            );
        }
        let nodes: Vec<NodeId> = self.attachments.iter().map(|a| a.node).collect();
        links.initialize(&nodes, now, &mut self.rng);
    }

    /// True when the stochastic link `src -> dst` is currently down and the
    /// packet must not be sent. Always false for other models.
    pub fn check_stochastic_error(
        &mut self,
        src: NodeId,
        dst: NodeId,
        now: SimTime,
    ) -> Result<bool, RadioError> {
        match &mut self.model {
            LinkModel::Stochastic(links) => Ok(!links.is_up(src, dst, now, &mut self.rng)?),
            LinkModel::Range(_) => Ok(false),
        }
    }

    /// Draws the per-packet verdict of the range error model. Always false
    /// for the stochastic model.
    pub fn packet_in_error(&mut self, distance: f64) -> bool {
        match &self.model {
            LinkModel::Range(model) => {
                let in_error = model.packet_in_error(distance, &mut self.rng);
                if in_error {
                    trace!(
                        "{} error model {:?}: packet in error at distance {} (rate {})",
                        self.id,
                        model.kind(),
                        distance,
                        model.error_rate(distance)
                    );
                }
                in_error
            }
            LinkModel::Stochastic(_) => false,
        }
    }

    /// Fans `tx` out to every other attached device that survives the
    /// directional, link-state, range and error checks, scheduling one
    /// arrival per survivor. Returns the number of arrivals scheduled.
    ///
    /// With fixed contention on, `contention` (the sender's neighbour count)
    /// is reset and re-counted from the devices within contention range.
    pub fn send<C: RadioContext>(
        &mut self,
        tx: Transmission,
        contention: &mut NeighborCount,
        ctx: &mut C,
    ) -> Result<usize, RadioError> {
        let sender_node = self
            .attachments
            .iter()
            .find(|a| a.device == tx.sender)
            .map(|a| a.node)
            .ok_or(RadioError::NotAttached {
                device: tx.sender,
                channel: self.id,
            })?;
        self.stats.transmissions += 1;

        if self.fixed_contention {
            contention.clear();
            if self.contention_range == 0.0 {
                self.contention_range = self.max_range;
            }
        }

        let now = ctx.now();
        let mut scheduled = 0;
        for i in 0..self.attachments.len() {
            let Attachment { device, node } = self.attachments[i];
            if device == tx.sender {
                continue;
            }

            if !tx.destination.admits(node) {
                trace!(
                    "Node {} NOT sending to node {}: directional destination is {:?}",
                    sender_node,
                    node,
                    tx.destination
                );
                self.stats.skipped_directional += 1;
                continue;
            }

            if self.check_stochastic_error(sender_node, node, now)? {
                debug!(
                    "Node {} NOT sending to node {}: stochastic link is down",
                    sender_node, node
                );
                self.stats.skipped_link_down += 1;
                continue;
            }

            let from = ctx
                .position_of(sender_node)
                .ok_or(RadioError::MissingPosition(sender_node))?;
            let to = ctx
                .position_of(node)
                .ok_or(RadioError::MissingPosition(node))?;
            let distance = from.distance_to(&to);

            // contention counts every node within contention range, even
            // ones the checks below go on to suppress
            if self.fixed_contention && distance < self.contention_range {
                contention.increment();
                trace!(
                    "Node {} counting node {} for contention at distance {}, count now {}",
                    sender_node,
                    node,
                    distance,
                    contention.get()
                );
            }

            if distance > self.max_range {
                debug!(
                    "Node {} NOT sending to node {}: distance {} is out of range",
                    sender_node, node, distance
                );
                self.stats.skipped_out_of_range += 1;
                continue;
            }

            if self.packet_in_error(distance) {
                debug!(
                    "Node {} NOT sending to node {}: packet in error at distance {}",
                    sender_node, node, distance
                );
                self.stats.skipped_in_error += 1;
                continue;
            }

            let propagation = SimTime::from_nanos_f64(PROPAGATION_NS_PER_UNIT * distance);
            debug!(
                "Node {} sending to node {} at distance {}; now {} tx {} propagation {}",
                sender_node, node, distance, now, tx.tx_time, propagation
            );
            ctx.schedule(
                tx.tx_time + propagation,
                node,
                RadioEvent::Receive {
                    device,
                    arrival: Arrival {
                        packet: tx.packet.deep_copy(),
                        protocol: tx.protocol,
                        to: tx.to,
                        from: tx.from,
                    },
                },
            );
            scheduled += 1;
        }

        self.stats.deliveries_scheduled += scheduled as u64;
        Ok(scheduled)
    }
}
