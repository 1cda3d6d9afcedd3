//! Receive-side corruption models applied by a device to arriving frames

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use simple_wireless_core::{Packet, PacketUid};

use crate::config::ReceiveErrorConfig;
use crate::RadioError;

pub trait ReceiveErrorModel {
    fn is_corrupt(&mut self, packet: &Packet) -> bool;
}

/// Granularity at which [`RateErrorModel`] applies its rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorUnit {
    Packet,
    Byte,
    Bit,
}

/// Corrupts each unit independently with probability `rate`.
#[derive(Debug, Clone)]
pub struct RateErrorModel {
    rate: f64,
    unit: ErrorUnit,
    rng: StdRng,
}

impl RateErrorModel {
    pub fn new(rate: f64, unit: ErrorUnit, seed: u64) -> Result<Self, RadioError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(RadioError::InvalidConfig(format!(
                "receive error rate {rate} outside [0, 1]"
            )));
        }
        Ok(Self {
            rate,
            unit,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn unit(&self) -> ErrorUnit {
        self.unit
    }

    /// Probability that at least one unit of `packet` is hit.
    pub fn packet_error_rate(&self, packet: &Packet) -> f64 {
        let units = match self.unit {
            ErrorUnit::Packet => return self.rate,
            ErrorUnit::Byte => packet.size() as f64,
            ErrorUnit::Bit => packet.size() as f64 * 8.0,
        };
        1.0 - (1.0 - self.rate).powf(units)
    }
}

impl ReceiveErrorModel for RateErrorModel {
    fn is_corrupt(&mut self, packet: &Packet) -> bool {
        let per = self.packet_error_rate(packet);
        self.rng.random::<f64>() < per
    }
}

/// Corrupts exactly the packets whose uid is listed.
#[derive(Debug, Clone, Default)]
pub struct ListErrorModel {
    uids: BTreeSet<PacketUid>,
}

impl ListErrorModel {
    pub fn new(uids: impl IntoIterator<Item = PacketUid>) -> Self {
        Self {
            uids: uids.into_iter().collect(),
        }
    }

    pub fn uids(&self) -> impl Iterator<Item = PacketUid> + '_ {
        self.uids.iter().copied()
    }
}

impl ReceiveErrorModel for ListErrorModel {
    fn is_corrupt(&mut self, packet: &Packet) -> bool {
        self.uids.contains(&packet.uid())
    }
}

pub fn build(config: &ReceiveErrorConfig) -> Result<Box<dyn ReceiveErrorModel>, RadioError> {
    Ok(match config {
        ReceiveErrorConfig::Rate { rate, unit, seed } => {
            Box::new(RateErrorModel::new(*rate, *unit, *seed)?)
        }
        ReceiveErrorConfig::List { uids } => Box::new(ListErrorModel::new(uids.iter().copied())),
    })
}
