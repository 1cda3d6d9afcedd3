//! shared lossy wireless link for discrete-event network simulation

use simple_wireless_core::{ChannelId, DeviceId, NodeId, PacketError};
use thiserror::Error;

pub mod channel;
pub mod config;
pub mod context;
pub mod device;
pub mod error_model;
pub mod filter;
pub mod network;
pub mod queue;
pub mod receive_error;
pub mod stochastic;
pub mod trace;

#[cfg(test)]
mod test_support;

pub use channel::{Attachment, ChannelStats, SimpleWirelessChannel, Transmission};
pub use config::{
    ChannelConfig, DeviceConfig, ErrorModelConfig, QueueConfig, QueueLimit, ReceiveErrorConfig,
};
pub use context::{Arrival, PositionProvider, RadioContext, RadioEvent, Scheduler};
pub use device::{DeviceStats, NeighborCount, SimpleWirelessNetDevice, TxState};
pub use error_model::{ConstantErrorModel, ErrorModelKind, PerCurve, RangeErrorModel};
pub use filter::{CaptureFilter, FilterError};
pub use network::WirelessNetwork;
pub use queue::{DropHeadQueue, DropTailQueue, PacketClass, PacketQueue, PriorityQueue, QueueStats};
pub use receive_error::{ErrorUnit, ListErrorModel, RateErrorModel, ReceiveErrorModel};
pub use stochastic::{StochasticLink, StochasticLinks};
pub use trace::{DeviceObserver, FrameMeta, PacketType, PromiscReceiveCallback, ReceiveCallback};

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("node {0} has no position")]
    MissingPosition(NodeId),

    #[error("stochastic link {src} -> {dst} was never initialised")]
    UnknownStochasticLink { src: NodeId, dst: NodeId },

    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("device {device} is not attached to {channel}")]
    NotAttached { device: DeviceId, channel: ChannelId },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid control packet classifier: {0}")]
    Filter(#[from] FilterError),

    #[error("malformed frame: {0}")]
    Packet(#[from] PacketError),
}
