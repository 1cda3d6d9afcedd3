//! What the model needs from its host simulator

use simple_wireless_core::{DeviceId, Mac48Address, NodeId, Packet, ProtocolNumber, SimTime, Vector3};

/// Discrete-event clock. Every state change in this crate happens inside a
/// handler for an event scheduled through it.
pub trait Scheduler {
    fn now(&self) -> SimTime;

    /// Fires `event` `delay` after now, in the context of `node`.
    fn schedule(&mut self, delay: SimTime, node: NodeId, event: RadioEvent);
}

pub trait PositionProvider {
    fn position_of(&self, node: NodeId) -> Option<Vector3>;
}

pub trait RadioContext: Scheduler + PositionProvider {}

impl<T: Scheduler + PositionProvider> RadioContext for T {}

/// A frame landing on a receiving device, header already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub packet: Packet,
    pub protocol: ProtocolNumber,
    pub to: Mac48Address,
    pub from: Mac48Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    TransmitComplete { device: DeviceId },
    Receive { device: DeviceId, arrival: Arrival },
}

impl RadioEvent {
    pub fn device(&self) -> DeviceId {
        match self {
            RadioEvent::TransmitComplete { device } => *device,
            RadioEvent::Receive { device, .. } => *device,
        }
    }
}
