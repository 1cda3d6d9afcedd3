use std::collections::HashMap;

use simple_wireless_core::{NodeId, SimTime, Vector3};

use crate::context::{PositionProvider, RadioEvent, Scheduler};

/// Scheduler double that records instead of firing.
#[derive(Default)]
pub struct RecordingContext {
    pub now: SimTime,
    pub positions: HashMap<NodeId, Vector3>,
    pub scheduled: Vec<(SimTime, NodeId, RadioEvent)>,
}

impl RecordingContext {
    pub fn place(&mut self, node: NodeId, position: Vector3) {
        self.positions.insert(node, position);
    }

    pub fn take(&mut self) -> Vec<(SimTime, NodeId, RadioEvent)> {
        std::mem::take(&mut self.scheduled)
    }
}

impl Scheduler for RecordingContext {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, delay: SimTime, node: NodeId, event: RadioEvent) {
        self.scheduled.push((delay, node, event));
    }
}

impl PositionProvider for RecordingContext {
    fn position_of(&self, node: NodeId) -> Option<Vector3> {
        self.positions.get(&node).copied()
    }
}
