use std::collections::HashMap;

use simple_wireless_core::{NodeId, Vector3};

/// Nodes that never move.
#[derive(Debug, Clone, Default)]
pub struct ConstantPositionMobility {
    positions: HashMap<NodeId, Vector3>,
}

impl ConstantPositionMobility {
    pub fn set_position(&mut self, node: NodeId, position: Vector3) {
        self.positions.insert(node, position);
    }

    pub fn position(&self, node: NodeId) -> Option<Vector3> {
        self.positions.get(&node).copied()
    }

    pub fn distance(&self, a: NodeId, b: NodeId) -> Option<f64> {
        Some(self.position(a)?.distance_to(&self.position(b)?))
    }

    /// Places `count` nodes, starting at node id `first`, `spacing` apart
    /// along the x axis.
    pub fn line(&mut self, first: NodeId, count: u32, spacing: f64) {
        for i in 0..count {
            self.set_position(first + i, Vector3::new(i as f64 * spacing, 0.0, 0.0));
        }
    }
}
