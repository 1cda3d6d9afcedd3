//! Bounded transmit queues used by the network device

use std::collections::VecDeque;

use simple_wireless_core::TaggedPacket;

use crate::config::{QueueConfig, QueueLimit};
use crate::filter::CaptureFilter;
use crate::RadioError;

mod drop_head;
mod drop_tail;
mod priority;

pub use drop_head::DropHeadQueue;
pub use drop_tail::DropTailQueue;
pub use priority::{PacketClass, PriorityQueue};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
}

impl QueueStats {
    fn merge(self, other: QueueStats) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued + other.enqueued,
            dequeued: self.dequeued + other.dequeued,
            dropped_packets: self.dropped_packets + other.dropped_packets,
            dropped_bytes: self.dropped_bytes + other.dropped_bytes,
        }
    }
}

/// FIFO of tagged packets with a drop policy applied on enqueue.
pub trait PacketQueue {
    /// False when the packet was refused and dropped.
    fn enqueue(&mut self, item: TaggedPacket) -> bool;

    fn dequeue(&mut self) -> Option<TaggedPacket>;

    fn peek(&self) -> Option<&TaggedPacket>;

    fn n_packets(&self) -> usize;

    fn n_bytes(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.n_packets() == 0
    }

    fn stats(&self) -> QueueStats;
}

/// Builds a queue discipline, compiling any classifier it needs.
pub fn build(config: &QueueConfig) -> Result<Box<dyn PacketQueue>, RadioError> {
    Ok(match config {
        QueueConfig::DropTail { limit } => Box::new(DropTailQueue::new(*limit)),
        QueueConfig::DropHead { limit } => Box::new(DropHeadQueue::new(*limit)),
        QueueConfig::Priority {
            control,
            data,
            classifier,
        } => Box::new(PriorityQueue::new(
            build(control)?,
            build(data)?,
            CaptureFilter::compile(classifier)?,
        )),
    })
}

/// Storage shared by the single-FIFO disciplines.
#[derive(Debug, Default)]
struct Fifo {
    packets: VecDeque<TaggedPacket>,
    bytes: usize,
    stats: QueueStats,
}

impl Fifo {
    fn push(&mut self, item: TaggedPacket) {
        self.bytes += item.size();
        self.stats.enqueued += 1;
        self.packets.push_back(item);
    }

    fn pop(&mut self) -> Option<TaggedPacket> {
        let item = self.packets.pop_front()?;
        self.bytes -= item.size();
        self.stats.dequeued += 1;
        Some(item)
    }

    fn count_drop(&mut self, item: &TaggedPacket) {
        self.stats.dropped_packets += 1;
        self.stats.dropped_bytes += item.size() as u64;
    }

    /// Whether `incoming` bytes would still fit under `limit`.
    fn fits(&self, limit: QueueLimit, incoming: usize) -> bool {
        match limit {
            QueueLimit::Packets(max) => self.packets.len() < max,
            QueueLimit::Bytes(max) => self.bytes + incoming <= max,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use simple_wireless_core::{Packet, TaggedPacket};

    pub fn packet_of(size: usize, marker: u8) -> TaggedPacket {
        TaggedPacket::untagged(Packet::from_payload(vec![marker; size]))
    }

    pub fn marker(item: &TaggedPacket) -> u8 {
        item.packet.data()[0]
    }

    #[test]
    fn test_build_from_config() {
        use super::*;
        let queue = build(&QueueConfig::Priority {
            control: Box::new(QueueConfig::DropHead { limit: QueueLimit::Packets(2) }),
            data: Box::new(QueueConfig::default()),
            classifier: "udp port 698".into(),
        })
        .unwrap();
        assert!(queue.is_empty());

        let err = build(&QueueConfig::Priority {
            control: Box::new(QueueConfig::default()),
            data: Box::new(QueueConfig::default()),
            classifier: "udp port".into(),
        });
        assert!(matches!(err, Err(RadioError::Filter(_))));
    }
}
