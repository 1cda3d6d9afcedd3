use log::debug;
use simple_wireless_core::TaggedPacket;

use super::{Fifo, PacketQueue, QueueStats};
use crate::config::QueueLimit;

/// Refuses new packets once full.
#[derive(Debug)]
pub struct DropTailQueue {
    fifo: Fifo,
    limit: QueueLimit,
}

impl DropTailQueue {
    pub fn new(limit: QueueLimit) -> Self {
        Self {
            fifo: Fifo::default(),
            limit,
        }
    }

    pub fn limit(&self) -> QueueLimit {
        self.limit
    }
}

impl PacketQueue for DropTailQueue {
    fn enqueue(&mut self, item: TaggedPacket) -> bool {
        if !self.fifo.fits(self.limit, item.size()) {
            debug!(
                "Drop-tail queue full ({} packets, {} bytes), dropping packet {}",
                self.fifo.packets.len(),
                self.fifo.bytes,
                item.packet.uid()
            );
            self.fifo.count_drop(&item);
            return false;
        }
        self.fifo.push(item);
        true
    }

    fn dequeue(&mut self) -> Option<TaggedPacket> {
        self.fifo.pop()
    }

    fn peek(&self) -> Option<&TaggedPacket> {
        self.fifo.packets.front()
    }

    fn n_packets(&self) -> usize {
        self.fifo.packets.len()
    }

    fn n_bytes(&self) -> usize {
        self.fifo.bytes
    }

    fn stats(&self) -> QueueStats {
        self.fifo.stats
    }
}
