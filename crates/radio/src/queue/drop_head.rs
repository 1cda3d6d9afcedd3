use log::debug;
use simple_wireless_core::TaggedPacket;

use super::{Fifo, PacketQueue, QueueStats};
use crate::config::QueueLimit;

/// Makes room for new packets by dropping the oldest ones.
#[derive(Debug)]
pub struct DropHeadQueue {
    fifo: Fifo,
    limit: QueueLimit,
}

impl DropHeadQueue {
    pub fn new(limit: QueueLimit) -> Self {
        Self {
            fifo: Fifo::default(),
            limit,
        }
    }

    pub fn limit(&self) -> QueueLimit {
        self.limit
    }

    fn drop_head(&mut self) -> bool {
        let Some(head) = self.fifo.packets.pop_front() else {
            return false;
        };
        self.fifo.bytes -= head.size();
        debug!(
            "Drop-head queue full, dropping oldest packet {} ({} bytes)",
            head.packet.uid(),
            head.size()
        );
        self.fifo.count_drop(&head);
        true
    }
}

impl PacketQueue for DropHeadQueue {
    /// Accepts every packet that could fit in an empty queue.
    fn enqueue(&mut self, item: TaggedPacket) -> bool {
        let fits_at_all = match self.limit {
            QueueLimit::Packets(max) => max > 0,
            QueueLimit::Bytes(max) => item.size() <= max,
        };
        if !fits_at_all {
            debug!(
                "Packet {} of {} bytes can never fit the drop-head queue",
                item.packet.uid(),
                item.size()
            );
            self.fifo.count_drop(&item);
            return false;
        }

        while !self.fifo.fits(self.limit, item.size()) {
            if !self.drop_head() {
                break;
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::{marker, packet_of};

    #[test]
    fn test_evicts_oldest_by_packets() {
        let mut q = DropHeadQueue::new(QueueLimit::Packets(4));
        for i in 1..=5 {
            assert!(q.enqueue(packet_of(10, i)));
        }
        assert_eq!(q.n_packets(), 4);
        let order: Vec<u8> = std::iter::from_fn(|| q.dequeue()).map(|p| marker(&p)).collect();
        assert_eq!(order, vec![2, 3, 4, 5]);
        assert_eq!(q.stats().dropped_packets, 1);
    }

    #[test]
    fn test_evicts_as_many_as_needed_by_bytes() {
        let mut q = DropHeadQueue::new(QueueLimit::Bytes(100));
        assert!(q.enqueue(packet_of(30, 1)));
        assert!(q.enqueue(packet_of(30, 2)));
        assert!(q.enqueue(packet_of(30, 3)));
        // needs 70 free bytes: the two oldest must go
        assert!(q.enqueue(packet_of(70, 4)));
        assert_eq!(q.n_bytes(), 100);
        let order: Vec<u8> = std::iter::from_fn(|| q.dequeue()).map(|p| marker(&p)).collect();
        assert_eq!(order, vec![3, 4]);
        assert_eq!(q.stats().dropped_packets, 2);
        assert_eq!(q.stats().dropped_bytes, 60);
    }

    #[test]
    fn test_oversized_packet_is_refused() {
        let mut q = DropHeadQueue::new(QueueLimit::Bytes(50));
        assert!(q.enqueue(packet_of(20, 1)));
        assert!(!q.enqueue(packet_of(51, 2)));
        assert_eq!(q.n_packets(), 1);
        assert!(!DropHeadQueue::new(QueueLimit::Packets(0)).enqueue(packet_of(1, 1)));
    }
}
