use log::trace;
use simple_wireless_core::TaggedPacket;

use super::{PacketQueue, QueueStats};
use crate::filter::CaptureFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    Control,
    Data,
}

/// Strict two-level priority: control traffic always leaves first.
///
/// Packets are classified on their full frame (link header included), so
/// they must be enqueued after the header has been rebuilt.
pub struct PriorityQueue {
    control: Box<dyn PacketQueue>,
    data: Box<dyn PacketQueue>,
    classifier: CaptureFilter,
}

impl PriorityQueue {
    pub fn new(
        control: Box<dyn PacketQueue>,
        data: Box<dyn PacketQueue>,
        classifier: CaptureFilter,
    ) -> Self {
        Self {
            control,
            data,
            classifier,
        }
    }

    pub fn classify(&self, item: &TaggedPacket) -> PacketClass {
        if self.classifier.matches(item.packet.data()) {
            PacketClass::Control
        } else {
            PacketClass::Data
        }
    }

    pub fn classifier(&self) -> &CaptureFilter {
        &self.classifier
    }

    pub fn control(&self) -> &dyn PacketQueue {
        self.control.as_ref()
    }

    pub fn data(&self) -> &dyn PacketQueue {
        self.data.as_ref()
    }
}

impl PacketQueue for PriorityQueue {
    fn enqueue(&mut self, item: TaggedPacket) -> bool {
        let class = self.classify(&item);
        trace!("Packet {} classified as {:?}", item.packet.uid(), class);
        match class {
            PacketClass::Control => self.control.enqueue(item),
            PacketClass::Data => self.data.enqueue(item),
        }
    }

    fn dequeue(&mut self) -> Option<TaggedPacket> {
        if self.control.is_empty() {
            self.data.dequeue()
        } else {
            self.control.dequeue()
        }
    }

    fn peek(&self) -> Option<&TaggedPacket> {
        if self.control.is_empty() {
            self.data.peek()
        } else {
            self.control.peek()
        }
    }

    fn n_packets(&self) -> usize {
        self.control.n_packets() + self.data.n_packets()
    }

    fn n_bytes(&self) -> usize {
        self.control.n_bytes() + self.data.n_bytes()
    }

    fn stats(&self) -> QueueStats {
        self.control.stats().merge(self.data.stats())
    }
}
