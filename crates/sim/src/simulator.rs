//! Discrete-event clock and event heap driving a `WirelessNetwork`

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use log::{debug, trace};
use simple_wireless_core::{NodeId, SimTime, Vector3};
use simple_wireless_radio::{
    PositionProvider, RadioError, RadioEvent, Scheduler, WirelessNetwork,
};

use crate::mobility::ConstantPositionMobility;
use crate::traffic::ConstantRateSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Radio(RadioEvent),
    /// Next packet of the traffic source at this index.
    Traffic(usize),
}

#[derive(Debug)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    node: NodeId,
    event: SimEvent,
}

// min-heap on (time, insertion order)
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

/// Shared read-only view of the simulation clock, for observers that
/// need to timestamp what they see.
#[derive(Debug, Clone, Default)]
pub struct SimClock(Rc<Cell<SimTime>>);

impl SimClock {
    pub fn now(&self) -> SimTime {
        self.0.get()
    }

    fn set(&self, now: SimTime) {
        self.0.set(now);
    }
}

/// Clock, pending events and node positions: everything the radio model
/// reaches through [`Scheduler`] and [`PositionProvider`].
#[derive(Default)]
pub struct SimContext {
    clock: SimClock,
    next_seq: u64,
    heap: BinaryHeap<Scheduled>,
    mobility: ConstantPositionMobility,
}

impl SimContext {
    pub fn schedule_event(&mut self, delay: SimTime, node: NodeId, event: SimEvent) {
        let at = self.clock.now() + delay;
        trace!("Schedule {:?} for node {} at {}", event, node, at);
        self.heap.push(Scheduled {
            at,
            seq: self.next_seq,
            node,
            event,
        });
        self.next_seq += 1;
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    pub fn mobility(&self) -> &ConstantPositionMobility {
        &self.mobility
    }

    pub fn mobility_mut(&mut self) -> &mut ConstantPositionMobility {
        &mut self.mobility
    }

    fn pop_until(&mut self, end: SimTime) -> Option<Scheduled> {
        if self.heap.peek()?.at > end {
            return None;
        }
        let next = self.heap.pop()?;
        self.clock.set(next.at);
        Some(next)
    }
}

impl Scheduler for SimContext {
    fn now(&self) -> SimTime {
        self.clock.now()
    }

    fn schedule(&mut self, delay: SimTime, node: NodeId, event: RadioEvent) {
        self.schedule_event(delay, node, SimEvent::Radio(event));
    }
}

impl PositionProvider for SimContext {
    fn position_of(&self, node: NodeId) -> Option<Vector3> {
        self.mobility.position(node)
    }
}

pub struct Simulator {
    pub network: WirelessNetwork,
    ctx: SimContext,
    sources: Vec<ConstantRateSource>,
    events_run: u64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            network: WirelessNetwork::new(),
            ctx: SimContext::default(),
            sources: Vec::new(),
            events_run: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.ctx.now()
    }

    pub fn clock(&self) -> SimClock {
        self.ctx.clock.clone()
    }

    pub fn context(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    /// Network and context together, for driving the model by hand.
    pub fn parts(&mut self) -> (&mut WirelessNetwork, &mut SimContext) {
        (&mut self.network, &mut self.ctx)
    }

    pub fn set_position(&mut self, node: NodeId, position: Vector3) {
        self.ctx.mobility.set_position(node, position);
    }

    pub fn events_run(&self) -> u64 {
        self.events_run
    }

    /// Registers a source; its first packet goes out at its start time.
    pub fn add_source(&mut self, source: ConstantRateSource) -> usize {
        let index = self.sources.len();
        let delay = source.start().saturating_sub(self.ctx.now());
        self.ctx
            .schedule_event(delay, source.node(), SimEvent::Traffic(index));
        self.sources.push(source);
        index
    }

    pub fn sources(&self) -> &[ConstantRateSource] {
        &self.sources
    }

    /// Runs every event due at or before `end`, then leaves the clock at
    /// `end`.
    pub fn run_until(&mut self, end: SimTime) -> Result<(), RadioError> {
        while let Some(Scheduled { at, node, event, .. }) = self.ctx.pop_until(end) {
            trace!("{} node {} runs {:?}", at, node, event);
            self.events_run += 1;
            match event {
                SimEvent::Radio(event) => self.network.handle_event(event, &mut self.ctx)?,
                SimEvent::Traffic(index) => {
                    if let Some(next) = self.sources[index].fire(&mut self.network, &mut self.ctx)? {
                        self.ctx.schedule_event(next, node, SimEvent::Traffic(index));
                    }
                }
            }
        }
        if self.ctx.now() < end {
            self.ctx.clock.set(end);
        }
        debug!("Stopped at {} after {} events", self.ctx.now(), self.events_run);
        Ok(())
    }

    /// Runs until no events remain.
    pub fn run(&mut self) -> Result<(), RadioError> {
        while let Some(next) = self.ctx.heap.peek().map(|s| s.at) {
            self.run_until(next)?;
        }
        Ok(())
    }
}
