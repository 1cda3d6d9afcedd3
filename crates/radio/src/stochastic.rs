//! Per-link on/off connectivity with exponentially distributed sojourn times
//!
//! Link state is advanced lazily: nothing is scheduled per link, and a
//! lookup replays every transition missed since the last one.

use std::collections::BTreeMap;

use log::trace;
use rand::RngCore;
use rand_distr::{Distribution, Exp};
use simple_wireless_core::{NodeId, SimTime};

use crate::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StochasticLink {
    pub up: bool,
    pub expires_at: SimTime,
}

#[derive(Debug, Clone)]
pub struct StochasticLinks {
    mean_up: SimTime,
    mean_down: SimTime,
    up: Exp<f64>,
    down: Exp<f64>,
    links: BTreeMap<(NodeId, NodeId), StochasticLink>,
}

impl StochasticLinks {
    pub fn new(mean_up: SimTime, mean_down: SimTime) -> Result<Self, RadioError> {
        Ok(Self {
            mean_up,
            mean_down,
            up: exp_with_mean(mean_up)?,
            down: exp_with_mean(mean_down)?,
            links: BTreeMap::new(),
        })
    }

    pub fn mean_up(&self) -> SimTime {
        self.mean_up
    }

    pub fn mean_down(&self) -> SimTime {
        self.mean_down
    }

    /// Creates an "up" link for every ordered pair of distinct nodes.
    /// Pairs that already exist keep their state.
    pub fn initialize(&mut self, nodes: &[NodeId], now: SimTime, rng: &mut dyn RngCore) {
        for &src in nodes {
            for &dst in nodes {
                if src == dst || self.links.contains_key(&(src, dst)) {
                    continue;
                }
                let link = StochasticLink {
                    up: true,
                    expires_at: now + self.draw(true, rng),
                };
                trace!(
                    "Add stochastic link {} -> {}, up until {}",
                    src,
                    dst,
                    link.expires_at
                );
                self.links.insert((src, dst), link);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link(&self, src: NodeId, dst: NodeId) -> Option<StochasticLink> {
        self.links.get(&(src, dst)).copied()
    }

    /// Brings the link up to date with `now` and reports whether it is up.
    pub fn is_up(
        &mut self,
        src: NodeId,
        dst: NodeId,
        now: SimTime,
        rng: &mut dyn RngCore,
    ) -> Result<bool, RadioError> {
        let (up_dist, down_dist) = (self.up, self.down);
        let link = self
            .links
            .get_mut(&(src, dst))
            .ok_or(RadioError::UnknownStochasticLink { src, dst })?;

        if now >= link.expires_at {
            let mut state = link.up;
            let mut end = link.expires_at;
            while end < now {
                // the next state's duration comes from the opposite state's distribution
                let dist = if state { &down_dist } else { &up_dist };
                end += SimTime::from_micros_f64(dist.sample(rng));
                state = !state;
                trace!(
                    "{} link {} -> {} goes {} until {}",
                    now,
                    src,
                    dst,
                    if state { "up" } else { "down" },
                    end
                );
            }
            link.up = state;
            link.expires_at = end;
        }
        Ok(link.up)
    }

    fn draw(&self, up: bool, rng: &mut dyn RngCore) -> SimTime {
        let dist = if up { &self.up } else { &self.down };
        SimTime::from_micros_f64(dist.sample(rng))
    }
}

fn exp_with_mean(mean: SimTime) -> Result<Exp<f64>, RadioError> {
    let mean_us = mean.as_micros_f64();
    if mean_us <= 0.0 {
        return Err(RadioError::InvalidConfig(
            "stochastic link durations must be positive".into(),
        ));
    }
    Exp::new(1.0 / mean_us)
        .map_err(|e| RadioError::InvalidConfig(format!("stochastic link duration: {e}")))
}
