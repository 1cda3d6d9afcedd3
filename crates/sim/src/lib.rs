//! simulation harness for the simple wireless radio model

pub mod capture;
pub mod mobility;
pub mod report;
pub mod scenario;
pub mod scenarios;
pub mod simulator;
pub mod traffic;

pub use capture::{PcapObserver, PcapWriter};
pub use mobility::ConstantPositionMobility;
pub use report::{ChannelReport, DeviceTrace, NodeReport, ScenarioReport, TraceCollector};
pub use scenario::{run_scenario, NodeSpec, Scenario, SimError, TrafficSpec};
pub use simulator::{SimClock, SimContext, SimEvent, Simulator};
pub use traffic::{ConstantRateSource, Payload};

use simple_wireless_radio::{ChannelConfig, ErrorModelConfig};

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn good_conditions() -> ChannelConfig {
        ChannelConfig {
            max_range: 250.0,
            error_model: ErrorModelConfig::Constant { rate: 0.05 },
            ..Default::default()
        }
    }

    pub fn average_conditions() -> ChannelConfig {
        ChannelConfig {
            error_model: ErrorModelConfig::PerCurve {
                points: vec![(0.0, 0.0), (100.0, 0.15), (200.0, 0.4), (250.0, 0.8)],
            },
            ..Default::default()
        }
    }

    pub fn poor_conditions() -> ChannelConfig {
        ChannelConfig {
            max_range: 250.0,
            error_model: ErrorModelConfig::stochastic_defaults(),
            fixed_contention: true,
            ..Default::default()
        }
    }

    pub fn extreme_conditions() -> ChannelConfig {
        ChannelConfig {
            max_range: 100.0,
            error_model: ErrorModelConfig::Constant { rate: 0.5 },
            fixed_contention: true,
            ..Default::default()
        }
    }
}
