//! Reference scenarios exercising each channel and device feature

use simple_wireless_core::DataRate;
use simple_wireless_radio::{
    ChannelConfig, DeviceConfig, ErrorModelConfig, QueueConfig, QueueLimit,
};

use crate::scenario::{NodeSpec, Scenario, TrafficSpec};
use crate::traffic::Payload;

/// UDP port whose traffic the priority scenario treats as control.
pub const CONTROL_PORT: u16 = 698;

const PACKET_SIZE: usize = 1000;

fn line(count: u32, spacing: f64) -> Vec<NodeSpec> {
    (0..count).map(|i| NodeSpec::at(i as f64 * spacing, 0.0)).collect()
}

fn queued(queue: QueueConfig) -> DeviceConfig {
    DeviceConfig {
        data_rate: DataRate::from_bps(1_000_000),
        queue: Some(queue),
        ..Default::default()
    }
}

fn base(name: &str, channel: ChannelConfig) -> Scenario {
    Scenario {
        name: name.to_string(),
        duration_secs: 10.0,
        channel,
        device: queued(QueueConfig::default()),
        nodes: line(5, 50.0),
        traffic: vec![TrafficSpec::broadcast(0, PACKET_SIZE, DataRate::from_bps(100_000))],
        pcap_prefix: None,
    }
}

pub fn constant_error(rate: f64) -> Scenario {
    base(
        "constant error",
        ChannelConfig {
            max_range: 250.0,
            error_model: ErrorModelConfig::Constant { rate },
            ..Default::default()
        },
    )
}

/// Loss rising with distance: nodes further down the line hear less.
pub fn per_curve() -> Scenario {
    base(
        "per curve",
        ChannelConfig {
            error_model: ErrorModelConfig::PerCurve {
                points: vec![(0.0, 0.0), (100.0, 0.1), (150.0, 0.5), (200.0, 0.9)],
            },
            ..Default::default()
        },
    )
}

pub fn stochastic() -> Scenario {
    base(
        "stochastic",
        ChannelConfig {
            error_model: ErrorModelConfig::stochastic_defaults(),
            ..Default::default()
        },
    )
}

/// Every node offering 40% of the link rate, which only fits while the
/// contention slowdown is off.
pub fn fixed_contention(enabled: bool) -> Scenario {
    let mut scenario = base(
        if enabled { "fixed contention" } else { "no contention" },
        ChannelConfig {
            max_range: 250.0,
            fixed_contention: enabled,
            ..Default::default()
        },
    );
    scenario.traffic = (0..5)
        .map(|node| TrafficSpec {
            start_secs: node as f64 * 0.001,
            ..TrafficSpec::broadcast(node, PACKET_SIZE, DataRate::from_bps(400_000))
        })
        .collect();
    scenario
}

/// A chain where each node only reaches its direct neighbours, although
/// everyone is within radio range.
pub fn directional_chain() -> Scenario {
    let mut scenario = base("directional chain", ChannelConfig::default());
    scenario.nodes = (0..5u32)
        .map(|i| {
            let neighbors = [i.checked_sub(1), (i < 4).then_some(i + 1)];
            NodeSpec::at(i as f64 * 50.0, 0.0).with_neighbors(neighbors.into_iter().flatten())
        })
        .collect();
    scenario.traffic = vec![TrafficSpec::broadcast(2, PACKET_SIZE, DataRate::from_bps(100_000))];
    scenario
}

/// Two flows offered at twice the link rate into a small queue.
pub fn queue_discipline(name: &str, queue: QueueConfig) -> Scenario {
    let mut scenario = base(name, ChannelConfig::default());
    scenario.nodes = line(2, 50.0);
    scenario.device = queued(queue);
    scenario.duration_secs = 2.0;
    scenario.traffic = vec![
        TrafficSpec {
            payload: Payload::Udp(CONTROL_PORT),
            ..TrafficSpec::broadcast(0, 200, DataRate::from_bps(200_000))
        },
        TrafficSpec {
            payload: Payload::Udp(9),
            ..TrafficSpec::broadcast(0, PACKET_SIZE, DataRate::from_bps(1_800_000))
        },
    ];
    scenario
}

pub fn drop_tail() -> Scenario {
    queue_discipline(
        "drop tail",
        QueueConfig::DropTail {
            limit: QueueLimit::Packets(10),
        },
    )
}

pub fn drop_head() -> Scenario {
    queue_discipline(
        "drop head",
        QueueConfig::DropHead {
            limit: QueueLimit::Packets(10),
        },
    )
}

pub fn priority() -> Scenario {
    queue_discipline(
        "priority",
        QueueConfig::Priority {
            control: Box::new(QueueConfig::DropTail {
                limit: QueueLimit::Packets(10),
            }),
            data: Box::new(QueueConfig::DropTail {
                limit: QueueLimit::Packets(10),
            }),
            classifier: format!("udp port {CONTROL_PORT}"),
        },
    )
}

pub fn reference_suite() -> Vec<Scenario> {
    vec![
        constant_error(0.0),
        constant_error(0.2),
        per_curve(),
        stochastic(),
        fixed_contention(false),
        fixed_contention(true),
        directional_chain(),
        drop_tail(),
        drop_head(),
        priority(),
    ]
}
