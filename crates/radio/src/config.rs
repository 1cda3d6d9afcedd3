//! Construction-time configuration for channels, devices and queues

use serde::{Deserialize, Serialize};
use simple_wireless_core::{DataRate, SimTime, DEFAULT_MTU};

use crate::receive_error::ErrorUnit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Broadcast cutoff. Ignored by the per-curve model, whose range is
    /// the largest curve distance.
    pub max_range: f64,
    pub error_model: ErrorModelConfig,
    pub fixed_contention: bool,
    /// Zero means "use `max_range`", resolved on the first send.
    pub fixed_contention_range: f64,
    pub seed: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_range: 250.0,
            error_model: ErrorModelConfig::default(),
            fixed_contention: false,
            fixed_contention_range: 0.0,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorModelConfig {
    Constant {
        rate: f64,
    },
    PerCurve {
        /// (distance, error probability) control points.
        points: Vec<(f64, f64)>,
    },
    Stochastic {
        mean_up: SimTime,
        mean_down: SimTime,
    },
}

impl Default for ErrorModelConfig {
    fn default() -> Self {
        ErrorModelConfig::Constant { rate: 0.0 }
    }
}

impl ErrorModelConfig {
    pub fn stochastic_defaults() -> Self {
        ErrorModelConfig::Stochastic {
            mean_up: SimTime::from_micros(10_000),
            mean_down: SimTime::from_micros(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub data_rate: DataRate,
    pub mtu: u16,
    /// Restrict delivery to the registered directional neighbours.
    pub directional: bool,
    pub pcap: bool,
    pub queue: Option<QueueConfig>,
    pub receive_error: Option<ReceiveErrorConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            data_rate: DataRate::from_bps(1_000_000),
            mtu: DEFAULT_MTU,
            directional: false,
            pcap: false,
            queue: None,
            receive_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLimit {
    Packets(usize),
    Bytes(usize),
}

impl QueueLimit {
    pub const DEFAULT_PACKETS: QueueLimit = QueueLimit::Packets(100);
    pub const DEFAULT_BYTES: QueueLimit = QueueLimit::Bytes(100 * 65535);
}

impl Default for QueueLimit {
    fn default() -> Self {
        Self::DEFAULT_PACKETS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueConfig {
    DropTail {
        #[serde(default)]
        limit: QueueLimit,
    },
    DropHead {
        #[serde(default)]
        limit: QueueLimit,
    },
    Priority {
        control: Box<QueueConfig>,
        data: Box<QueueConfig>,
        /// Capture-filter text selecting control packets.
        classifier: String,
    },
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::DropTail {
            limit: QueueLimit::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiveErrorConfig {
    Rate { rate: f64, unit: ErrorUnit, seed: u64 },
    List { uids: Vec<u64> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let channel = ChannelConfig::default();
        assert_eq!(channel.max_range, 250.0);
        assert_eq!(channel.error_model, ErrorModelConfig::Constant { rate: 0.0 });
        assert!(!channel.fixed_contention);

        let device = DeviceConfig::default();
        assert_eq!(device.data_rate.bps(), 1_000_000);
        assert_eq!(device.mtu, 0xffff);
        assert!(device.queue.is_none());
    }

    #[test]
    fn test_queue_config_from_json() {
        let json = r#"{
            "kind": "priority",
            "classifier": "udp port 698",
            "control": { "kind": "drop_head", "limit": { "packets": 10 } },
            "data": { "kind": "drop_tail" }
        }"#;
        let config: QueueConfig = serde_json::from_str(json).unwrap();
        match config {
            QueueConfig::Priority { control, data, classifier } => {
                assert_eq!(classifier, "udp port 698");
                assert_eq!(*control, QueueConfig::DropHead { limit: QueueLimit::Packets(10) });
                assert_eq!(*data, QueueConfig::DropTail { limit: QueueLimit::Packets(100) });
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn test_channel_config_partial_json() {
        let json = r#"{ "max_range": 100.0, "error_model": { "kind": "per_curve", "points": [[0.0, 0.0], [100.0, 1.0]] } }"#;
        let config: ChannelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_range, 100.0);
        assert_eq!(config.seed, 1);
        assert!(matches!(config.error_model, ErrorModelConfig::PerCurve { ref points } if points.len() == 2));
    }
}
