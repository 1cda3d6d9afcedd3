//! Simulated time and link data rates

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in (or span of) simulated time, with nanosecond resolution.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub const fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros * 1_000)
    }

    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000_000)
    }

    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs * 1_000_000_000)
    }

    /// Rounds to the nearest nanosecond; negative and NaN inputs become zero.
    pub fn from_nanos_f64(nanos: f64) -> Self {
        if nanos.is_nan() || nanos <= 0.0 {
            return SimTime::ZERO;
        }
        if nanos >= u64::MAX as f64 {
            return SimTime::MAX;
        }
        SimTime(nanos.round() as u64)
    }

    pub fn from_micros_f64(micros: f64) -> Self {
        Self::from_nanos_f64(micros * 1e3)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self::from_nanos_f64(secs * 1e9)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_micros_f64(self) -> f64 {
        self.0 as f64 / 1e3
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        self.saturating_sub(rhs)
    }
}

impl Mul<u32> for SimTime {
    type Output = SimTime;

    fn mul(self, rhs: u32) -> SimTime {
        SimTime(self.0.saturating_mul(rhs as u64))
    }
}

impl From<Duration> for SimTime {
    fn from(d: Duration) -> Self {
        SimTime(d.as_nanos().min(u64::MAX as u128) as u64)
    }
}

impl From<SimTime> for Duration {
    fn from(t: SimTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataRateParseError {
    #[error("empty data rate")]
    Empty,

    #[error("invalid number in data rate {0:?}")]
    InvalidNumber(String),

    #[error("unknown data rate unit {0:?}")]
    UnknownUnit(String),
}

/// Link data rate in bits per second.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DataRate(u64);

impl DataRate {
    pub const fn from_bps(bps: u64) -> Self {
        DataRate(bps)
    }

    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Time needed to clock `bytes` onto the medium, rounded up to the next
    /// nanosecond. A zero rate never finishes.
    pub fn tx_time(self, bytes: usize) -> SimTime {
        if self.0 == 0 {
            return SimTime::MAX;
        }
        let bits = (bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000) + (self.0 as u128 - 1)) / self.0 as u128;
        SimTime::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b/s", self.0)
    }
}

impl FromStr for DataRate {
    type Err = DataRateParseError;

    /// Accepts a bare number of bits per second or a number followed by a
    /// unit such as `b/s`, `kbps`, `Mb/s`, `GBps`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DataRateParseError::Empty);
        }
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| DataRateParseError::InvalidNumber(s.to_string()))?;

        let multiplier = match unit.trim() {
            "" | "b/s" | "bps" => 1.0,
            "kb/s" | "kbps" | "Kb/s" | "Kbps" => 1e3,
            "Mb/s" | "Mbps" => 1e6,
            "Gb/s" | "Gbps" => 1e9,
            "B/s" | "Bps" => 8.0,
            "kB/s" | "kBps" | "KB/s" | "KBps" => 8e3,
            "MB/s" | "MBps" => 8e6,
            "GB/s" | "GBps" => 8e9,
            other => return Err(DataRateParseError::UnknownUnit(other.to_string())),
        };
        Ok(DataRate((value * multiplier).round() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_time() {
        let rate = DataRate::from_bps(1_000_000);
        assert_eq!(rate.tx_time(1000), SimTime::from_millis(8));
        assert_eq!(rate.tx_time(0), SimTime::ZERO);
        // 8 bits at 3 b/s is 2.666..s, rounded up
        assert_eq!(DataRate::from_bps(3).tx_time(1).as_nanos(), 2_666_666_667);
        assert_eq!(DataRate::from_bps(0).tx_time(10), SimTime::MAX);
    }

    #[test]
    fn test_parse_data_rate() {
        assert_eq!("1000000b/s".parse::<DataRate>().unwrap().bps(), 1_000_000);
        assert_eq!("1Mbps".parse::<DataRate>().unwrap().bps(), 1_000_000);
        assert_eq!("512kb/s".parse::<DataRate>().unwrap().bps(), 512_000);
        assert_eq!("2MB/s".parse::<DataRate>().unwrap().bps(), 16_000_000);
        assert_eq!("1.5Mbps".parse::<DataRate>().unwrap().bps(), 1_500_000);
        assert_eq!("100000".parse::<DataRate>().unwrap().bps(), 100_000);
        assert!(matches!("".parse::<DataRate>(), Err(DataRateParseError::Empty)));
        assert!(matches!(
            "10 furlongs".parse::<DataRate>(),
            Err(DataRateParseError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_time_conversions() {
        assert_eq!(SimTime::from_nanos_f64(165.0), SimTime::from_nanos(165));
        assert_eq!(SimTime::from_nanos_f64(109.89), SimTime::from_nanos(110));
        assert_eq!(SimTime::from_nanos_f64(-4.0), SimTime::ZERO);
        assert_eq!(SimTime::from_micros(10), SimTime::from_nanos(10_000));
        assert_eq!(SimTime::from_secs_f64(1.5), SimTime::from_millis(1500));
        assert_eq!(SimTime::from_millis(8) * 3, SimTime::from_millis(24));
        assert_eq!(SimTime::from_millis(8).to_string(), "0.008000000s");
    }
}
