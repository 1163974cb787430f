//! Configuration records for a hub and its modules.

use std::time::Duration;

use crate::modbus::connection::PollIntervals;
use crate::modules::channel::WagoChannelType;

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Hub settings: endpoint, polling cadence and optional per-module overrides.
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    /// Overrides applied positionally to the discovered module chain.
    pub modules: Vec<ModuleConfig>,
    pub polling: PollingConfig,
}

impl HubConfig {
    pub fn new(host: impl Into<String>) -> Self {
        HubConfig {
            host: host.into(),
            port: DEFAULT_PORT,
            modules: Vec::new(),
            polling: PollingConfig::default(),
        }
    }
}

/// Poll intervals in milliseconds. A `global` value overrides all individual
/// settings; unset regions fall back to the default cadence.
#[derive(Clone, Debug, Default)]
pub struct PollingConfig {
    pub global: Option<u64>,
    pub input: Option<u64>,
    pub holding: Option<u64>,
    pub discrete: Option<u64>,
    pub coil: Option<u64>,
}

impl PollingConfig {
    pub fn intervals(&self) -> PollIntervals {
        if let Some(global) = self.global {
            return PollIntervals::uniform(Duration::from_millis(global));
        }
        let pick = |value: Option<u64>| {
            Duration::from_millis(value.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
        };
        PollIntervals {
            input: pick(self.input),
            holding: pick(self.holding),
            discrete: pick(self.discrete),
            coil: pick(self.coil),
        }
    }
}

/// Override for one module in the chain.
#[derive(Clone, Debug, Default)]
pub struct ModuleConfig {
    pub name: Option<String>,
    /// Family key the override expects at this position, e.g. "641".
    pub module_type: String,
    pub index: Option<usize>,
    pub channels: Vec<ChannelConfig>,
}

impl ModuleConfig {
    pub fn id(&self) -> String {
        match self.index {
            Some(index) => format!("{}_{}", self.module_type, index),
            None => self.module_type.clone(),
        }
    }
}

/// Naming and width override for one channel of a module.
#[derive(Clone, Debug, Default)]
pub struct ChannelConfig {
    pub name: Option<String>,
    /// Requested assembly, e.g. pair analog words into byte halves.
    pub channel_type: Option<WagoChannelType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_interval_overrides_individual() {
        let polling = PollingConfig {
            global: Some(30),
            input: Some(100),
            ..Default::default()
        };
        let intervals = polling.intervals();
        assert_eq!(intervals.input, Duration::from_millis(30));
        assert_eq!(intervals.coil, Duration::from_millis(30));
    }

    #[test]
    fn unset_regions_use_default() {
        let polling = PollingConfig {
            input: Some(100),
            discrete: Some(100),
            ..Default::default()
        };
        let intervals = polling.intervals();
        assert_eq!(intervals.input, Duration::from_millis(100));
        assert_eq!(
            intervals.holding,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        assert_eq!(intervals.min(), Duration::from_millis(100));
    }
}
