use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use xrlink_headless::HeadlessScript;
use xrlink_protocol::{Handedness, SessionMode};
use xrlink_runtime::RuntimeConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// What the simulated user does during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub mode: SessionMode,
    pub ticks: u32,
    pub frame_interval_ms: u64,
    pub controllers: Vec<Handedness>,
    pub hands: Vec<Handedness>,
    /// Tick on which the first controller fires `select`.
    pub select_on_tick: Option<u32>,
    /// Ticks during which the headset reports no viewer pose.
    pub tracking_lost: Vec<u32>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            mode: SessionMode::ImmersiveVr,
            ticks: 5,
            frame_interval_ms: 11,
            controllers: vec![Handedness::Left],
            hands: vec![Handedness::Right],
            select_on_tick: Some(2),
            tracking_lost: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub runtime: RuntimeConfig,
    pub host: HeadlessScript,
    pub scenario: Scenario,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrlink_protocol::ReferenceSpaceType;

    #[test]
    fn example_config_parses() -> Result<()> {
        let config: DaemonConfig = serde_json::from_str(include_str!("../xrlinkd.example.json"))?;
        assert_eq!(config.runtime.reference_space, ReferenceSpaceType::LocalFloor);
        assert!(config.host.reject_optional_features);
        assert_eq!(config.scenario.tracking_lost, vec![4]);
        assert_eq!(config.log_format, LogFormat::Compact);
        Ok(())
    }

    #[test]
    fn empty_config_uses_defaults() -> Result<()> {
        let config: DaemonConfig = serde_json::from_str("{}")?;
        assert_eq!(config.scenario.mode, SessionMode::ImmersiveVr);
        assert_eq!(config.scenario.ticks, 5);
        assert!(config.runtime.clear_depth_each_frame);
        Ok(())
    }
}
