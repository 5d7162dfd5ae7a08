//! Retargeting configuration.

use crate::error::ConfigError;
use crate::humanoid::HumanoidSlot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    pub mapping: MappingConfig,
    pub playback: PlaybackConfig,
    pub root_motion: RootMotion,
}

/// Extra names accepted for a slot, tried in order after the slot's canonical name.
/// Empty by default, so only names that normalize to the canonical name match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub aliases: BTreeMap<HumanoidSlot, Vec<String>>,
}

impl MappingConfig {
    /// Extra names configured for `slot`, in the order they are tried.
    pub fn aliases(&self, slot: HumanoidSlot) -> &[String] {
        self.aliases.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Multiplier applied to every tick's elapsed time.
    pub speed: f64,
    pub loop_mode: LoopMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            loop_mode: LoopMode::Loop,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Wrap around at the end of the clip.
    #[default]
    Loop,
    /// Hold the last frame.
    Once,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootMotion {
    /// Every target bone keeps its rest translation; only orientations are driven.
    #[default]
    Rest,
    /// The hips also follow their driver bone's displacement, scaled by the hips height ratio.
    Scaled,
}

impl RetargetConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RetargetConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let speed = self.playback.speed;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "playback.speed",
                reason: format!("must be a positive number, got {speed}"),
            });
        }
        Ok(())
    }
}
