// Chipset configuration: hardware variant, master clock rate, watchdog
// presence and the analog inputs seen by the battery level detector.
// Stored as JSON; missing fields take their defaults.

use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::chipset::variant::HardwareVariant;
use crate::error::ChipsetError;

/// Master clock rate of the real calculators.
pub const DEFAULT_CYCLES_PER_SECOND: u32 = 1_048_576;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipsetConfig {
    pub variant: HardwareVariant,
    /// Emulated master clock in Hz.
    pub cycles_per_second: u32,
    /// Watchdog timer implemented.  Also makes interrupt mask bit 0
    /// (the non-maskable line) writable.
    pub watchdog_enabled: bool,
    /// Volts.
    pub battery_voltage: f32,
    /// Volts.
    pub solar_panel_voltage: f32,
}

impl Default for ChipsetConfig {
    fn default() -> Self {
        Self {
            variant: HardwareVariant::ClassWiz,
            cycles_per_second: DEFAULT_CYCLES_PER_SECOND,
            watchdog_enabled: false,
            battery_voltage: 3.0,
            solar_panel_voltage: 0.0,
        }
    }
}

impl ChipsetConfig {
    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_strict(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("[calcchip] Cannot read config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load config from disk, surfacing every error.
    pub fn load_strict(path: &Path) -> Result<Self, ChipsetError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(s: &str) -> Result<Self, ChipsetError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> Result<String, ChipsetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save config to disk, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ChipsetError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!("[calcchip] Config saved to {}", path.display());
        Ok(())
    }
}
