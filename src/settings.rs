use std::path::PathBuf;
use std::time::Duration;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BAUD_RATE, DEFAULT_BUFFER_CAPACITY, DEFAULT_SERIAL_PORT, DEFAULT_TIMEOUT_MS};
use crate::location::WatchOptions;
use crate::units::SpeedUnit;

lazy_static! {
    static ref SETTINGS_PATH: PathBuf = {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
            .unwrap_or_default()
            .join("settings.json")
    };
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationSource {
    Serial { port: String, baud_rate: u32 },
    Replay { path: PathBuf, speedup: f64 },
}

impl Default for LocationSource {
    fn default() -> Self {
        LocationSource::Serial {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub unit: SpeedUnit,
    pub buffer_capacity: usize,
    pub timeout_ms: u64,
    pub high_accuracy: bool,
    pub allow_cached_fix: bool,
    pub source: LocationSource,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unit: SpeedUnit::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            high_accuracy: true,
            allow_cached_fix: false,
            source: LocationSource::default(),
        }
    }
}

impl Settings {
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            timeout: Duration::from_millis(self.timeout_ms),
            allow_cached_fix: self.allow_cached_fix,
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let settings = serde_json::to_string_pretty(&self)?;
        std::fs::write((*SETTINGS_PATH).clone(), settings)?;
        Ok(())
    }

    pub fn load_or_default() -> anyhow::Result<Self> {
        if !(*SETTINGS_PATH).exists() {
            return Ok(Self::default());
        }

        let settings = std::fs::read_to_string((*SETTINGS_PATH).clone())?;
        let settings: Settings = serde_json::from_str(&settings)?;
        Ok(settings)
    }

    pub fn path() -> PathBuf {
        (*SETTINGS_PATH).clone()
    }
}
