use serde::{Deserialize, Serialize};

use crate::consts::{MPS_TO_KMH, MPS_TO_MPH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Kmh,
    Mph,
}

impl SpeedUnit {
    pub fn convert(&self, speed_mps: f64) -> f64 {
        match self {
            SpeedUnit::Kmh => speed_mps * MPS_TO_KMH,
            SpeedUnit::Mph => speed_mps * MPS_TO_MPH,
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            SpeedUnit::Kmh => SpeedUnit::Mph,
            SpeedUnit::Mph => SpeedUnit::Kmh,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedUnit::Kmh => "km/h",
            SpeedUnit::Mph => "mph",
        }
    }

    /// Speed in this unit with one decimal, e.g. `"36.0"`
    pub fn format(&self, speed_mps: f64) -> String {
        format_one_decimal(self.convert(speed_mps))
    }
}

/// One decimal place, rounding the exact binary value (so 1.45, stored as
/// 1.4499..., shows "1.4"). Exact ties such as 0.25 go away from zero.
pub fn format_one_decimal(value: f64) -> String {
    let magnitude = value.abs();
    // Only multiples of 0.25 with an odd quarter count sit exactly between two tenths
    let quarters = magnitude * 4.0;
    let text = if quarters.fract() == 0.0 && quarters % 2.0 == 1.0 {
        format!("{:.1}", magnitude + 0.05)
    } else {
        format!("{:.1}", magnitude)
    };

    if value.is_sign_negative() && text != "0.0" {
        format!("-{}", text)
    } else {
        text
    }
}

/// 0-100 display metric from the accuracy radius in meters
pub fn signal_quality(accuracy_m: f64) -> f64 {
    (100.0 - accuracy_m / 2.0).clamp(0.0, 100.0)
}
