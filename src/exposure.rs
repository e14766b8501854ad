// src/exposure.rs
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

// --- Scoring constants ---
/// Calibration constant K of the blue light formula.
const BLUE_LIGHT_K: f64 = 0.5;
/// Calibration constant M of the thermal formula.
const THERMAL_M: f64 = 3.0;
/// Durations shorter than this still produce a score at session start.
const MIN_DURATION_MIN: f64 = 0.1;
const MAX_SCORE: f64 = 100.0;

pub const DEFAULT_BRIGHTNESS: u8 = 60;

const LOW_THRESHOLD: f64 = 30.0;
const MODERATE_THRESHOLD: f64 = 70.0;

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// `<= 30` is low, `<= 70` moderate, anything above is high.
    pub fn classify(score: f64) -> Self {
        if score <= LOW_THRESHOLD {
            RiskLevel::Low
        } else if score <= MODERATE_THRESHOLD {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRiskLevel(pub String);

impl fmt::Display for UnknownRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown risk level '{}'", self.0)
    }
}

impl std::error::Error for UnknownRiskLevel {}

impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MODERATE" => Ok(RiskLevel::Moderate),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(UnknownRiskLevel(s.to_string())),
        }
    }
}

/// The two exposure channels the monitor scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureKind {
    BlueLight,
    Thermal,
}

impl ExposureKind {
    pub const ALL: [ExposureKind; 2] = [ExposureKind::BlueLight, ExposureKind::Thermal];

    pub fn alert_title(self) -> &'static str {
        match self {
            ExposureKind::BlueLight => "High Blue Light Exposure",
            ExposureKind::Thermal => "High Thermal Exposure",
        }
    }

    pub fn recommendation(self, risk: RiskLevel) -> &'static str {
        match self {
            ExposureKind::BlueLight => blue_light_recommendation(risk),
            ExposureKind::Thermal => thermal_recommendation(risk),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn usable_distance(distance_cm: Option<f64>) -> Option<f64> {
    distance_cm.filter(|d| d.is_finite() && *d > 0.0)
}

/// `brightness * duration / distance^2 * K`, capped at 100.
///
/// Unknown brightness counts as the 60% default; a missing or non-positive
/// distance yields 0.
pub fn blue_light_score(brightness: Option<u8>, duration_min: u64, distance_cm: Option<f64>) -> f64 {
    let Some(distance) = usable_distance(distance_cm) else {
        return 0.0;
    };
    let brightness = f64::from(brightness.unwrap_or(DEFAULT_BRIGHTNESS));
    let duration = (duration_min as f64).max(MIN_DURATION_MIN);

    let score = brightness * duration / distance.powi(2) * BLUE_LIGHT_K;
    round2(score).min(MAX_SCORE)
}

/// `duration / distance * M`, capped at 100.
pub fn thermal_score(duration_min: u64, distance_cm: Option<f64>) -> f64 {
    let Some(distance) = usable_distance(distance_cm) else {
        return 0.0;
    };
    let duration = (duration_min as f64).max(MIN_DURATION_MIN);

    round2(duration / distance * THERMAL_M).min(MAX_SCORE)
}

pub fn blue_light_recommendation(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "Blue light exposure is within safe limits. Continue current usage.",
        RiskLevel::Moderate => "Consider reducing screen brightness or taking periodic breaks.",
        RiskLevel::High => {
            "High blue light exposure detected. Reduce brightness, increase distance, or take a break immediately."
        }
    }
}

pub fn thermal_recommendation(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "Thermal exposure is minimal. Maintain safe distance.",
        RiskLevel::Moderate => {
            "You are getting closer to the screen. Increase distance to reduce thermal exposure."
        }
        RiskLevel::High => {
            "You are too close to the screen. Move further away immediately to prevent thermal skin damage."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_inclusive_upper_bounds() {
        assert_eq!(RiskLevel::classify(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(30.0), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(30.01), RiskLevel::Moderate);
        assert_eq!(RiskLevel::classify(70.0), RiskLevel::Moderate);
        assert_eq!(RiskLevel::classify(70.01), RiskLevel::High);
        assert_eq!(RiskLevel::classify(100.0), RiskLevel::High);
    }

    #[test]
    fn risk_level_parses_case_insensitively() {
        assert_eq!("high".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert_eq!(" Moderate ".parse::<RiskLevel>(), Ok(RiskLevel::Moderate));
        assert!("N/A".parse::<RiskLevel>().is_err());
        assert_eq!(RiskLevel::Low.to_string(), "LOW");
    }

    #[test]
    fn blue_light_follows_inverse_square() {
        // 80 * 30 / 20^2 * 0.5 = 3.0
        assert_eq!(blue_light_score(Some(80), 30, Some(20.0)), 3.0);
        // Halving the distance quadruples the score.
        assert_eq!(blue_light_score(Some(80), 30, Some(10.0)), 12.0);
    }

    #[test]
    fn blue_light_defaults_brightness_and_minimum_duration() {
        // 60 * 0.1 / 1 * 0.5 = 3.0
        assert_eq!(blue_light_score(None, 0, Some(1.0)), 3.0);
    }

    #[test]
    fn blue_light_is_zero_without_distance() {
        assert_eq!(blue_light_score(Some(100), 120, None), 0.0);
        assert_eq!(blue_light_score(Some(100), 120, Some(0.0)), 0.0);
        assert_eq!(blue_light_score(Some(100), 120, Some(-4.0)), 0.0);
    }

    #[test]
    fn scores_are_capped_and_rounded() {
        assert_eq!(blue_light_score(Some(100), 600, Some(5.0)), 100.0);
        assert_eq!(thermal_score(600, Some(5.0)), 100.0);
        // 7 / 30 * 3 = 0.7
        assert_eq!(thermal_score(7, Some(30.0)), 0.7);
        // 1 / 3 * 3 = 1.0 after rounding
        assert_eq!(thermal_score(1, Some(3.0)), 1.0);
        // 0.1 / 45 * 3 = 0.00666.. -> 0.01
        assert_eq!(thermal_score(0, Some(45.0)), 0.01);
    }

    #[test]
    fn thermal_is_zero_without_distance() {
        assert_eq!(thermal_score(90, None), 0.0);
        assert_eq!(thermal_score(90, Some(f64::NAN)), 0.0);
    }

    #[test]
    fn recommendations_match_kind() {
        assert!(ExposureKind::BlueLight
            .recommendation(RiskLevel::High)
            .starts_with("High blue light exposure detected"));
        assert!(ExposureKind::Thermal
            .recommendation(RiskLevel::High)
            .starts_with("You are too close"));
        assert_eq!(ExposureKind::Thermal.alert_title(), "High Thermal Exposure");
    }
}
