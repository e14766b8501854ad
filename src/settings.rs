// src/settings.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    distance::{DistanceParams, DEFAULT_FOCAL_LENGTH_PX, REAL_EYE_DISTANCE_CM},
    history::DEFAULT_LOG_PATH,
    monitor::{DEFAULT_ALERT_COOLDOWN_SECS, DEFAULT_MONITORING_INTERVAL_SECS, MIN_MONITORING_INTERVAL_SECS},
};

pub const DEFAULT_MODEL_PATH: &str = "models/face_mesh.onnx";

/// User configuration, persisted between runs through eframe storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitoring_interval_secs: u64,
    pub alert_cooldown_secs: u64,
    /// Replaces the OS brightness probe when set.
    pub manual_brightness: Option<u8>,
    pub focal_length_px: f64,
    pub real_eye_distance_cm: f64,
    pub camera_index: u32,
    pub model_path: PathBuf,
    pub log_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: DEFAULT_MONITORING_INTERVAL_SECS,
            alert_cooldown_secs: DEFAULT_ALERT_COOLDOWN_SECS,
            manual_brightness: None,
            focal_length_px: DEFAULT_FOCAL_LENGTH_PX,
            real_eye_distance_cm: REAL_EYE_DISTANCE_CM,
            camera_index: 0,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

impl Settings {
    pub fn distance_params(&self) -> DistanceParams {
        DistanceParams {
            real_eye_distance_cm: self.real_eye_distance_cm,
            focal_length_px: self.focal_length_px,
        }
    }
}

/// Confirmation shown after the settings window saves.
pub fn settings_saved_message(settings: &Settings) -> String {
    format!(
        "Settings saved successfully!\n\nMonitoring Interval: {} seconds\nAlert Cooldown: {} seconds",
        settings.monitoring_interval_secs, settings.alert_cooldown_secs
    )
}

/// Text the settings window edits before it is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsForm {
    pub interval: String,
    pub cooldown: String,
    pub manual_brightness: String,
    pub focal_length: String,
}

impl SettingsForm {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.monitoring_interval_secs.to_string(),
            cooldown: settings.alert_cooldown_secs.to_string(),
            manual_brightness: settings
                .manual_brightness
                .map(|b| b.to_string())
                .unwrap_or_default(),
            focal_length: settings.focal_length_px.to_string(),
        }
    }

    /// Validates the form and applies it on top of `current`.
    pub fn apply(&self, current: &Settings) -> Result<Settings, String> {
        let interval = parse_digits(&self.interval)
            .ok_or_else(|| "Monitoring interval must be a positive number.".to_string())?;
        if interval < MIN_MONITORING_INTERVAL_SECS {
            return Err("Monitoring interval must be at least 1 second.".to_string());
        }

        let cooldown = parse_digits(&self.cooldown)
            .ok_or_else(|| "Alert cooldown must be a positive number.".to_string())?;

        let manual_brightness = match self.manual_brightness.trim() {
            "" => None,
            text => match parse_digits(text) {
                Some(value) if value <= 100 => Some(value as u8),
                _ => return Err("Manual brightness must be between 0 and 100.".to_string()),
            },
        };

        let focal_length = self
            .focal_length
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0)
            .ok_or_else(|| "Focal length must be a positive number.".to_string())?;

        Ok(Settings {
            monitoring_interval_secs: interval,
            alert_cooldown_secs: cooldown,
            manual_brightness,
            focal_length_px: focal_length,
            ..current.clone()
        })
    }
}

/// Accepts only plain decimal digits, so signs and fractions are rejected.
fn parse_digits(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
