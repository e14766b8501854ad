// src/history.rs
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::exposure::RiskLevel;

pub const DEFAULT_LOG_PATH: &str = "data/exposure_log.csv";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const NOT_AVAILABLE: &str = "N/A";

pub const HEADER: [&str; 7] = [
    "DateTime",
    "Distance_cm",
    "Brightness",
    "BlueLightScore",
    "ThermalScore",
    "BlueRisk",
    "ThermalRisk",
];

/// One monitoring cycle as written to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureRecord {
    pub timestamp: DateTime<Local>,
    pub distance_cm: Option<f64>,
    pub brightness: u8,
    pub blue_score: f64,
    pub thermal_score: f64,
    pub blue_risk: RiskLevel,
    pub thermal_risk: RiskLevel,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "DateTime")]
    date_time: String,
    #[serde(rename = "Distance_cm")]
    distance_cm: String,
    #[serde(rename = "Brightness")]
    brightness: u8,
    #[serde(rename = "BlueLightScore")]
    blue_score: f64,
    #[serde(rename = "ThermalScore")]
    thermal_score: f64,
    #[serde(rename = "BlueRisk")]
    blue_risk: &'a str,
    #[serde(rename = "ThermalRisk")]
    thermal_risk: &'a str,
}

impl<'a> From<&'a ExposureRecord> for CsvRow<'a> {
    fn from(record: &'a ExposureRecord) -> Self {
        Self {
            date_time: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            distance_cm: record
                .distance_cm
                .map_or_else(|| NOT_AVAILABLE.to_string(), format_float),
            brightness: record.brightness,
            blue_score: record.blue_score,
            thermal_score: record.thermal_score,
            blue_risk: record.blue_risk.as_str(),
            thermal_risk: record.thermal_risk.as_str(),
        }
    }
}

/// A log row as shown in the history viewer. Every field is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryRow {
    #[serde(rename = "DateTime", default = "not_available")]
    pub date_time: String,
    #[serde(rename = "Distance_cm", default = "not_available")]
    pub distance_cm: String,
    #[serde(rename = "Brightness", default = "not_available")]
    pub brightness: String,
    #[serde(rename = "BlueLightScore", default = "not_available")]
    pub blue_score: String,
    #[serde(rename = "ThermalScore", default = "not_available")]
    pub thermal_score: String,
    #[serde(rename = "BlueRisk", default = "not_available")]
    pub blue_risk: String,
    #[serde(rename = "ThermalRisk", default = "not_available")]
    pub thermal_risk: String,
}

/// Keeps the fractional part on whole numbers ("63.0"), like the score columns.
fn format_float(value: f64) -> String {
    format!("{:?}", value)
}

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

impl HistoryRow {
    /// Highest risk among the two channels, if either parses.
    pub fn worst_risk(&self) -> Option<RiskLevel> {
        let blue = self.blue_risk.parse::<RiskLevel>().ok();
        let thermal = self.thermal_risk.parse::<RiskLevel>().ok();
        [blue, thermal].into_iter().flatten().max()
    }
}

/// Append-only CSV log of monitoring cycles.
#[derive(Debug, Clone)]
pub struct ExposureLog {
    path: PathBuf,
}

impl ExposureLog {
    /// Creates the parent directory and writes the header if the file is new.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            writer.write_record(HEADER)?;
            writer.flush()?;
            info!("Created exposure log at {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ExposureRecord) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log file {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(CsvRow::from(record))?;
        writer.flush()?;
        debug!("Logged exposure record to {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<HistoryRow>> {
        load_history(&self.path)
    }
}

/// Reads every row of the log. A missing file is an empty history; unreadable rows are skipped.
pub fn load_history(path: &Path) -> Result<Vec<HistoryRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<HistoryRow>() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping malformed row in {}: {}", path.display(), e),
        }
    }
    Ok(rows)
}
