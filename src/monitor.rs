// src/monitor.rs
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use log::{debug, info};

use crate::{
    exposure::{self, ExposureKind, RiskLevel, DEFAULT_BRIGHTNESS},
    history::ExposureRecord,
};

pub const DEFAULT_MONITORING_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 300;
pub const MIN_MONITORING_INTERVAL_SECS: u64 = 1;

/// Everything one monitoring cycle measured and derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSnapshot {
    pub distance_cm: Option<f64>,
    pub brightness: u8,
    /// False when `brightness` is the fallback default.
    pub brightness_detected: bool,
    pub blue_score: f64,
    pub thermal_score: f64,
    pub blue_risk: RiskLevel,
    pub thermal_risk: RiskLevel,
    pub duration_min: u64,
}

impl ExposureSnapshot {
    pub fn risk(&self, kind: ExposureKind) -> RiskLevel {
        match kind {
            ExposureKind::BlueLight => self.blue_risk,
            ExposureKind::Thermal => self.thermal_risk,
        }
    }

    pub fn to_record(&self, timestamp: DateTime<Local>) -> ExposureRecord {
        ExposureRecord {
            timestamp,
            distance_cm: self.distance_cm,
            brightness: self.brightness,
            blue_score: self.blue_score,
            thermal_score: self.thermal_score,
            blue_risk: self.blue_risk,
            thermal_risk: self.thermal_risk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: ExposureKind,
    pub title: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub snapshot: ExposureSnapshot,
    pub alerts: Vec<Alert>,
}

/// Session state of the exposure monitor: duration, timing settings and alert throttling.
#[derive(Debug, Clone)]
pub struct Monitor {
    session_start: Instant,
    monitoring_interval: Duration,
    alert_cooldown: Duration,
    last_alerts: HashMap<ExposureKind, Instant>,
}

impl Monitor {
    pub fn new(now: Instant, monitoring_interval_secs: u64, alert_cooldown_secs: u64) -> Self {
        let mut monitor = Self {
            session_start: now,
            monitoring_interval: Duration::from_secs(DEFAULT_MONITORING_INTERVAL_SECS),
            alert_cooldown: Duration::from_secs(DEFAULT_ALERT_COOLDOWN_SECS),
            last_alerts: HashMap::new(),
        };
        monitor.set_monitoring_interval(monitoring_interval_secs);
        monitor.set_alert_cooldown(alert_cooldown_secs);
        monitor
    }

    pub fn monitoring_interval(&self) -> Duration {
        self.monitoring_interval
    }

    pub fn alert_cooldown(&self) -> Duration {
        self.alert_cooldown
    }

    /// Clamped to at least one second.
    pub fn set_monitoring_interval(&mut self, secs: u64) {
        self.monitoring_interval = Duration::from_secs(secs.max(MIN_MONITORING_INTERVAL_SECS));
    }

    pub fn set_alert_cooldown(&mut self, secs: u64) {
        self.alert_cooldown = Duration::from_secs(secs);
    }

    /// Whole minutes elapsed since the session started.
    pub fn session_duration_minutes(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.session_start).as_secs() / 60
    }

    pub fn reset_session(&mut self, now: Instant) {
        info!("Monitoring session reset.");
        self.session_start = now;
        self.last_alerts.clear();
    }

    /// Scores one set of sensor readings and decides which alerts are due.
    pub fn cycle(&mut self, now: Instant, distance_cm: Option<f64>, brightness: Option<u8>) -> CycleOutcome {
        let duration_min = self.session_duration_minutes(now);
        let brightness_value = brightness.unwrap_or(DEFAULT_BRIGHTNESS);

        let blue_score = exposure::blue_light_score(Some(brightness_value), duration_min, distance_cm);
        let thermal_score = exposure::thermal_score(duration_min, distance_cm);

        let snapshot = ExposureSnapshot {
            distance_cm,
            brightness: brightness_value,
            brightness_detected: brightness.is_some(),
            blue_score,
            thermal_score,
            blue_risk: RiskLevel::classify(blue_score),
            thermal_risk: RiskLevel::classify(thermal_score),
            duration_min,
        };
        debug!("Monitoring cycle: {:?}", snapshot);

        let mut alerts = Vec::new();
        for kind in ExposureKind::ALL {
            let risk = snapshot.risk(kind);
            if risk == RiskLevel::High && self.alert_due(kind, now) {
                self.last_alerts.insert(kind, now);
                alerts.push(Alert {
                    kind,
                    title: kind.alert_title(),
                    message: kind.recommendation(risk),
                });
            }
        }

        CycleOutcome { snapshot, alerts }
    }

    fn alert_due(&self, kind: ExposureKind, now: Instant) -> bool {
        self.last_alerts
            .get(&kind)
            .map_or(true, |last| now.saturating_duration_since(*last) > self.alert_cooldown)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(
            Instant::now(),
            DEFAULT_MONITORING_INTERVAL_SECS,
            DEFAULT_ALERT_COOLDOWN_SECS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn duration_counts_whole_minutes() {
        let start = Instant::now();
        let monitor = Monitor::new(start, 5, 300);
        assert_eq!(monitor.session_duration_minutes(start), 0);
        assert_eq!(monitor.session_duration_minutes(start + Duration::from_secs(119)), 1);
        assert_eq!(monitor.session_duration_minutes(start + MINUTE * 10), 10);
    }

    #[test]
    fn interval_is_clamped_to_one_second() {
        let mut monitor = Monitor::new(Instant::now(), 0, 0);
        assert_eq!(monitor.monitoring_interval(), Duration::from_secs(1));
        assert_eq!(monitor.alert_cooldown(), Duration::ZERO);
        monitor.set_monitoring_interval(12);
        assert_eq!(monitor.monitoring_interval(), Duration::from_secs(12));
    }

    #[test]
    fn missing_face_scores_zero() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);
        let outcome = monitor.cycle(start + MINUTE * 30, None, Some(80));
        assert_eq!(outcome.snapshot.blue_score, 0.0);
        assert_eq!(outcome.snapshot.thermal_score, 0.0);
        assert_eq!(outcome.snapshot.blue_risk, RiskLevel::Low);
        assert!(outcome.alerts.is_empty());
    }

    #[test]
    fn unknown_brightness_falls_back_to_default() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);
        let outcome = monitor.cycle(start + MINUTE * 10, Some(10.0), None);
        assert_eq!(outcome.snapshot.brightness, DEFAULT_BRIGHTNESS);
        assert!(!outcome.snapshot.brightness_detected);
        // 60 * 10 / 100 * 0.5 = 3.0
        assert_eq!(outcome.snapshot.blue_score, 3.0);
        // 10 / 10 * 3 = 3.0
        assert_eq!(outcome.snapshot.thermal_score, 3.0);
    }

    #[test]
    fn high_risk_alerts_respect_cooldown() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);

        // Thermal: 30 / 1 * 3 = 90 -> HIGH. Blue: 100 * 30 / 1 * 0.5 -> capped 100 -> HIGH.
        let first = monitor.cycle(start + MINUTE * 30, Some(1.0), Some(100));
        assert_eq!(first.alerts.len(), 2);
        assert_eq!(first.alerts[0].title, "High Blue Light Exposure");
        assert_eq!(first.alerts[1].kind, ExposureKind::Thermal);

        let within = monitor.cycle(start + MINUTE * 34, Some(1.0), Some(100));
        assert!(within.alerts.is_empty());

        let after = monitor.cycle(start + MINUTE * 36, Some(1.0), Some(100));
        assert_eq!(after.alerts.len(), 2);
    }

    #[test]
    fn cooldown_must_be_strictly_exceeded() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);
        let first = start + MINUTE * 30;
        assert_eq!(monitor.cycle(first, Some(1.0), Some(100)).alerts.len(), 2);

        let at_cooldown = monitor.cycle(first + Duration::from_secs(300), Some(1.0), Some(100));
        assert!(at_cooldown.alerts.is_empty());

        let past_cooldown = monitor.cycle(first + Duration::from_secs(301), Some(1.0), Some(100));
        assert_eq!(past_cooldown.alerts.len(), 2);
    }

    #[test]
    fn only_high_channel_alerts() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);
        // Thermal: 25 / 1 * 3 = 75 -> HIGH. Blue: 1 * 25 / 1 * 0.5 = 12.5 -> LOW.
        let outcome = monitor.cycle(start + MINUTE * 25, Some(1.0), Some(1));
        assert_eq!(outcome.snapshot.blue_risk, RiskLevel::Low);
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].kind, ExposureKind::Thermal);
        assert!(outcome.alerts[0].message.starts_with("You are too close"));
    }

    #[test]
    fn reset_restarts_duration_and_alerts() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);
        let later = start + MINUTE * 30;
        assert_eq!(monitor.cycle(later, Some(1.0), Some(100)).alerts.len(), 2);

        monitor.reset_session(later);
        assert_eq!(monitor.session_duration_minutes(later), 0);
        // Duration 0 counts as 0.1 min: thermal 0.1 / 0.001 * 3 -> capped 100.
        let outcome = monitor.cycle(later, Some(0.001), Some(100));
        assert_eq!(outcome.alerts.len(), 2);
    }

    #[test]
    fn snapshot_converts_to_record() {
        let start = Instant::now();
        let mut monitor = Monitor::new(start, 5, 300);
        let snapshot = monitor.cycle(start, Some(60.0), Some(50)).snapshot;
        let record = snapshot.to_record(Local::now());
        assert_eq!(record.distance_cm, Some(60.0));
        assert_eq!(record.brightness, 50);
        assert_eq!(record.blue_risk, snapshot.blue_risk);
    }
}
