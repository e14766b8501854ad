//! Integration tests for the monitoring pipeline: readings in, scores, alerts and log rows out.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::Local;
use exposure_monitor::{
    brightness::{self, BrightnessError, BrightnessSource},
    distance::{self, DistanceParams},
    exposure::{ExposureKind, RiskLevel},
    face_mesh::FaceMeshDetector,
    history::{self, ExposureLog},
    monitor::Monitor,
    settings::{Settings, SettingsForm},
};

const MINUTE: Duration = Duration::from_secs(60);

struct FixedBrightness(Option<u8>);

impl BrightnessSource for FixedBrightness {
    fn read(&self) -> Result<u8, BrightnessError> {
        self.0.ok_or(BrightnessError::NoBacklight)
    }
}

/// A session that drifts closer to the screen ends up logged and alerted.
#[test]
fn test_session_logs_every_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let log = ExposureLog::open(dir.path().join("data/exposure_log.csv")).unwrap();
    let params = DistanceParams::default();

    let start = Instant::now();
    let mut monitor = Monitor::new(start, 5, 300);
    let mut alerts = Vec::new();

    // Eye distances in pixels: far, no face, then very close.
    let readings = [(1, Some(65.0)), (2, None), (40, Some(2047.5))];
    for (minute, pixel_distance) in readings {
        let distance_cm = pixel_distance.and_then(|px| distance::estimate_distance_cm(px, &params));
        let outcome = monitor.cycle(start + MINUTE * minute, distance_cm, Some(80));
        log.append(&outcome.snapshot.to_record(Local::now())).unwrap();
        alerts.extend(outcome.alerts);
    }

    let rows = history::load_history(log.path()).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].distance_cm, "63.0");
    assert_eq!(rows[0].brightness, "80");
    assert_eq!(rows[1].distance_cm, "N/A");
    assert_eq!(rows[1].blue_score, "0.0");
    // 6.3 * 650 / 2047.5 = 2.0 cm; thermal 40 / 2 * 3 = 60.
    assert_eq!(rows[2].distance_cm, "2.0");
    assert_eq!(rows[2].thermal_risk, "MODERATE");
    assert_eq!(rows[2].blue_risk, "HIGH");
    assert_eq!(rows[2].worst_risk(), Some(RiskLevel::High));

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, ExposureKind::BlueLight);
    assert_eq!(alerts[0].title, "High Blue Light Exposure");
}

/// Calibrating at the reference distance makes the next estimate land on it.
#[test]
fn test_calibrated_settings_feed_distance() {
    let settings = Settings::default();
    let focal = distance::calibrate_focal_length(70.0, distance::CALIBRATION_DISTANCE_CM, settings.real_eye_distance_cm)
        .unwrap();

    let mut form = SettingsForm::from_settings(&settings);
    form.focal_length = focal.to_string();
    let updated = form.apply(&settings).unwrap();

    let estimate = distance::estimate_distance_cm(70.0, &updated.distance_params()).unwrap();
    assert!((estimate - distance::CALIBRATION_DISTANCE_CM).abs() < 0.05, "got {estimate}");
}

/// The polling thread forwards readings and reports failures as `None`.
#[test]
fn test_brightness_thread_forwards_readings() {
    for (source, expected) in [(FixedBrightness(Some(42)), Some(42)), (FixedBrightness(None), None)] {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = brightness::start_brightness_thread(
            source,
            tx,
            stop.clone(),
            egui::Context::default(),
            Duration::from_millis(20),
        );

        let reading = rx.recv_timeout(Duration::from_secs(5)).expect("no brightness reading");
        assert_eq!(reading, expected);

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}

/// The polling thread exits once the receiving side is gone.
#[test]
fn test_brightness_thread_stops_without_receiver() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    drop(rx);
    let handle = brightness::start_brightness_thread(
        FixedBrightness(Some(10)),
        tx,
        Arc::new(AtomicBool::new(false)),
        egui::Context::default(),
        Duration::from_millis(10),
    );
    handle.join().unwrap();
}

#[test]
fn test_missing_model_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(FaceMeshDetector::new(dir.path().join("absent.onnx"), 0.5).is_err());
}

#[test]
#[ignore = "Requires the face mesh ONNX model and the ONNX Runtime library"]
fn test_blank_frame_has_no_face() {
    let mut detector = FaceMeshDetector::new(Settings::default().model_path, 0.5).unwrap();
    let frame = image::RgbImage::new(640, 480);
    assert!(detector.detect(&frame).unwrap().is_none());
}
