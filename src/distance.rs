// src/distance.rs
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use egui::ColorImage;
use image::{Rgb, RgbImage};
use imageproc::drawing;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    camera::CameraThreadMsg,
    face_mesh::{FaceLandmarks, FaceMeshDetector},
};

// --- Physical constants ---
/// Average human inter-pupillary distance.
pub const REAL_EYE_DISTANCE_CM: f64 = 6.3;
/// Focal length used until the user calibrates their webcam.
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 650.0;
/// Distance the user sits at while calibrating.
pub const CALIBRATION_DISTANCE_CM: f64 = 50.0;

/// Face mesh indices of the inner eye corners.
pub const LEFT_EYE_INDEX: usize = 133;
pub const RIGHT_EYE_INDEX: usize = 362;

pub const DEFAULT_MIN_FACE_CONFIDENCE: f32 = 0.5;

const EYE_MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const EYE_MARKER_RADIUS: i32 = 4;

/// Pinhole camera parameters used to turn eye pixel distance into centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceParams {
    pub real_eye_distance_cm: f64,
    pub focal_length_px: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            real_eye_distance_cm: REAL_EYE_DISTANCE_CM,
            focal_length_px: DEFAULT_FOCAL_LENGTH_PX,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn truncate_point((x, y): (f32, f32)) -> (i64, i64) {
    (x as i64, y as i64)
}

/// Euclidean distance between the two eye landmarks, on whole-pixel positions.
pub fn eye_pixel_distance(landmarks: &FaceLandmarks) -> Option<f64> {
    let (x1, y1) = truncate_point(landmarks.point(LEFT_EYE_INDEX)?);
    let (x2, y2) = truncate_point(landmarks.point(RIGHT_EYE_INDEX)?);
    let (dx, dy) = ((x2 - x1) as f64, (y2 - y1) as f64);
    Some(dx.hypot(dy))
}

/// `real_size * focal_length / pixel_size`, rounded to 2 decimals.
pub fn estimate_distance_cm(pixel_distance: f64, params: &DistanceParams) -> Option<f64> {
    if !pixel_distance.is_finite() || pixel_distance <= 0.0 {
        return None;
    }
    Some(round2(params.real_eye_distance_cm * params.focal_length_px / pixel_distance))
}

/// Focal length that makes `pixel_distance` map back to `known_distance_cm`.
pub fn calibrate_focal_length(pixel_distance: f64, known_distance_cm: f64, real_eye_distance_cm: f64) -> Option<f64> {
    if pixel_distance <= 0.0 || known_distance_cm <= 0.0 || real_eye_distance_cm <= 0.0 {
        return None;
    }
    Some(round2(pixel_distance * known_distance_cm / real_eye_distance_cm))
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FaceReading {
    /// `None` when no face was found in the frame.
    pub pixel_distance: Option<f64>,
    /// Frame with the eye landmarks drawn on it.
    pub preview: Arc<ColorImage>,
}

#[derive(Debug)]
pub enum DistanceThreadMsg {
    Reading(FaceReading),
    Error(String),
}

pub fn start_distance_thread(
    ui_sender: Sender<DistanceThreadMsg>,
    camera_receiver: Receiver<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
    ctx: egui::Context,
    model_path: PathBuf,
) -> JoinHandle<()> {
    info!("Spawning distance estimation thread");
    thread::spawn(move || {
        distance_loop(ui_sender, camera_receiver, stop_signal, ctx, model_path);
    })
}

fn distance_loop(
    ui_sender: Sender<DistanceThreadMsg>,
    camera_receiver: Receiver<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
    ctx: egui::Context,
    model_path: PathBuf,
) {
    info!("Distance estimation loop started.");

    let mut detector = match FaceMeshDetector::new(&model_path, DEFAULT_MIN_FACE_CONFIDENCE) {
        Ok(d) => d,
        Err(e) => {
            let error_msg = format!("Failed to load face mesh model: {:#}", e);
            error!("{}", error_msg);
            send_error(&ui_sender, &ctx, error_msg);
            return;
        }
    };

    while !stop_signal.load(Ordering::Relaxed) {
        // Drain the channel, keeping only the newest frame.
        let mut latest_frame: Option<Arc<RgbImage>> = None;
        loop {
            match camera_receiver.try_recv() {
                Ok(CameraThreadMsg::Frame(frame)) => latest_frame = Some(frame),
                Ok(CameraThreadMsg::Error(err)) => {
                    warn!("Received error from camera thread: {}", err);
                    send_error(&ui_sender, &ctx, format!("Camera Error: {}", err));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    error!("Camera thread disconnected. Stopping distance loop.");
                    send_error(&ui_sender, &ctx, "Camera thread disconnected.".to_string());
                    stop_signal.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
        if stop_signal.load(Ordering::Relaxed) {
            break;
        }

        let Some(frame) = latest_frame else {
            thread::sleep(Duration::from_millis(5));
            continue;
        };

        let started = Instant::now();
        let landmarks = match detector.detect(&frame) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                warn!("Face mesh inference failed: {:#}", e);
                send_error(&ui_sender, &ctx, format!("Face detection failed: {}", e));
                None
            }
        };

        let reading = FaceReading {
            pixel_distance: landmarks.as_ref().and_then(eye_pixel_distance).filter(|d| *d > 0.0),
            preview: Arc::new(render_preview(&frame, landmarks.as_ref())),
        };
        debug!(
            "Processed frame in {:?}, eye distance {:?}px",
            started.elapsed(),
            reading.pixel_distance
        );

        match ui_sender.try_send(DistanceThreadMsg::Reading(reading)) {
            Ok(_) => ctx.request_repaint(),
            Err(TrySendError::Full(_)) => warn!("UI channel full. Dropping face reading."),
            Err(TrySendError::Disconnected(_)) => {
                info!("UI receiver disconnected. Stopping distance loop.");
                break;
            }
        }
    }

    info!("Distance estimation loop finishing.");
}

/// Never blocks: the UI thread joins this worker on exit and stops draining the channel.
fn send_error(ui_sender: &Sender<DistanceThreadMsg>, ctx: &egui::Context, message: String) {
    match ui_sender.try_send(DistanceThreadMsg::Error(message)) {
        Ok(()) => ctx.request_repaint(),
        Err(TrySendError::Full(_)) => debug!("UI channel full. Dropping distance error."),
        Err(TrySendError::Disconnected(_)) => debug!("UI receiver gone. Dropping distance error."),
    }
}

/// Copies the frame into an egui image with the two eye landmarks marked.
pub fn render_preview(frame: &RgbImage, landmarks: Option<&FaceLandmarks>) -> ColorImage {
    let mut display = frame.clone();
    let eyes = landmarks.and_then(|l| Some((l.point(LEFT_EYE_INDEX)?, l.point(RIGHT_EYE_INDEX)?)));
    if let Some((left, right)) = eyes {
        for (x, y) in [left, right] {
            drawing::draw_filled_circle_mut(
                &mut display,
                (x as i32, y as i32),
                EYE_MARKER_RADIUS,
                EYE_MARKER_COLOR,
            );
        }
        drawing::draw_line_segment_mut(&mut display, left, right, EYE_MARKER_COLOR);
    }

    let size = [display.width() as usize, display.height() as usize];
    ColorImage::from_rgb(size, display.as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks_with_eyes(left: (f32, f32), right: (f32, f32)) -> FaceLandmarks {
        let mut points = vec![(0.0, 0.0); 468];
        points[LEFT_EYE_INDEX] = left;
        points[RIGHT_EYE_INDEX] = right;
        FaceLandmarks { points, presence: 0.9 }
    }

    #[test]
    fn pixel_distance_truncates_coordinates() {
        let landmarks = landmarks_with_eyes((100.9, 50.2), (165.7, 50.9));
        // (100, 50) -> (165, 50)
        assert_eq!(eye_pixel_distance(&landmarks), Some(65.0));
    }

    #[test]
    fn pixel_distance_needs_both_landmarks() {
        let landmarks = FaceLandmarks { points: vec![(1.0, 1.0); 200], presence: 1.0 };
        assert_eq!(eye_pixel_distance(&landmarks), None);
    }

    #[test]
    fn distance_uses_pinhole_model() {
        let params = DistanceParams::default();
        // 6.3 * 650 / 81.9 = 50.0
        assert_eq!(estimate_distance_cm(81.9, &params), Some(50.0));
        // 6.3 * 650 / 65 = 63.0
        assert_eq!(estimate_distance_cm(65.0, &params), Some(63.0));
    }

    #[test]
    fn distance_is_none_for_zero_pixels() {
        let params = DistanceParams::default();
        assert_eq!(estimate_distance_cm(0.0, &params), None);
        assert_eq!(estimate_distance_cm(f64::INFINITY, &params), None);
    }

    #[test]
    fn calibration_inverts_estimate() {
        let focal = calibrate_focal_length(90.0, CALIBRATION_DISTANCE_CM, REAL_EYE_DISTANCE_CM).unwrap();
        assert_eq!(focal, 714.29);
        let params = DistanceParams { focal_length_px: focal, ..DistanceParams::default() };
        assert_eq!(estimate_distance_cm(90.0, &params), Some(50.0));
        assert_eq!(calibrate_focal_length(0.0, 50.0, 6.3), None);
    }

    #[test]
    fn worker_exits_when_ui_channel_is_full() {
        let (ui_tx, ui_rx) = crossbeam_channel::bounded(1);
        ui_tx.try_send(DistanceThreadMsg::Error("backlog".to_string())).unwrap();
        let (_camera_tx, camera_rx) = crossbeam_channel::bounded::<CameraThreadMsg>(1);
        let stop = Arc::new(AtomicBool::new(true));
        let dir = tempfile::tempdir().unwrap();

        let handle = start_distance_thread(
            ui_tx,
            camera_rx,
            stop,
            egui::Context::default(),
            dir.path().join("missing.onnx"),
        );
        handle.join().unwrap();

        // Only the backlog is left; the load error was dropped instead of blocking.
        assert!(matches!(ui_rx.try_recv(), Ok(DistanceThreadMsg::Error(msg)) if msg == "backlog"));
        assert!(ui_rx.try_recv().is_err());
    }

    #[test]
    fn preview_keeps_frame_size() {
        let frame = RgbImage::new(64, 48);
        let landmarks = landmarks_with_eyes((10.0, 20.0), (40.0, 20.0));
        let preview = render_preview(&frame, Some(&landmarks));
        assert_eq!(preview.size, [64, 48]);
        let marked = preview.pixels[20 * 64 + 10];
        assert_eq!(marked, egui::Color32::from_rgb(0, 255, 0));
    }
}
