// src/camera.rs
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Sender, TrySendError};
use image::RgbImage;
use log::{debug, error, info, warn};
use nokhwa::{
    pixel_format::{RgbFormat, YuyvFormat},
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
    Camera, NokhwaError,
};

// --- Constants ---
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
/// Distance only needs a handful of frames per second.
const REQUESTED_FPS: u32 = 15;
const TIMEOUT_BACKOFF: Duration = Duration::from_millis(100);
const DECODE_BACKOFF: Duration = Duration::from_millis(50);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum CameraThreadMsg {
    Frame(Arc<RgbImage>),
    Error(String),
}

pub fn start_camera_thread(
    camera_index: u32,
    frame_sender: Sender<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
) -> JoinHandle<()> {
    info!("Spawning camera capture thread for camera {}.", camera_index);
    thread::spawn(move || {
        camera_capture_loop(CameraIndex::Index(camera_index), frame_sender, stop_signal);
    })
}

fn open_camera(index: CameraIndex) -> Result<Camera, NokhwaError> {
    let requested_resolution = Resolution::new(REQUESTED_WIDTH, REQUESTED_HEIGHT);
    let requested_cam_format =
        CameraFormat::new(requested_resolution, FrameFormat::YUYV, REQUESTED_FPS);
    let requested_format =
        RequestedFormat::new::<YuyvFormat>(RequestedFormatType::Closest(requested_cam_format));
    info!("Requested camera format: {:?}", requested_format);

    Camera::new(index.clone(), requested_format).or_else(|err| {
        warn!(
            "Default backend failed: {}. Trying AVFoundation explicitly...",
            err
        );
        Camera::with_backend(index, requested_format, ApiBackend::AVFoundation)
    })
}

fn camera_capture_loop(
    index: CameraIndex,
    frame_sender: Sender<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
) {
    let mut camera = match open_camera(index) {
        Ok(cam) => {
            info!("Camera initialized: {}", cam.info().human_name());
            cam
        }
        Err(err) => {
            let error_msg = format!("Could not open webcam: {}", err);
            error!("{}", error_msg);
            let _ = frame_sender.send(CameraThreadMsg::Error(error_msg));
            return;
        }
    };
    info!("Actual camera format received: {:?}", camera.camera_format());

    if let Err(err) = camera.open_stream() {
        let error_msg = format!("Failed to open stream: {}", err);
        error!("{}", error_msg);
        let _ = frame_sender.send(CameraThreadMsg::Error(error_msg));
        return;
    }
    info!("Camera stream opened successfully.");

    while !stop_signal.load(Ordering::Relaxed) {
        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(NokhwaError::ReadFrameError(msg)) if msg.contains("Timeout") => {
                warn!("Camera frame read timeout.");
                thread::sleep(TIMEOUT_BACKOFF);
                continue;
            }
            Err(err) => {
                let error_msg = format!("Failed to capture frame: {}", err);
                error!("{}", error_msg);
                if frame_sender.send(CameraThreadMsg::Error(error_msg)).is_err() {
                    info!("Distance thread receiver disconnected after capture error.");
                    break;
                }
                thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };

        let decoded: RgbImage = match frame.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(err) => {
                warn!("Failed to decode frame to RGB: {}", err);
                thread::sleep(DECODE_BACKOFF);
                continue;
            }
        };

        // The distance thread only uses the newest frame, so a full queue just drops this one.
        match frame_sender.try_send(CameraThreadMsg::Frame(Arc::new(decoded))) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => debug!("Frame queue full, dropping frame."),
            Err(TrySendError::Disconnected(_)) => {
                info!("Distance thread receiver disconnected. Stopping camera loop.");
                break;
            }
        }
    }

    info!("Camera capture loop stopping.");
    if let Err(e) = camera.stop_stream() {
        error!("Failed to stop camera stream cleanly: {}", e);
    }
    info!("Camera capture loop finished.");
}
