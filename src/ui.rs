// src/ui.rs
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use chrono::Local;
use crossbeam_channel::{Receiver, TryRecvError};
use egui::{Align, Color32, ImageData, Layout, RichText, TextureHandle, TextureOptions, Vec2};
use log::{debug, error, info, warn};

use crate::{
    brightness::{self, SystemBrightness},
    camera,
    distance::{self, DistanceThreadMsg},
    exposure::RiskLevel,
    history::{ExposureLog, TIMESTAMP_FORMAT},
    monitor::{Alert, ExposureSnapshot, Monitor},
    settings::{settings_saved_message, Settings},
};

mod alerts;
mod history_window;
mod settings_window;

use history_window::HistoryWindow;
use settings_window::{SettingsAction, SettingsWindow};

// --- Channel capacities ---
const FRAME_QUEUE: usize = 2;
const READING_QUEUE: usize = 4;
const BRIGHTNESS_QUEUE: usize = 4;

const BRIGHTNESS_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Keeps the status bar clock ticking between monitoring cycles.
const CLOCK_REPAINT_INTERVAL: Duration = Duration::from_secs(1);
/// Closer than this is flagged on the dashboard.
const SAFE_DISTANCE_CM: f64 = 50.0;

// --- Palette ---
const HEADER_BG: Color32 = Color32::from_rgb(0x2c, 0x3e, 0x50);
const STATUS_BG: Color32 = Color32::from_rgb(0x34, 0x49, 0x5e);
const TEXT_DARK: Color32 = Color32::from_rgb(0x2c, 0x3e, 0x50);
const TEXT_MUTED: Color32 = Color32::from_rgb(0x95, 0xa5, 0xa6);
const ALERT_RED: Color32 = Color32::from_rgb(0xe7, 0x4c, 0x3c);
const BRIGHTNESS_ORANGE: Color32 = Color32::from_rgb(0xf3, 0x9c, 0x12);
const BLUE_PURPLE: Color32 = Color32::from_rgb(0x9b, 0x59, 0xb6);

/// Foreground and background colours of a risk badge.
pub(crate) fn risk_colors(risk: Option<RiskLevel>) -> (Color32, Color32) {
    match risk {
        Some(RiskLevel::Low) => (Color32::from_rgb(0x27, 0xae, 0x60), Color32::from_rgb(0xd5, 0xf4, 0xe6)),
        Some(RiskLevel::Moderate) => (Color32::from_rgb(0xf3, 0x9c, 0x12), Color32::from_rgb(0xfe, 0xf5, 0xe7)),
        Some(RiskLevel::High) => (ALERT_RED, Color32::from_rgb(0xfa, 0xdb, 0xd8)),
        None => (TEXT_MUTED, Color32::from_rgb(0xec, 0xf0, 0xf1)),
    }
}

/// Status bar text for the latest cycle.
pub(crate) fn status_text(snapshot: Option<&ExposureSnapshot>) -> &'static str {
    match snapshot {
        None => "System Initializing...",
        Some(s) if s.distance_cm.is_some() && s.brightness_detected => "✓ Monitoring Active",
        Some(s) if s.distance_cm.is_none() => {
            "⚠ Face not detected - Position yourself in front of camera"
        }
        Some(_) => "⚠ Some sensors unavailable",
    }
}

/// Eye distance of the latest reading, or `None` once it is older than `max_age`.
pub(crate) fn fresh_pixel_distance(
    pixel_distance: Option<f64>,
    received_at: Option<Instant>,
    now: Instant,
    max_age: Duration,
) -> Option<f64> {
    let received_at = received_at?;
    if now.saturating_duration_since(received_at) > max_age {
        return None;
    }
    pixel_distance
}

/// The first cycle waits for a face reading or one full interval, whichever comes first.
pub(crate) fn cycle_due(now: Instant, next_cycle: Instant, first_cycle_done: bool, has_reading: bool) -> bool {
    now >= next_cycle || (!first_cycle_done && has_reading)
}

/// A background thread with its stop flag.
struct Worker {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
}

impl Worker {
    fn stop_and_join(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => info!("{} thread joined successfully.", self.name),
                Err(e) => error!("Error joining {} thread: {:?}", self.name, e),
            }
        }
    }
}

pub struct ExposureMonitorApp {
    settings: Settings,
    monitor: Monitor,
    log: Option<ExposureLog>,

    workers: Vec<Worker>,
    distance_rx: Receiver<DistanceThreadMsg>,
    brightness_rx: Receiver<Option<u8>>,

    // --- Latest sensor state ---
    pixel_distance: Option<f64>,
    reading_received_at: Option<Instant>,
    detected_brightness: Option<u8>,
    vision_error: Option<String>,
    log_error: Option<String>,

    snapshot: Option<ExposureSnapshot>,
    next_cycle: Instant,
    pending_alerts: Vec<Alert>,
    notice: Option<String>,

    texture: Option<TextureHandle>,
    texture_size: Option<Vec2>,

    settings_window: Option<SettingsWindow>,
    history_window: Option<HistoryWindow>,
}

impl ExposureMonitorApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        info!("Initializing ExposureMonitorApp");
        let settings: Settings = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();
        debug!("Loaded settings: {:?}", settings);

        let now = Instant::now();
        let monitor = Monitor::new(now, settings.monitoring_interval_secs, settings.alert_cooldown_secs);
        let first_cycle = now + monitor.monitoring_interval();

        let (log, log_error) = match ExposureLog::open(&settings.log_path) {
            Ok(log) => (Some(log), None),
            Err(e) => {
                error!("Exposure log unavailable: {:#}", e);
                (None, Some(format!("Logging disabled: {}", e)))
            }
        };

        // Camera -> Distance
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE);
        // Distance -> UI
        let (distance_tx, distance_rx) = crossbeam_channel::bounded(READING_QUEUE);
        // Brightness -> UI
        let (brightness_tx, brightness_rx) = crossbeam_channel::bounded(BRIGHTNESS_QUEUE);

        let cam_stop = Arc::new(AtomicBool::new(false));
        let cam_handle = camera::start_camera_thread(settings.camera_index, frame_tx, cam_stop.clone());

        let distance_stop = Arc::new(AtomicBool::new(false));
        let distance_handle = distance::start_distance_thread(
            distance_tx,
            frame_rx,
            distance_stop.clone(),
            cc.egui_ctx.clone(),
            settings.model_path.clone(),
        );

        let brightness_stop = Arc::new(AtomicBool::new(false));
        let brightness_handle = brightness::start_brightness_thread(
            SystemBrightness,
            brightness_tx,
            brightness_stop.clone(),
            cc.egui_ctx.clone(),
            BRIGHTNESS_POLL_INTERVAL,
        );

        let workers = vec![
            Worker { name: "Camera", handle: Some(cam_handle), stop_signal: cam_stop },
            Worker { name: "Distance", handle: Some(distance_handle), stop_signal: distance_stop },
            Worker { name: "Brightness", handle: Some(brightness_handle), stop_signal: brightness_stop },
        ];

        Self {
            settings,
            monitor,
            log,
            workers,
            distance_rx,
            brightness_rx,
            pixel_distance: None,
            reading_received_at: None,
            detected_brightness: None,
            vision_error: None,
            log_error,
            snapshot: None,
            next_cycle: first_cycle,
            pending_alerts: Vec::new(),
            notice: None,
            texture: None,
            texture_size: None,
            settings_window: None,
            history_window: None,
        }
    }

    fn distance_cm(&self, now: Instant) -> Option<f64> {
        fresh_pixel_distance(
            self.pixel_distance,
            self.reading_received_at,
            now,
            self.monitor.monitoring_interval(),
        )
        .and_then(|px| distance::estimate_distance_cm(px, &self.settings.distance_params()))
    }

    fn brightness(&self) -> Option<u8> {
        self.settings.manual_brightness.or(self.detected_brightness)
    }

    fn drain_channels(&mut self, ctx: &egui::Context) {
        loop {
            match self.distance_rx.try_recv() {
                Ok(DistanceThreadMsg::Reading(reading)) => {
                    self.vision_error = None;
                    self.pixel_distance = reading.pixel_distance;
                    self.reading_received_at = Some(Instant::now());
                    self.update_texture(ctx, reading.preview);
                }
                Ok(DistanceThreadMsg::Error(err)) => {
                    self.pixel_distance = None;
                    self.vision_error = Some(err);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.vision_error.is_none() {
                        error!("Distance thread disconnected!");
                        self.vision_error = Some("Distance thread disconnected unexpectedly.".to_string());
                    }
                    self.pixel_distance = None;
                    break;
                }
            }
        }

        while let Ok(reading) = self.brightness_rx.try_recv() {
            self.detected_brightness = reading;
        }
    }

    fn update_texture(&mut self, ctx: &egui::Context, frame: Arc<egui::ColorImage>) {
        let size = frame.size;
        let frame_size = Vec2::new(size[0] as f32, size[1] as f32);
        match self.texture {
            Some(ref mut texture) => {
                if self.texture_size != Some(frame_size) {
                    debug!("Texture size changed to: {:?}", frame_size);
                    self.texture_size = Some(frame_size);
                }
                texture.set(ImageData::Color(frame), TextureOptions::LINEAR);
            }
            None => {
                info!("Creating preview texture with size: {:?}", size);
                self.texture = Some(ctx.load_texture("webcam_preview", ImageData::Color(frame), TextureOptions::LINEAR));
                self.texture_size = Some(frame_size);
            }
        }
    }

    /// One monitoring cycle: score the latest readings, log them and queue alerts.
    fn run_cycle(&mut self, now: Instant) {
        let outcome = self.monitor.cycle(now, self.distance_cm(now), self.brightness());

        if let Some(log) = &self.log {
            match log.append(&outcome.snapshot.to_record(Local::now())) {
                Ok(()) => self.log_error = None,
                Err(e) => {
                    error!("Error logging data: {:#}", e);
                    self.log_error = Some(format!("Error logging data: {}", e));
                }
            }
        }

        for alert in &outcome.alerts {
            warn!("{}: {}", alert.title, alert.message);
        }
        self.pending_alerts.extend(outcome.alerts);
        self.snapshot = Some(outcome.snapshot);
    }

    fn apply_settings(&mut self, settings: Settings) {
        info!("Applying settings: {:?}", settings);
        self.monitor.set_monitoring_interval(settings.monitoring_interval_secs);
        self.monitor.set_alert_cooldown(settings.alert_cooldown_secs);
        if settings.camera_index != self.settings.camera_index || settings.model_path != self.settings.model_path {
            info!("Camera or model changes take effect after restart.");
        }
        self.next_cycle = Instant::now() + self.monitor.monitoring_interval();
        self.settings = settings;
    }

    fn header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::default().fill(HEADER_BG).inner_margin(12.0))
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new("Digital Skin Exposure Monitor").size(22.0).strong().color(Color32::WHITE));
                    ui.label(
                        RichText::new("AI-Driven Blue Light & Thermal Exposure Tracking")
                            .color(Color32::from_rgb(0xec, 0xf0, 0xf1)),
                    );
                    ui.add_space(6.0);
                    ui.horizontal(|ui| {
                        // Roughly center the three buttons.
                        ui.add_space((ui.available_width() - 300.0).max(0.0) / 2.0);
                        if ui.button("View History").clicked() {
                            self.history_window = Some(HistoryWindow::open(self.settings.log_path.clone()));
                        }
                        if ui.button("Settings").clicked() {
                            self.settings_window = Some(SettingsWindow::new(&self.settings));
                        }
                        if ui.button("Reset Session").clicked() {
                            self.monitor.reset_session(Instant::now());
                            self.next_cycle = Instant::now();
                        }
                        egui::widgets::global_theme_preference_buttons(ui);
                    });
                });
            });
    }

    fn status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar")
            .resizable(false)
            .frame(egui::Frame::default().fill(STATUS_BG).inner_margin(8.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(status_text(self.snapshot.as_ref())).color(Color32::WHITE));
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(RichText::new(Local::now().format(TIMESTAMP_FORMAT).to_string()).color(Color32::WHITE));
                    });
                });
            });
    }

    fn metrics(&self, ui: &mut egui::Ui) {
        let snapshot = self.snapshot.as_ref();
        ui.group(|ui| {
            ui.label(RichText::new("Current Metrics").strong().size(15.0).color(TEXT_DARK));
            egui::Grid::new("metrics_grid")
                .num_columns(3)
                .spacing([20.0, 12.0])
                .show(ui, |ui| {
                    ui.label("Distance from Screen:");
                    match snapshot.and_then(|s| s.distance_cm) {
                        Some(d) => {
                            let color = if d >= SAFE_DISTANCE_CM { TEXT_DARK } else { ALERT_RED };
                            value_label(ui, format!("{:.1}", d), color);
                        }
                        None if snapshot.is_some() => value_label(ui, "No face detected".to_string(), ALERT_RED),
                        None => value_label(ui, "--".to_string(), TEXT_DARK),
                    }
                    ui.label("cm");
                    ui.end_row();

                    ui.label("Screen Brightness:");
                    match snapshot {
                        Some(s) if s.brightness_detected => value_label(ui, s.brightness.to_string(), BRIGHTNESS_ORANGE),
                        Some(_) => value_label(ui, "N/A".to_string(), TEXT_MUTED),
                        None => value_label(ui, "--".to_string(), BRIGHTNESS_ORANGE),
                    }
                    ui.label("%");
                    ui.end_row();

                    ui.label("Session Duration:");
                    let minutes = snapshot.map_or_else(|| "--".to_string(), |s| s.duration_min.to_string());
                    value_label(ui, minutes, TEXT_MUTED);
                    ui.label("min");
                    ui.end_row();
                });
        });
    }

    fn scores(&self, ui: &mut egui::Ui) {
        let snapshot = self.snapshot.as_ref();
        ui.group(|ui| {
            ui.label(RichText::new("Exposure Scores & Risk Assessment").strong().size(15.0).color(TEXT_DARK));
            egui::Grid::new("scores_grid")
                .num_columns(3)
                .spacing([20.0, 12.0])
                .show(ui, |ui| {
                    ui.label("Blue Light Exposure:");
                    score_label(ui, snapshot.map(|s| s.blue_score), BLUE_PURPLE);
                    risk_badge(ui, snapshot.map(|s| s.blue_risk));
                    ui.end_row();

                    ui.label("Thermal Exposure:");
                    score_label(ui, snapshot.map(|s| s.thermal_score), ALERT_RED);
                    risk_badge(ui, snapshot.map(|s| s.thermal_risk));
                    ui.end_row();
                });
        });
    }

    fn preview(&self, ui: &mut egui::Ui) {
        if let Some(err) = &self.vision_error {
            ui.colored_label(Color32::YELLOW, format!("Camera Status: {}", err));
        }
        if let Some(err) = &self.log_error {
            ui.colored_label(Color32::RED, err);
        }

        match (&self.texture, self.texture_size) {
            (Some(texture), Some(tex_size)) => {
                let aspect_ratio = if tex_size.y > 0.0 { tex_size.x / tex_size.y } else { 1.0 };
                let mut width = ui.available_width();
                let mut height = width / aspect_ratio;
                if height > ui.available_height() {
                    height = ui.available_height();
                    width = height * aspect_ratio;
                }
                ui.with_layout(Layout::top_down(Align::Center), |ui| {
                    ui.add(
                        egui::Image::new(texture)
                            .max_width(width)
                            .max_height(height)
                            .maintain_aspect_ratio(true),
                    );
                });
            }
            _ if self.vision_error.is_none() => {
                ui.with_layout(Layout::top_down(Align::Center), |ui| {
                    ui.add_space(ui.available_height() / 4.0);
                    ui.spinner();
                    ui.label("Initializing camera stream...");
                });
            }
            _ => {}
        }
    }
}

fn value_label(ui: &mut egui::Ui, text: String, color: Color32) {
    ui.label(RichText::new(text).strong().size(16.0).color(color));
}

fn score_label(ui: &mut egui::Ui, score: Option<f64>, color: Color32) {
    let text = score.map_or_else(|| "--".to_string(), |s| format!("{:.1}", s));
    value_label(ui, text, color);
}

fn risk_badge(ui: &mut egui::Ui, risk: Option<RiskLevel>) {
    let (fg, bg) = risk_colors(risk);
    let text = risk.map_or("--", RiskLevel::as_str);
    egui::Frame::default().fill(bg).inner_margin(4.0).show(ui, |ui| {
        ui.label(RichText::new(text).strong().color(fg));
    });
}

impl eframe::App for ExposureMonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_channels(ctx);

        let now = Instant::now();
        let has_reading = self.reading_received_at.is_some();
        if cycle_due(now, self.next_cycle, self.snapshot.is_some(), has_reading) {
            self.run_cycle(now);
            self.next_cycle = now + self.monitor.monitoring_interval();
        }

        self.header(ctx);
        self.status_bar(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                self.metrics(&mut columns[0]);
                columns[0].add_space(16.0);
                self.scores(&mut columns[0]);
                self.preview(&mut columns[1]);
            });
        });

        let current_pixels = fresh_pixel_distance(
            self.pixel_distance,
            self.reading_received_at,
            Instant::now(),
            self.monitor.monitoring_interval(),
        );
        let settings_action = self
            .settings_window
            .as_mut()
            .map(|window| window.show(ctx, &self.settings, current_pixels));
        match settings_action {
            Some(SettingsAction::Close) => self.settings_window = None,
            Some(SettingsAction::Save(settings)) => {
                self.notice = Some(settings_saved_message(&settings));
                self.apply_settings(settings);
                self.settings_window = None;
            }
            Some(SettingsAction::Keep) | None => {}
        }
        if let Some(window) = &mut self.history_window {
            if !window.show(ctx) {
                self.history_window = None;
            }
        }
        alerts::show_alerts(ctx, &mut self.pending_alerts);
        alerts::show_notice(ctx, &mut self.notice);

        let until_cycle = self.next_cycle.saturating_duration_since(Instant::now());
        ctx.request_repaint_after(until_cycle.min(CLOCK_REPAINT_INTERVAL));
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.settings);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Exit requested. Stopping threads...");
        for worker in &self.workers {
            worker.stop_signal.store(true, Ordering::Relaxed);
        }
        for worker in &mut self.workers {
            worker.stop_and_join();
        }
    }
}
