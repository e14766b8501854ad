// src/ui/settings_window.rs
use egui::{Color32, RichText};
use log::info;

use crate::{
    distance::{calibrate_focal_length, CALIBRATION_DISTANCE_CM},
    settings::{Settings, SettingsForm},
};

const INFO_TEXT: &str = "This system monitors:
  • Distance from screen (via webcam)
  • Screen brightness (OS-level)
  • Blue light exposure score
  • Thermal exposure score

Risk levels are calculated based on:
  • Exposure duration
  • Screen proximity
  • Screen brightness

Alerts are shown when risk is HIGH.";

pub enum SettingsAction {
    Keep,
    Close,
    Save(Settings),
}

pub struct SettingsWindow {
    form: SettingsForm,
    error: Option<String>,
    calibration_note: Option<String>,
}

impl SettingsWindow {
    pub fn new(settings: &Settings) -> Self {
        Self {
            form: SettingsForm::from_settings(settings),
            error: None,
            calibration_note: None,
        }
    }

    /// Draws the window. `pixel_distance` is the current eye distance used for calibration.
    pub fn show(&mut self, ctx: &egui::Context, settings: &Settings, pixel_distance: Option<f64>) -> SettingsAction {
        let mut open = true;
        let mut action = SettingsAction::Keep;

        egui::Window::new("Settings")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .default_width(420.0)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid")
                    .num_columns(2)
                    .spacing([16.0, 10.0])
                    .show(ui, |ui| {
                        ui.label("Monitoring Interval (seconds):");
                        ui.text_edit_singleline(&mut self.form.interval);
                        ui.end_row();

                        ui.label("Alert Cooldown (seconds):");
                        ui.text_edit_singleline(&mut self.form.cooldown);
                        ui.end_row();

                        ui.label("Manual Brightness (%, blank = auto):");
                        ui.text_edit_singleline(&mut self.form.manual_brightness);
                        ui.end_row();

                        ui.label("Camera Focal Length (px):");
                        ui.text_edit_singleline(&mut self.form.focal_length);
                        ui.end_row();
                    });

                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    let calibrate = ui.add_enabled(pixel_distance.is_some(), egui::Button::new("Calibrate"));
                    ui.label(format!("Sit {} cm from the camera, then press Calibrate.", CALIBRATION_DISTANCE_CM));
                    if calibrate.clicked() {
                        self.calibrate(settings, pixel_distance);
                    }
                });
                if let Some(note) = &self.calibration_note {
                    ui.label(RichText::new(note).italics());
                }

                ui.add_space(8.0);
                ui.group(|ui| {
                    ui.label(RichText::new("Information").strong());
                    ui.label(INFO_TEXT);
                    ui.label(
                        RichText::new("Camera and model changes take effect after restart.").small(),
                    );
                });

                if let Some(err) = &self.error {
                    ui.colored_label(Color32::RED, err);
                }

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        match self.form.apply(settings) {
                            Ok(updated) => {
                                info!(
                                    "Settings saved: interval {}s, cooldown {}s",
                                    updated.monitoring_interval_secs, updated.alert_cooldown_secs
                                );
                                action = SettingsAction::Save(updated);
                            }
                            Err(err) => self.error = Some(err),
                        }
                    }
                    if ui.button("Cancel").clicked() {
                        action = SettingsAction::Close;
                    }
                });
            });

        if open {
            action
        } else {
            SettingsAction::Close
        }
    }

    fn calibrate(&mut self, settings: &Settings, pixel_distance: Option<f64>) {
        let focal = pixel_distance.and_then(|px| {
            calibrate_focal_length(px, CALIBRATION_DISTANCE_CM, settings.real_eye_distance_cm)
        });
        match (focal, pixel_distance) {
            (Some(focal), Some(px)) => {
                info!("Calibrated focal length {} px from eye distance {} px", focal, px);
                self.form.focal_length = focal.to_string();
                self.calibration_note = Some(format!(
                    "Eye distance {:.2} px at {} cm gives focal length {:.2} px. Save to apply.",
                    px, CALIBRATION_DISTANCE_CM, focal
                ));
            }
            _ => self.calibration_note = Some("No face detected, cannot calibrate.".to_string()),
        }
    }
}
