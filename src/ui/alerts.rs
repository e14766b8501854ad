// src/ui/alerts.rs
use egui::{Align2, Color32, RichText};

use crate::monitor::Alert;

/// Shows the oldest pending alert; OK dismisses it and reveals the next one.
pub fn show_alerts(ctx: &egui::Context, pending: &mut Vec<Alert>) {
    let Some(alert) = pending.first() else {
        return;
    };

    let mut dismissed = false;
    egui::Window::new(RichText::new(alert.title).color(Color32::from_rgb(0xe7, 0x4c, 0x3c)).strong())
        .id(egui::Id::new("exposure_alert"))
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            ui.set_max_width(360.0);
            ui.label(alert.message);
            if pending.len() > 1 {
                ui.label(RichText::new(format!("{} more alert(s) waiting", pending.len() - 1)).small());
            }
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        });

    if dismissed {
        pending.remove(0);
    }
}

/// Informational message with an OK button, cleared once dismissed.
pub fn show_notice(ctx: &egui::Context, notice: &mut Option<String>) {
    let Some(message) = notice.as_deref() else {
        return;
    };

    let mut dismissed = false;
    egui::Window::new("Success")
        .id(egui::Id::new("exposure_notice"))
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            ui.set_max_width(360.0);
            ui.label(message);
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        });

    if dismissed {
        *notice = None;
    }
}
