// src/ui/history_window.rs
use std::path::PathBuf;

use egui::{Color32, RichText};
use log::{error, info};

use super::risk_colors;
use crate::{
    exposure::RiskLevel,
    history::{self, HistoryRow},
};

const COLUMNS: [&str; 7] = [
    "Date/Time",
    "Distance (cm)",
    "Brightness (%)",
    "Blue Light Score",
    "Thermal Score",
    "Blue Risk",
    "Thermal Risk",
];

/// Read-only table of the exposure log.
pub struct HistoryWindow {
    path: PathBuf,
    rows: Vec<HistoryRow>,
    error: Option<String>,
}

impl HistoryWindow {
    pub fn open(path: PathBuf) -> Self {
        let mut window = Self { path, rows: Vec::new(), error: None };
        window.refresh();
        window
    }

    pub fn refresh(&mut self) {
        match history::load_history(&self.path) {
            Ok(rows) => {
                info!("Loaded {} history rows from {}", rows.len(), self.path.display());
                self.rows = rows;
                self.error = None;
            }
            Err(e) => {
                error!("Failed to load history: {:#}", e);
                self.rows.clear();
                self.error = Some(format!("Failed to load history: {}", e));
            }
        }
    }

    /// Returns false once the user closes the window.
    pub fn show(&mut self, ctx: &egui::Context) -> bool {
        let mut open = true;
        egui::Window::new("Exposure History")
            .open(&mut open)
            .default_size([900.0, 500.0])
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if ui.button("Refresh").clicked() {
                        self.refresh();
                    }
                    ui.label(format!("{} records in {}", self.rows.len(), self.path.display()));
                });
                if let Some(err) = &self.error {
                    ui.colored_label(Color32::RED, err);
                }
                ui.separator();

                if self.rows.is_empty() && self.error.is_none() {
                    ui.label("No history data available yet.");
                    return;
                }

                egui::ScrollArea::both().auto_shrink([false, false]).show(ui, |ui| {
                    egui::Grid::new("history_grid")
                        .num_columns(COLUMNS.len())
                        .striped(true)
                        .spacing([18.0, 4.0])
                        .show(ui, |ui| {
                            for title in COLUMNS {
                                ui.label(RichText::new(title).strong());
                            }
                            ui.end_row();

                            for row in &self.rows {
                                history_row(ui, row);
                            }
                        });
                });
            });
        open
    }
}

fn history_row(ui: &mut egui::Ui, row: &HistoryRow) {
    // Only elevated rows are tinted.
    let tint = match row.worst_risk() {
        Some(risk @ (RiskLevel::High | RiskLevel::Moderate)) => Some(risk_colors(Some(risk)).0),
        _ => None,
    };
    let cells = [
        &row.date_time,
        &row.distance_cm,
        &row.brightness,
        &row.blue_score,
        &row.thermal_score,
        &row.blue_risk,
        &row.thermal_risk,
    ];
    for cell in cells {
        let text = RichText::new(cell.as_str());
        ui.label(match tint {
            Some(color) => text.color(color),
            None => text,
        });
    }
    ui.end_row();
}
