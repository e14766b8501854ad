// src/lib.rs
#![warn(clippy::all, rust_2018_idioms)]

pub mod brightness;
pub mod camera;
pub mod distance;
pub mod exposure;
pub mod face_mesh;
pub mod history;
pub mod monitor;
pub mod settings;
pub mod ui;

pub use ui::ExposureMonitorApp;
