// src/face_mesh.rs
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};
use log::{debug, info, warn};
use ndarray::Array4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, ValueType},
};

// --- Model defaults ---
const DEFAULT_INPUT_SIZE: u32 = 192;
/// Landmark ROI is the face bounding box grown by this factor.
const ROI_SCALE: f32 = 1.5;
const COORDS_PER_LANDMARK: usize = 3;
/// 468 points for the classic mesh, 478 with refined iris landmarks.
const MIN_LANDMARKS: usize = 468;

/// Tensor layout the model expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLayout {
    Nchw,
    Nhwc,
}

/// Rectangular region of the frame fed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Largest centered square of the frame.
    pub fn centered_square(frame_width: u32, frame_height: u32) -> Self {
        let side = frame_width.min(frame_height);
        Self {
            x: (frame_width - side) / 2,
            y: (frame_height - side) / 2,
            width: side,
            height: side,
        }
    }

    /// Square around the given points, scaled by [`ROI_SCALE`] and clipped to the frame.
    pub fn around(points: &[(f32, f32)], frame_width: u32, frame_height: u32) -> Option<Self> {
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for &(x, y) in points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if points.is_empty() || max_x <= min_x || max_y <= min_y {
            return None;
        }

        let center_x = (min_x + max_x) / 2.0;
        let center_y = (min_y + max_y) / 2.0;
        let half = (max_x - min_x).max(max_y - min_y) * ROI_SCALE / 2.0;

        let left = (center_x - half).max(0.0);
        let top = (center_y - half).max(0.0);
        let right = (center_x + half).min(frame_width as f32);
        let bottom = (center_y + half).min(frame_height as f32);
        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }

        Some(Self {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Face mesh landmarks mapped back into frame pixel coordinates.
#[derive(Debug, Clone)]
pub struct FaceLandmarks {
    pub points: Vec<(f32, f32)>,
    /// Face presence probability reported by the model.
    pub presence: f32,
}

impl FaceLandmarks {
    pub fn point(&self, index: usize) -> Option<(f32, f32)> {
        self.points.get(index).copied()
    }
}

/// Face mesh landmark model running on ONNX Runtime.
pub struct FaceMeshDetector {
    session: Session,
    input_width: u32,
    input_height: u32,
    layout: InputLayout,
    output_names: Vec<String>,
    min_confidence: f32,
    roi: Option<Roi>,
}

impl FaceMeshDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, min_confidence: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        info!("Loading face mesh model: {}", model_path.display());
        if !model_path.is_file() {
            return Err(anyhow!("Face mesh model not found at {}", model_path.display()));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load face mesh model {}", model_path.display()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("Face mesh model has no inputs"))?;
        let (layout, input_width, input_height) = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => input_geometry(dimensions),
            other => {
                warn!("Unexpected input type {:?}, assuming NCHW {}px", other, DEFAULT_INPUT_SIZE);
                (InputLayout::Nchw, DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
            }
        };

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            return Err(anyhow!("Face mesh model has no outputs"));
        }
        info!(
            "Face mesh model ready: input {}x{} {:?}, outputs {:?}",
            input_width, input_height, layout, output_names
        );

        Ok(Self {
            session,
            input_width,
            input_height,
            layout,
            output_names,
            min_confidence,
            roi: None,
        })
    }

    /// Runs the model on one frame. `Ok(None)` means no face was found.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Option<FaceLandmarks>> {
        let (frame_width, frame_height) = frame.dimensions();
        if frame_width == 0 || frame_height == 0 {
            return Ok(None);
        }
        let roi = self
            .roi
            .unwrap_or_else(|| Roi::centered_square(frame_width, frame_height));

        let input = self.preprocess(frame, roi)?;
        let (raw_points, presence) = self.forward(input)?;

        if presence < self.min_confidence {
            debug!("Face presence {:.2} below threshold, resetting ROI", presence);
            self.roi = None;
            return Ok(None);
        }

        let scale_x = roi.width as f32 / self.input_width as f32;
        let scale_y = roi.height as f32 / self.input_height as f32;
        let points: Vec<(f32, f32)> = raw_points
            .chunks_exact(COORDS_PER_LANDMARK)
            .map(|p| (roi.x as f32 + p[0] * scale_x, roi.y as f32 + p[1] * scale_y))
            .collect();

        self.roi = Roi::around(&points, frame_width, frame_height);
        Ok(Some(FaceLandmarks { points, presence }))
    }

    fn preprocess(&self, frame: &RgbImage, roi: Roi) -> Result<Array4<f32>> {
        let crop = imageops::crop_imm(frame, roi.x, roi.y, roi.width, roi.height).to_image();
        let resized = imageops::resize(
            &crop,
            self.input_width,
            self.input_height,
            imageops::FilterType::Triangle,
        );

        let (w, h) = (self.input_width as usize, self.input_height as usize);
        let mut input = match self.layout {
            InputLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
            InputLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
        };
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                match self.layout {
                    InputLayout::Nchw => input[[0, c, y, x]] = value,
                    InputLayout::Nhwc => input[[0, y, x, c]] = value,
                }
            }
        }
        Ok(input)
    }

    /// Returns the flat landmark tensor and the face presence probability.
    fn forward(&self, input: Array4<f32>) -> Result<(Vec<f32>, f32)> {
        let tensor = Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![tensor]?)?;

        let mut landmarks: Option<Vec<f32>> = None;
        let mut presence_logit: Option<f32> = None;
        for name in &self.output_names {
            let view = outputs[name.as_str()].try_extract_tensor::<f32>()?;
            let len = view.len();
            if len >= MIN_LANDMARKS * COORDS_PER_LANDMARK && len % COORDS_PER_LANDMARK == 0 {
                landmarks = Some(view.iter().copied().collect());
            } else if len == 1 {
                presence_logit = view.iter().next().copied();
            }
        }

        let landmarks = landmarks.ok_or_else(|| anyhow!("Face mesh model produced no landmark tensor"))?;
        // Models without a presence head are trusted on every frame.
        let presence = presence_logit.map_or(1.0, sigmoid);
        Ok((landmarks, presence))
    }
}

fn input_geometry(dimensions: &[i64]) -> (InputLayout, u32, u32) {
    let dim = |i: usize| {
        dimensions
            .get(i)
            .copied()
            .filter(|d| *d > 0)
            .map_or(DEFAULT_INPUT_SIZE, |d| d as u32)
    };
    match dimensions.get(1).copied() {
        Some(3) => (InputLayout::Nchw, dim(3), dim(2)),
        _ if dimensions.get(3).copied() == Some(3) => (InputLayout::Nhwc, dim(2), dim(1)),
        _ => (InputLayout::Nchw, DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE),
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_square_on_landscape_frame() {
        let roi = Roi::centered_square(640, 480);
        assert_eq!(roi, Roi { x: 80, y: 0, width: 480, height: 480 });
    }

    #[test]
    fn roi_around_points_is_enlarged_square() {
        let points = [(100.0, 100.0), (200.0, 100.0), (150.0, 180.0)];
        let roi = Roi::around(&points, 640, 480).unwrap();
        // 100px wide box, 1.5x -> 150px square centered on (150, 140)
        assert_eq!(roi, Roi { x: 75, y: 65, width: 150, height: 150 });
    }

    #[test]
    fn roi_around_points_is_clipped_to_frame() {
        let points = [(0.0, 0.0), (100.0, 100.0)];
        let roi = Roi::around(&points, 640, 480).unwrap();
        assert_eq!(roi.x, 0);
        assert_eq!(roi.y, 0);
        assert_eq!(roi.width, 125);
        assert_eq!(roi.height, 125);
    }

    #[test]
    fn roi_around_degenerate_points_is_none() {
        assert!(Roi::around(&[], 640, 480).is_none());
        assert!(Roi::around(&[(10.0, 10.0), (10.0, 10.0)], 640, 480).is_none());
    }

    #[test]
    fn input_geometry_detects_layout() {
        assert_eq!(input_geometry(&[1, 3, 192, 192]), (InputLayout::Nchw, 192, 192));
        assert_eq!(input_geometry(&[1, 256, 192, 3]), (InputLayout::Nhwc, 192, 256));
        assert_eq!(input_geometry(&[-1, 3, -1, -1]), (InputLayout::Nchw, 192, 192));
    }

    #[test]
    fn sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < f32::EPSILON);
        assert!(sigmoid(10.0) > 0.99);
    }
}
