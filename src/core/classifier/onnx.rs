//! ONNX digit classifier backed by tract.

use super::{
    check_digit_count, combine_positions, split_cells, DetectionResult, DigitClass,
    DigitClassifier, PositionReading, CLASS_COUNT,
};
use crate::core::error::{ReadoutError, Result};
use crate::core::video::Frame;
use image::imageops::FilterType;
use image::DynamicImage;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tract_onnx::prelude::*;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, height, width, channels]`, the Keras default.
    #[default]
    Nhwc,
    /// `[1, channels, height, width]`
    Nchw,
}

fn default_input_size() -> u32 {
    100
}

fn default_channels() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    /// 1 for grayscale, 3 for RGB.
    #[serde(default = "default_channels")]
    pub channels: u32,
    #[serde(default)]
    pub layout: InputLayout,
}

impl ModelConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_width: default_input_size(),
            input_height: default_input_size(),
            channels: default_channels(),
            layout: InputLayout::default(),
        }
    }

    fn input_shape(&self) -> [usize; 4] {
        let (w, h, c) = (
            self.input_width as usize,
            self.input_height as usize,
            self.channels as usize,
        );
        match self.layout {
            InputLayout::Nhwc => [1, h, w, c],
            InputLayout::Nchw => [1, c, h, w],
        }
    }
}

/// How the model's output maps onto digit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// One run per digit cell, `CLASS_COUNT` scores each.
    PerCell,
    /// One run per frame, `digit_count * CLASS_COUNT` scores.
    WholeFrame,
}

struct LoadedModel {
    plan: OnnxPlan,
    mode: OutputMode,
}

pub struct OnnxDigitClassifier {
    config: ModelConfig,
    digit_count: usize,
    model: Option<LoadedModel>,
}

impl OnnxDigitClassifier {
    pub fn new(config: ModelConfig, digit_count: usize) -> Self {
        Self {
            config,
            digit_count,
            model: None,
        }
    }

    fn build_plan(&self) -> TractResult<OnnxPlan> {
        tract_onnx::onnx()
            .model_for_path(&self.config.model_path)?
            .with_input_fact(0, f32::fact(self.config.input_shape()).into())?
            .into_optimized()?
            .into_runnable()
    }

    /// Probe the output size with a blank input.
    fn output_len(plan: &OnnxPlan, shape: &[usize]) -> TractResult<usize> {
        let zeros = Tensor::zero::<f32>(shape)?;
        let outputs = plan.run(tvec!(zeros.into()))?;
        Ok(outputs.first().map(|o| o.len()).unwrap_or(0))
    }

    fn to_tensor(&self, image: &DynamicImage) -> Tensor {
        let (w, h, c) = (
            self.config.input_width as usize,
            self.config.input_height as usize,
            self.config.channels as usize,
        );
        let resized = image.resize_exact(w as u32, h as u32, FilterType::Triangle);
        let pixels: Vec<u8> = if c == 1 {
            resized.to_luma8().into_raw()
        } else {
            resized.to_rgb8().into_raw()
        };
        let at = |x: usize, y: usize, ch: usize| pixels[(y * w + x) * c + ch] as f32 / 255.0;

        match self.config.layout {
            InputLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_fn((1, h, w, c), |(_, y, x, ch)| at(x, y, ch))
                    .into()
            }
            InputLayout::Nchw => {
                tract_ndarray::Array4::from_shape_fn((1, c, h, w), |(_, ch, y, x)| at(x, y, ch))
                    .into()
            }
        }
    }

    fn run(&self, plan: &OnnxPlan, image: &DynamicImage) -> Result<Vec<f32>> {
        let tensor = self.to_tensor(image);
        let outputs = plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ReadoutError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| ReadoutError::Inference("model produced no output".into()))?;
        let scores = output
            .as_slice::<f32>()
            .map_err(|e| ReadoutError::Inference(e.to_string()))?;
        Ok(scores.to_vec())
    }

    fn model_inputs(&self, frame: &Frame, mode: OutputMode) -> Vec<DynamicImage> {
        match (mode, self.config.channels) {
            (OutputMode::WholeFrame, 1) => vec![DynamicImage::ImageLuma8(frame.to_luma())],
            (OutputMode::WholeFrame, _) => {
                vec![DynamicImage::ImageRgba8(frame.image.clone())]
            }
            (OutputMode::PerCell, 1) => split_cells(&frame.to_luma(), self.digit_count)
                .into_iter()
                .map(DynamicImage::ImageLuma8)
                .collect(),
            (OutputMode::PerCell, _) => split_cells(&frame.image, self.digit_count)
                .into_iter()
                .map(DynamicImage::ImageRgba8)
                .collect(),
        }
    }
}

/// Softmax unless the scores already form a distribution.
pub(crate) fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let is_distribution =
        scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if is_distribution {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Top class and its probability for one position's scores.
pub(crate) fn decode_position(scores: &[f32]) -> PositionReading {
    let probabilities = to_probabilities(scores);
    let (index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });
    PositionReading {
        class: DigitClass::from_index(index),
        confidence: confidence.max(0.0),
    }
}

impl DigitClassifier for OnnxDigitClassifier {
    fn load(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        check_digit_count(self.digit_count)?;
        let path = &self.config.model_path;
        info!("🔧 Loading digit model from: {:?}", path);

        if !path.is_file() {
            return Err(ReadoutError::ModelLoadFailed(format!(
                "model not found at {:?}",
                path
            )));
        }
        if self.config.channels != 1 && self.config.channels != 3 {
            return Err(ReadoutError::ModelLoadFailed(format!(
                "unsupported channel count {}",
                self.config.channels
            )));
        }

        let plan = self.build_plan().map_err(|e| {
            error!("❌ Failed to build model plan: {}", e);
            ReadoutError::ModelLoadFailed(e.to_string())
        })?;
        let output_len = Self::output_len(&plan, &self.config.input_shape())
            .map_err(|e| ReadoutError::ModelLoadFailed(e.to_string()))?;

        let mode = if output_len == CLASS_COUNT {
            OutputMode::PerCell
        } else if output_len == CLASS_COUNT * self.digit_count {
            OutputMode::WholeFrame
        } else {
            return Err(ReadoutError::ModelLoadFailed(format!(
                "model outputs {} scores, expected {} or {} for {} digits",
                output_len,
                CLASS_COUNT,
                CLASS_COUNT * self.digit_count,
                self.digit_count
            )));
        };

        info!("✅ Digit model loaded ({:?}, {} digits)", mode, self.digit_count);
        self.model = Some(LoadedModel { plan, mode });
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn detect(&self, frame: &Frame) -> Result<DetectionResult> {
        let model = self.model.as_ref().ok_or(ReadoutError::NotLoaded)?;

        let mut positions = Vec::with_capacity(self.digit_count);
        for input in self.model_inputs(frame, model.mode) {
            let scores = self.run(&model.plan, &input)?;
            positions.extend(scores.chunks_exact(CLASS_COUNT).map(decode_position));
        }
        debug!("Model readings for frame {}: {:?}", frame.index, positions);

        if positions.len() != self.digit_count {
            return Err(ReadoutError::Inference(format!(
                "decoded {} positions for {} digits",
                positions.len(),
                self.digit_count
            )));
        }
        Ok(combine_positions(&positions))
    }
}

impl Drop for OnnxDigitClassifier {
    fn drop(&mut self) {
        if self.model.is_some() {
            info!("🗑️ OnnxDigitClassifier: releasing model");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::BLANK_CLASS;

    #[test]
    fn test_softmax_applied_to_logits() {
        let probabilities = to_probabilities(&[2.0, 1.0, -1.0]);
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probabilities[0] > probabilities[1]);
    }

    #[test]
    fn test_distribution_kept_as_is() {
        let scores = [0.1, 0.7, 0.2];
        assert_eq!(to_probabilities(&scores), scores.to_vec());
    }

    #[test]
    fn test_decode_position() {
        let mut scores = [0.0f32; CLASS_COUNT];
        scores[7] = 0.9;
        scores[1] = 0.1;
        let reading = decode_position(&scores);
        assert_eq!(reading.class, DigitClass::Digit(7));
        assert!((reading.confidence - 0.9).abs() < 1e-6);

        let mut blank = [0.0f32; CLASS_COUNT];
        blank[BLANK_CLASS] = 1.0;
        assert_eq!(decode_position(&blank).class, DigitClass::Blank);
    }

    #[test]
    fn test_input_shape_layouts() {
        let mut config = ModelConfig::new("model.onnx");
        assert_eq!(config.input_shape(), [1, 100, 100, 1]);
        config.layout = InputLayout::Nchw;
        config.channels = 3;
        config.input_width = 64;
        assert_eq!(config.input_shape(), [1, 3, 100, 64]);
    }

    #[test]
    fn test_missing_model_fails_load() {
        let mut classifier = OnnxDigitClassifier::new(ModelConfig::new("/nonexistent/model.onnx"), 4);
        let err = classifier.load().unwrap_err();
        assert!(matches!(err, ReadoutError::ModelLoadFailed(_)));
        assert!(!classifier.is_loaded());
    }

    #[test]
    fn test_too_many_digits_fails_load() {
        let mut classifier = OnnxDigitClassifier::new(ModelConfig::new("model.onnx"), 20);
        let err = classifier.load().unwrap_err();
        assert!(matches!(err, ReadoutError::ModelLoadFailed(_)));
    }

    #[test]
    fn test_detect_before_load() {
        let classifier = OnnxDigitClassifier::new(ModelConfig::new("model.onnx"), 4);
        let frame = Frame::new(
            image::RgbaImage::new(40, 10),
            crate::core::video::Timestamp::default(),
            0,
        );
        assert!(matches!(classifier.detect(&frame), Err(ReadoutError::NotLoaded)));
    }

    #[test]
    fn test_model_config_defaults_from_json() {
        let config: ModelConfig =
            serde_json::from_str(r#"{ "model_path": "m.onnx", "layout": "nchw" }"#).unwrap();
        assert_eq!(config.input_width, 100);
        assert_eq!(config.channels, 1);
        assert_eq!(config.layout, InputLayout::Nchw);
    }
}
