//! Digit classifiers: one cropped display frame in, one reading out.

pub mod mock;
pub mod onnx;
pub mod segment;

pub use mock::MockDigitClassifier;
pub use onnx::{InputLayout, ModelConfig, OnnxDigitClassifier};
pub use segment::SegmentProbeClassifier;

use crate::core::error::{ReadoutError, Result};
use crate::core::video::Frame;
use image::{imageops, ImageBuffer, Pixel};

/// Number of classes per digit position: `0`-`9` plus blank.
pub const CLASS_COUNT: usize = 11;
pub const BLANK_CLASS: usize = 10;

/// Widest display whose reading always fits in a `u64`.
pub const MAX_DIGITS: usize = 19;

/// Shared `load` check for classifier adapters.
pub(crate) fn check_digit_count(digit_count: usize) -> Result<()> {
    if digit_count == 0 || digit_count > MAX_DIGITS {
        return Err(ReadoutError::ModelLoadFailed(format!(
            "digit_count must be between 1 and {}, got {}",
            MAX_DIGITS, digit_count
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub value: u64,
    /// 0.0 = fully trusted, 1.0 = unusable.
    pub failure_rate: f32,
}

impl DetectionResult {
    pub fn new(value: u64, failure_rate: f32) -> Self {
        Self {
            value,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn failed() -> Self {
        Self::new(0, 1.0)
    }

    /// Zero-padded to the display width.
    pub fn padded(&self, digit_count: usize) -> String {
        format!("{:0width$}", self.value, width = digit_count)
    }
}

/// Decoded class of one digit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitClass {
    Digit(u8),
    Blank,
}

impl DigitClass {
    pub fn from_index(index: usize) -> Self {
        if index < BLANK_CLASS {
            DigitClass::Digit(index as u8)
        } else {
            DigitClass::Blank
        }
    }
}

/// A digit class together with how sure the classifier was about it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub class: DigitClass,
    pub confidence: f32,
}

pub trait DigitClassifier: Send {
    /// Load the backing model. Calling it again after success is a no-op.
    fn load(&mut self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    /// Read one frame. Must not be called before `load`.
    fn detect(&self, frame: &Frame) -> Result<DetectionResult>;
}

/// Join per-position readings into a value and failure rate.
///
/// Blank positions read as `0`. The failure rate is `1 - mean(confidence)`.
pub fn combine_positions(positions: &[PositionReading]) -> DetectionResult {
    if positions.is_empty() {
        return DetectionResult::failed();
    }

    let value = positions.iter().fold(0u64, |acc, p| {
        let digit = match p.class {
            DigitClass::Digit(d) => d as u64,
            DigitClass::Blank => 0,
        };
        acc.saturating_mul(10).saturating_add(digit)
    });

    let mean_confidence = positions
        .iter()
        .map(|p| p.confidence.clamp(0.0, 1.0))
        .sum::<f32>()
        / positions.len() as f32;

    DetectionResult::new(value, 1.0 - mean_confidence)
}

/// Split a display image into `digit_count` equal-width cells, left to right.
pub fn split_cells<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    digit_count: usize,
) -> Vec<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + 'static,
{
    let digit_count = digit_count.max(1) as u32;
    let cell_width = (image.width() / digit_count).max(1);
    (0..digit_count)
        .map(|i| {
            let x = (i * cell_width).min(image.width().saturating_sub(1));
            let width = cell_width.min(image.width().saturating_sub(x));
            imageops::crop_imm(image, x, 0, width, image.height()).to_image()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(class: DigitClass, confidence: f32) -> PositionReading {
        PositionReading { class, confidence }
    }

    #[test]
    fn test_combine_positions_value() {
        let result = combine_positions(&[
            reading(DigitClass::Digit(0), 1.0),
            reading(DigitClass::Digit(1), 1.0),
            reading(DigitClass::Digit(2), 1.0),
            reading(DigitClass::Digit(3), 1.0),
        ]);
        assert_eq!(result.value, 123);
        assert_eq!(result.failure_rate, 0.0);
        assert_eq!(result.padded(4), "0123");
    }

    #[test]
    fn test_combine_positions_blank_reads_as_zero() {
        let result = combine_positions(&[
            reading(DigitClass::Blank, 1.0),
            reading(DigitClass::Digit(4), 1.0),
            reading(DigitClass::Digit(2), 1.0),
        ]);
        assert_eq!(result.value, 42);
    }

    #[test]
    fn test_failure_rate_grows_as_confidence_drops() {
        let sure = combine_positions(&[reading(DigitClass::Digit(1), 0.9); 3]);
        let unsure = combine_positions(&[
            reading(DigitClass::Digit(1), 0.9),
            reading(DigitClass::Digit(1), 0.4),
            reading(DigitClass::Digit(1), 0.9),
        ]);
        assert!(unsure.failure_rate > sure.failure_rate);
        assert!((0.0..=1.0).contains(&unsure.failure_rate));
    }

    #[test]
    fn test_widest_display_value_is_exact() {
        let result = combine_positions(&[reading(DigitClass::Digit(9), 1.0); MAX_DIGITS]);
        assert_eq!(result.value, 9_999_999_999_999_999_999);
        assert_eq!(result.padded(MAX_DIGITS), "9".repeat(MAX_DIGITS));
    }

    #[test]
    fn test_digit_count_bounds() {
        assert!(check_digit_count(1).is_ok());
        assert!(check_digit_count(MAX_DIGITS).is_ok());
        assert!(check_digit_count(0).is_err());
        assert!(matches!(
            check_digit_count(MAX_DIGITS + 1),
            Err(ReadoutError::ModelLoadFailed(_))
        ));
    }

    #[test]
    fn test_combine_empty_is_failure() {
        assert_eq!(combine_positions(&[]), DetectionResult::failed());
    }

    #[test]
    fn test_split_cells() {
        use image::GrayImage;

        let gray = GrayImage::new(40, 10);
        let cells = split_cells(&gray, 4);
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|c| c.width() == 10 && c.height() == 10));
    }

    #[test]
    fn test_class_from_index() {
        assert_eq!(DigitClass::from_index(7), DigitClass::Digit(7));
        assert_eq!(DigitClass::from_index(BLANK_CLASS), DigitClass::Blank);
    }
}
