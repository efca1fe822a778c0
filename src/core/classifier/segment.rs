//! Model-free classifier that reads lit segments directly.
//!
//! Each digit cell is probed at the seven segment positions and at the two
//! enclosed "holes" of the figure eight, which are never lit and serve as the
//! background reference. A segment counts as lit when its mean luminance is
//! above the midpoint between background and the brightest segment.

use super::{
    check_digit_count, combine_positions, split_cells, DetectionResult, DigitClass,
    DigitClassifier, PositionReading,
};
use crate::core::error::{ReadoutError, Result};
use crate::core::video::Frame;
use image::GrayImage;
use log::{debug, info};

/// Relative box `(x0, y0, x1, y1)` inside a digit cell.
pub type RelBox = (f32, f32, f32, f32);

/// Segments in `a b c d e f g` order.
pub const SEGMENT_BOXES: [RelBox; 7] = [
    (0.25, 0.02, 0.75, 0.12),
    (0.78, 0.14, 0.92, 0.44),
    (0.78, 0.56, 0.92, 0.86),
    (0.25, 0.88, 0.75, 0.98),
    (0.08, 0.56, 0.22, 0.86),
    (0.08, 0.14, 0.22, 0.44),
    (0.25, 0.45, 0.75, 0.55),
];

pub const HOLE_BOXES: [RelBox; 2] = [(0.35, 0.20, 0.65, 0.38), (0.35, 0.62, 0.65, 0.80)];

/// Bit `i` set means segment `i` (a..g) is lit.
pub const DIGIT_PATTERNS: [u8; 10] = [
    0b011_1111, // 0: a b c d e f
    0b000_0110, // 1: b c
    0b101_1011, // 2: a b d e g
    0b100_1111, // 3: a b c d g
    0b110_0110, // 4: b c f g
    0b110_1101, // 5: a c d f g
    0b111_1101, // 6: a c d e f g
    0b000_0111, // 7: a b c
    0b111_1111, // 8
    0b110_1111, // 9: a b c d f g
];

/// Below this luminance spread the whole display is treated as dark.
const MIN_CONTRAST: f32 = 24.0;

/// Pixel rectangle `(x, y, width, height)` for a relative box in a cell.
pub fn box_pixels(rel: RelBox, cell_width: u32, cell_height: u32) -> (u32, u32, u32, u32) {
    let (x0, y0, x1, y1) = rel;
    let px0 = (x0 * cell_width as f32) as u32;
    let py0 = (y0 * cell_height as f32) as u32;
    let px1 = ((x1 * cell_width as f32) as u32).max(px0 + 1).min(cell_width);
    let py1 = ((y1 * cell_height as f32) as u32).max(py0 + 1).min(cell_height);
    (px0, py0, px1.saturating_sub(px0), py1.saturating_sub(py0))
}

fn mean_luma(cell: &GrayImage, rel: RelBox) -> f32 {
    let (x, y, w, h) = box_pixels(rel, cell.width(), cell.height());
    let mut sum = 0u64;
    let mut count = 0u64;
    for py in y..(y + h).min(cell.height()) {
        for px in x..(x + w).min(cell.width()) {
            sum += cell.get_pixel(px, py)[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum as f32 / count as f32
    }
}

pub struct SegmentProbeClassifier {
    digit_count: usize,
    /// Dark segments on a light background (LCD style).
    inverted: bool,
    loaded: bool,
}

impl SegmentProbeClassifier {
    pub fn new(digit_count: usize) -> Self {
        Self {
            digit_count,
            inverted: false,
            loaded: false,
        }
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Oriented `(segment levels, background level)` of one cell.
    fn probe_cell(&self, cell: &GrayImage) -> ([f32; 7], f32) {
        let orient = |v: f32| if self.inverted { 255.0 - v } else { v };

        let mut segments = [0.0f32; 7];
        for (level, &rel) in segments.iter_mut().zip(SEGMENT_BOXES.iter()) {
            *level = orient(mean_luma(cell, rel));
        }
        let background = HOLE_BOXES
            .iter()
            .map(|&rel| orient(mean_luma(cell, rel)))
            .sum::<f32>()
            / HOLE_BOXES.len() as f32;
        (segments, background)
    }

    fn read_positions(&self, gray: &GrayImage) -> Vec<PositionReading> {
        let probes: Vec<([f32; 7], f32)> = split_cells(gray, self.digit_count)
            .iter()
            .map(|cell| self.probe_cell(cell))
            .collect();

        let background =
            probes.iter().map(|(_, bg)| *bg).sum::<f32>() / probes.len().max(1) as f32;
        let brightest = probes
            .iter()
            .flat_map(|(segments, _)| segments.iter().copied())
            .fold(f32::MIN, f32::max);
        let contrast = brightest - background;

        if contrast < MIN_CONTRAST {
            // Nothing lit anywhere: the display is dark, the reading is unusable.
            return vec![
                PositionReading {
                    class: DigitClass::Blank,
                    confidence: 0.0,
                };
                probes.len()
            ];
        }

        let threshold = background + contrast / 2.0;
        probes
            .iter()
            .map(|(segments, _)| read_cell(segments, threshold, contrast))
            .collect()
    }
}

fn read_cell(segments: &[f32; 7], threshold: f32, contrast: f32) -> PositionReading {
    let mut pattern = 0u8;
    let mut weakest = 1.0f32;
    for (i, &level) in segments.iter().enumerate() {
        if level > threshold {
            pattern |= 1 << i;
        }
        let margin = ((level - threshold).abs() / (contrast / 2.0)).min(1.0);
        weakest = weakest.min(margin);
    }

    if pattern == 0 {
        return PositionReading {
            class: DigitClass::Blank,
            confidence: weakest,
        };
    }

    let (digit, distance) = DIGIT_PATTERNS
        .iter()
        .enumerate()
        .map(|(d, &p)| (d, (p ^ pattern).count_ones()))
        .min_by_key(|&(_, dist)| dist)
        .unwrap_or((0, 7));

    PositionReading {
        class: DigitClass::Digit(digit as u8),
        confidence: weakest * 0.5f32.powi(distance as i32),
    }
}

impl DigitClassifier for SegmentProbeClassifier {
    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        check_digit_count(self.digit_count)?;
        info!(
            "🔧 Segment probe ready: {} digits, inverted={}",
            self.digit_count, self.inverted
        );
        self.loaded = true;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn detect(&self, frame: &Frame) -> Result<DetectionResult> {
        if !self.loaded {
            return Err(ReadoutError::NotLoaded);
        }
        let positions = self.read_positions(&frame.to_luma());
        debug!("Segment readings for frame {}: {:?}", frame.index, positions);
        Ok(combine_positions(&positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::synthetic::render_display;
    use crate::core::video::Timestamp;

    fn frame_for(text: &str) -> Frame {
        Frame::new(render_display(text, 40, 70), Timestamp::default(), 0)
    }

    #[test]
    fn test_reads_every_digit() {
        let mut classifier = SegmentProbeClassifier::new(10);
        classifier.load().unwrap();

        let result = classifier.detect(&frame_for("0123456789")).unwrap();
        assert_eq!(result.value, 123_456_789);
        assert!(result.failure_rate < 0.05);
    }

    #[test]
    fn test_leading_zero_display() {
        let mut classifier = SegmentProbeClassifier::new(4);
        classifier.load().unwrap();

        let result = classifier.detect(&frame_for("0123")).unwrap();
        assert_eq!(result.value, 123);
        assert_eq!(result.padded(4), "0123");
    }

    #[test]
    fn test_all_eights() {
        let mut classifier = SegmentProbeClassifier::new(3);
        classifier.load().unwrap();

        let result = classifier.detect(&frame_for("888")).unwrap();
        assert_eq!(result.value, 888);
    }

    #[test]
    fn test_dark_display_fails() {
        let mut classifier = SegmentProbeClassifier::new(3);
        classifier.load().unwrap();

        let result = classifier.detect(&frame_for("   ")).unwrap();
        assert_eq!(result.value, 0);
        assert_eq!(result.failure_rate, 1.0);
    }

    #[test]
    fn test_blank_leading_position_is_confident() {
        let mut classifier = SegmentProbeClassifier::new(3);
        classifier.load().unwrap();

        let result = classifier.detect(&frame_for(" 42")).unwrap();
        assert_eq!(result.value, 42);
        assert!(result.failure_rate < 0.05);
    }

    #[test]
    fn test_inverted_display() {
        let mut classifier = SegmentProbeClassifier::new(2).inverted(true);
        classifier.load().unwrap();

        let mut image = render_display("57", 40, 70);
        for pixel in image.pixels_mut() {
            pixel[0] = 255 - pixel[0];
            pixel[1] = 255 - pixel[1];
            pixel[2] = 255 - pixel[2];
        }
        let result = classifier
            .detect(&Frame::new(image, Timestamp::default(), 0))
            .unwrap();
        assert_eq!(result.value, 57);
    }

    #[test]
    fn test_detect_is_deterministic() {
        let mut classifier = SegmentProbeClassifier::new(4);
        classifier.load().unwrap();

        let frame = frame_for("4071");
        let first = classifier.detect(&frame).unwrap();
        let second = classifier.detect(&frame).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_rejects_unsupported_width() {
        assert!(SegmentProbeClassifier::new(0).load().is_err());
        let err = SegmentProbeClassifier::new(20).load().unwrap_err();
        assert!(matches!(err, ReadoutError::ModelLoadFailed(_)));
        assert!(SegmentProbeClassifier::new(19).load().is_ok());
    }

    #[test]
    fn test_detect_before_load() {
        let classifier = SegmentProbeClassifier::new(4);
        assert!(matches!(
            classifier.detect(&frame_for("0000")),
            Err(ReadoutError::NotLoaded)
        ));
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut classifier = SegmentProbeClassifier::new(2);
        classifier.load().unwrap();
        classifier.load().unwrap();
        assert!(classifier.is_loaded());
    }
}
