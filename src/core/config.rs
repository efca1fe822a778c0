//! Run configuration: sampling parameters, classifier selection and export target.

use crate::core::classifier::{ModelConfig, MAX_DIGITS};
use crate::core::error::{ReadoutError, Result};
use crate::core::export::ExportFormat;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rectangle in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Fails unless the region is non-empty and lies fully inside a
    /// `frame_width` x `frame_height` frame.
    pub fn check_within(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReadoutError::Config(format!(
                "crop region {}x{} is empty",
                self.width, self.height
            )));
        }
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > frame_width as u64 || bottom > frame_height as u64 {
            return Err(ReadoutError::Config(format!(
                "crop region ({}, {}, {}x{}) exceeds frame bounds {}x{}",
                self.x, self.y, self.width, self.height, frame_width, frame_height
            )));
        }
        Ok(())
    }
}

/// Video offset of sample `index`, or a `Config` error when it does not fit
/// in a `Duration`.
pub fn sample_offset(skip_seconds: f64, interval_seconds: f64, index: usize) -> Result<Duration> {
    let seconds = skip_seconds + interval_seconds * index as f64;
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        ReadoutError::Config(format!("sample offset {}s is out of range", seconds))
    })
}

/// Immutable sampling parameters for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSpec {
    pub interval_seconds: f64,
    pub frame_count: usize,
    pub digit_count: usize,
    #[serde(default)]
    pub crop_region: Option<CropRegion>,
    #[serde(default)]
    pub skip_seconds: f64,
}

impl SamplingSpec {
    pub fn new(interval_seconds: f64, frame_count: usize, digit_count: usize) -> Self {
        Self {
            interval_seconds,
            frame_count,
            digit_count,
            crop_region: None,
            skip_seconds: 0.0,
        }
    }

    pub fn with_crop(mut self, region: CropRegion) -> Self {
        self.crop_region = Some(region);
        self
    }

    pub fn with_skip(mut self, skip_seconds: f64) -> Self {
        self.skip_seconds = skip_seconds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.digit_count == 0 {
            return Err(ReadoutError::Config("digit_count must be at least 1".into()));
        }
        if self.digit_count > MAX_DIGITS {
            return Err(ReadoutError::Config(format!(
                "digit_count {} exceeds the supported maximum of {}",
                self.digit_count, MAX_DIGITS
            )));
        }
        if self.frame_count == 0 {
            return Err(ReadoutError::Config("frame_count must be at least 1".into()));
        }
        if !self.interval_seconds.is_finite() || self.interval_seconds <= 0.0 {
            return Err(ReadoutError::Config(format!(
                "interval_seconds must be positive, got {}",
                self.interval_seconds
            )));
        }
        if !self.skip_seconds.is_finite() || self.skip_seconds < 0.0 {
            return Err(ReadoutError::Config(format!(
                "skip_seconds must be non-negative, got {}",
                self.skip_seconds
            )));
        }
        self.offset(self.frame_count - 1)?;
        Ok(())
    }

    /// Video offset of sample `index`.
    pub fn offset(&self, index: usize) -> Result<Duration> {
        sample_offset(self.skip_seconds, self.interval_seconds, index)
    }
}

/// Which classifier backs the detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    Onnx(ModelConfig),
    SegmentProbe {
        #[serde(default)]
        inverted: bool,
    },
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::SegmentProbe { inverted: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,
    pub out_dir: PathBuf,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("segment_readout_frames")
}

/// Everything a `ReadoutSession` needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub video_path: PathBuf,
    pub sampling: SamplingSpec,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub persist_frames: bool,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl RunConfig {
    pub fn from_json5_str(text: &str) -> Result<Self> {
        let config: RunConfig =
            json5::from_str(text).map_err(|e| ReadoutError::ConfigFile(e.to_string()))?;
        config.sampling.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("📖 Loading run config: {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_crop_region_within_bounds() {
        let region = CropRegion::new(10, 10, 80, 40);
        assert!(region.check_within(100, 50).is_ok());
        assert!(region.check_within(89, 50).is_err());
        assert!(region.check_within(100, 49).is_err());
    }

    #[test]
    fn test_crop_region_exact_fit() {
        let region = CropRegion::new(10, 10, 80, 40);
        assert!(region.check_within(90, 50).is_ok());
    }

    #[test]
    fn test_digit_count_upper_bound() {
        assert!(SamplingSpec::new(5.0, 3, MAX_DIGITS).validate().is_ok());
        let err = SamplingSpec::new(5.0, 3, MAX_DIGITS + 1).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_huge_interval_rejected() {
        let err = SamplingSpec::new(1e20, 3, 1).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = SamplingSpec::new(1.0, 1, 1).with_skip(1e20).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_sample_offset_out_of_range() {
        assert_eq!(sample_offset(2.0, 5.0, 3).unwrap(), Duration::from_secs(17));
        assert!(sample_offset(0.0, 1e20, 1).is_err());
    }

    #[test]
    fn test_empty_crop_region_rejected() {
        let err = CropRegion::new(0, 0, 0, 10).check_within(100, 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_sampling_spec_validation() {
        assert!(SamplingSpec::new(5.0, 3, 4).validate().is_ok());
        assert!(SamplingSpec::new(5.0, 3, 0).validate().is_err());
        assert!(SamplingSpec::new(0.0, 3, 4).validate().is_err());
        assert!(SamplingSpec::new(5.0, 0, 4).validate().is_err());
        assert!(SamplingSpec::new(5.0, 3, 4).with_skip(-1.0).validate().is_err());
    }

    #[test]
    fn test_run_config_from_json5() {
        let text = r#"{
            // instrument recording
            video_path: "/data/meter.mp4",
            sampling: {
                interval_seconds: 5,
                frame_count: 12,
                digit_count: 4,
                crop_region: { x: 100, y: 40, width: 320, height: 120 },
            },
            classifier: { kind: "segment_probe", inverted: true },
            export: { format: "tsv", out_dir: "/tmp/out" },
        }"#;

        let config = RunConfig::from_json5_str(text).unwrap();
        assert_eq!(config.sampling.frame_count, 12);
        assert_eq!(config.sampling.skip_seconds, 0.0);
        assert_eq!(
            config.sampling.crop_region,
            Some(CropRegion::new(100, 40, 320, 120))
        );
        assert_eq!(
            config.classifier,
            ClassifierConfig::SegmentProbe { inverted: true }
        );
        assert_eq!(config.export.format, ExportFormat::Tsv);
        assert!(!config.persist_frames);
    }

    #[test]
    fn test_run_config_rejects_invalid_sampling() {
        let text = r#"{
            video_path: "a.mp4",
            sampling: { interval_seconds: 1, frame_count: 2, digit_count: 0 },
            export: { out_dir: "." },
        }"#;
        let err = RunConfig::from_json5_str(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_run_config_parse_error_is_configuration() {
        let err = RunConfig::from_json5_str("{ video_path: ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
