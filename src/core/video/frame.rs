use crate::core::config::CropRegion;
use crate::core::error::{ReadoutError, Result};
use image::{imageops, GrayImage, RgbaImage};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Offset into the video, rendered as `HH:MM:SS`.
///
/// Only whole seconds are kept; sub-second offsets are truncated so the
/// rendered form and the value always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    seconds: u64,
}

impl Timestamp {
    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    pub fn from_offset(offset: Duration) -> Self {
        Self {
            seconds: offset.as_secs(),
        }
    }

    pub fn as_seconds(&self) -> u64 {
        self.seconds
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.seconds / 3600;
        let minutes = (self.seconds % 3600) / 60;
        let secs = self.seconds % 60;
        write!(f, "{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

impl FromStr for Timestamp {
    type Err = ReadoutError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ReadoutError::Validation(format!("invalid timestamp: {:?}", s));
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut fields = [0u64; 3];
        for (field, part) in fields.iter_mut().zip(&parts) {
            *field = part.parse().map_err(|_| invalid())?;
        }
        if fields[1] >= 60 || fields[2] >= 60 {
            return Err(invalid());
        }
        Ok(Self::from_seconds(fields[0] * 3600 + fields[1] * 60 + fields[2]))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub timestamp: Timestamp,
    /// Position in the sampled sequence.
    pub index: usize,
}

impl Frame {
    pub fn new(image: RgbaImage, timestamp: Timestamp, index: usize) -> Self {
        Self {
            image,
            timestamp,
            index,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> usize {
        (self.width() * self.height()) as usize
    }

    /// Restrict the frame to `region`. Fails if the region leaves the frame.
    pub fn crop(&self, region: &CropRegion) -> Result<Frame> {
        region.check_within(self.width(), self.height())?;
        let cropped =
            imageops::crop_imm(&self.image, region.x, region.y, region.width, region.height)
                .to_image();
        Ok(Frame {
            image: cropped,
            timestamp: self.timestamp,
            index: self.index,
        })
    }

    pub fn to_luma(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(ReadoutError::from)
    }
}
