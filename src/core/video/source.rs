use crate::core::config::{sample_offset, CropRegion};
use crate::core::error::Result;
use crate::core::video::frame::{Frame, Timestamp};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An opened, decodable video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoHandle {
    pub path: PathBuf,
    pub duration: Duration,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
}

/// Decoding primitive the sampler is built on.
///
/// Implementors only have to open a video and decode the frame shown at a
/// given offset; sequence sampling is provided on top of `grab`.
pub trait FrameSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<VideoHandle>;

    /// Decode the full, uncropped frame displayed at `offset`.
    fn grab(&self, handle: &VideoHandle, offset: Duration) -> Result<Frame>;

    fn sample(
        &self,
        handle: &VideoHandle,
        skip_seconds: f64,
        interval_seconds: f64,
        frame_count: usize,
        crop_region: Option<&CropRegion>,
    ) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            let offset = sample_offset(skip_seconds, interval_seconds, index)?;
            let mut frame = self.grab(handle, offset)?;
            frame.timestamp = Timestamp::from_offset(offset);
            frame.index = index;
            if let Some(region) = crop_region {
                frame = frame.crop(region)?;
            }
            frames.push(frame);
        }
        Ok(frames)
    }

    fn sample_single(&self, handle: &VideoHandle, skip_seconds: f64) -> Result<Frame> {
        let offset = sample_offset(skip_seconds, 0.0, 0)?;
        let mut frame = self.grab(handle, offset)?;
        frame.timestamp = Timestamp::from_offset(offset);
        frame.index = 0;
        Ok(frame)
    }
}
