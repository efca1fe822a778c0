use crate::core::config::SamplingSpec;
use crate::core::error::{ReadoutError, Result};
use crate::core::video::frame::{Frame, Timestamp};
use crate::core::video::source::{FrameSource, VideoHandle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Also write every sampled frame to the scratch directory.
    pub persist_frames: bool,
    pub apply_crop: bool,
    /// Return one uncropped frame at the skip offset.
    pub single_frame_only: bool,
}

impl ExtractOptions {
    pub fn cropped() -> Self {
        Self {
            apply_crop: true,
            ..Default::default()
        }
    }

    pub fn preview() -> Self {
        Self {
            single_frame_only: true,
            ..Default::default()
        }
    }
}

/// Frames with their timestamps; both vectors always have the same length.
#[derive(Debug, Clone, Default)]
pub struct SampledFrames {
    pub frames: Vec<Frame>,
    pub timestamps: Vec<Timestamp>,
}

impl SampledFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

pub struct FrameSampler<'a> {
    source: &'a dyn FrameSource,
    spec: SamplingSpec,
    scratch_dir: PathBuf,
}

impl<'a> FrameSampler<'a> {
    pub fn new(source: &'a dyn FrameSource, spec: SamplingSpec) -> Self {
        Self {
            source,
            spec,
            scratch_dir: std::env::temp_dir().join("segment_readout_frames"),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn spec(&self) -> &SamplingSpec {
        &self.spec
    }

    /// Offsets that will be sampled, dropping any at or past the end of the video.
    pub fn planned_offsets(&self, handle: &VideoHandle) -> Result<Vec<Duration>> {
        let skip = self.spec.offset(0)?;
        if skip >= handle.duration {
            return Err(ReadoutError::Video(format!(
                "cannot seek to {:.3}s, video is {:.3}s long",
                skip.as_secs_f64(),
                handle.duration.as_secs_f64()
            )));
        }

        let mut offsets = Vec::with_capacity(self.spec.frame_count);
        for index in 0..self.spec.frame_count {
            let offset = self.spec.offset(index)?;
            if offset >= handle.duration {
                break;
            }
            offsets.push(offset);
        }

        if offsets.len() < self.spec.frame_count {
            warn!(
                "⚠️ Only {} of {} samples fit in a {:.1}s video",
                offsets.len(),
                self.spec.frame_count,
                handle.duration.as_secs_f64()
            );
        }
        Ok(offsets)
    }

    pub fn extract(&self, handle: &VideoHandle, options: ExtractOptions) -> Result<SampledFrames> {
        self.spec.validate()?;

        if options.single_frame_only {
            if options.apply_crop {
                return Err(ReadoutError::Config(
                    "a preview frame is never cropped".into(),
                ));
            }
            let frame = self.preview(handle)?;
            let timestamps = vec![frame.timestamp];
            return Ok(SampledFrames {
                frames: vec![frame],
                timestamps,
            });
        }

        let crop = if options.apply_crop {
            let region = self.spec.crop_region.ok_or_else(|| {
                ReadoutError::Config("cropping requested without a crop region".into())
            })?;
            region.check_within(handle.width, handle.height)?;
            Some(region)
        } else {
            None
        };

        let offsets = self.planned_offsets(handle)?;
        info!(
            "🎞️ Sampling {} frames from {:?} every {}s (skip {}s)",
            offsets.len(),
            handle.path,
            self.spec.interval_seconds,
            self.spec.skip_seconds
        );

        let frames = self.source.sample(
            handle,
            self.spec.skip_seconds,
            self.spec.interval_seconds,
            offsets.len(),
            crop.as_ref(),
        )?;
        let timestamps: Vec<Timestamp> = frames.iter().map(|f| f.timestamp).collect();
        debug!("Sampled timestamps: {:?}", timestamps);

        if options.persist_frames {
            persist_frames(&self.scratch_dir, &frames);
        }

        info!("✅ Sampled {} frames", frames.len());
        Ok(SampledFrames { frames, timestamps })
    }

    /// One full, uncropped frame at the skip offset, for choosing a crop region.
    pub fn preview(&self, handle: &VideoHandle) -> Result<Frame> {
        let skip = self.spec.offset(0)?;
        if skip >= handle.duration {
            return Err(ReadoutError::Video(format!(
                "cannot seek to {:.3}s, video is {:.3}s long",
                skip.as_secs_f64(),
                handle.duration.as_secs_f64()
            )));
        }
        self.source.sample_single(handle, self.spec.skip_seconds)
    }
}

/// Remove everything inside `dir` but keep the directory itself.
pub fn clear_directory(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!("Scratch directory does not exist yet: {:?}", dir);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = removed {
            error!("❌ Failed to delete {:?}: {}", path, e);
        }
    }
}

/// Debug output only: failures are logged, never returned.
fn persist_frames(dir: &Path, frames: &[Frame]) {
    clear_directory(dir);
    if let Err(e) = std::fs::create_dir_all(dir) {
        error!("❌ Cannot create scratch directory {:?}: {}", dir, e);
        return;
    }

    frames.par_iter().for_each(|frame| {
        let name = format!(
            "frame_{:05}_{}.png",
            frame.index,
            frame.timestamp.to_string().replace(':', "")
        );
        if let Err(e) = frame.save_png(&dir.join(&name)) {
            error!("❌ Failed to write {}: {}", name, e);
        }
    });
    info!("💾 Wrote {} frames to {:?}", frames.len(), dir);
}
