//! `ffprobe`/`ffmpeg` command-line backed frame source.

use crate::core::error::{ReadoutError, Result};
use crate::core::video::frame::{Frame, Timestamp};
use crate::core::video::source::{FrameSource, VideoHandle};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

static FFMPEG_BIN: Lazy<String> =
    Lazy::new(|| std::env::var("SEGMENT_READOUT_FFMPEG").unwrap_or_else(|_| "ffmpeg".into()));

static FFPROBE_BIN: Lazy<String> =
    Lazy::new(|| std::env::var("SEGMENT_READOUT_FFPROBE").unwrap_or_else(|_| "ffprobe".into()));

static PROBE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*([a-z_]+)=(.*?)\s*$").expect("probe line pattern is valid")
});

#[derive(Debug, Default)]
pub struct FfmpegSource;

impl FfmpegSource {
    pub fn new() -> Self {
        Self
    }

    fn run(program: &str, args: &[String]) -> Result<Vec<u8>> {
        debug!("▶️ {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output().map_err(|e| {
            error!("❌ Failed to spawn {}: {}", program, e);
            ReadoutError::Video(format!("failed to run {}: {}", program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReadoutError::Video(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Parse `key=value` lines emitted by `ffprobe -of default=noprint_wrappers=1`.
pub(crate) fn parse_probe_output(path: &Path, text: &str) -> Result<VideoHandle> {
    let fields: HashMap<&str, &str> = PROBE_LINE
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let parse_u32 = |key: &str| -> Result<u32> {
        probe_field(&fields, key)?
            .parse()
            .map_err(|_| ReadoutError::Video(format!("invalid {} in probe output", key)))
    };

    let duration_secs: f64 = probe_field(&fields, "duration")?
        .parse()
        .map_err(|_| ReadoutError::Video("invalid duration in probe output".into()))?;
    let duration = Duration::try_from_secs_f64(duration_secs)
        .map_err(|_| ReadoutError::Video(format!("invalid duration {}", duration_secs)))?;

    Ok(VideoHandle {
        path: path.to_path_buf(),
        duration,
        frame_rate: parse_frame_rate(probe_field(&fields, "r_frame_rate")?)?,
        width: parse_u32("width")?,
        height: parse_u32("height")?,
    })
}

fn probe_field<'a>(fields: &HashMap<&str, &'a str>, key: &str) -> Result<&'a str> {
    fields
        .get(key)
        .copied()
        .ok_or_else(|| ReadoutError::Video(format!("ffprobe did not report {}", key)))
}

/// `30000/1001` style rational or a plain number.
fn parse_frame_rate(text: &str) -> Result<f64> {
    let invalid = || ReadoutError::Video(format!("invalid frame rate {:?}", text));
    let rate = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().map_err(|_| invalid())?;
            let den: f64 = den.trim().parse().map_err(|_| invalid())?;
            if den == 0.0 {
                return Err(invalid());
            }
            num / den
        }
        None => text.trim().parse().map_err(|_| invalid())?,
    };
    Ok(rate)
}

impl FrameSource for FfmpegSource {
    fn open(&self, path: &Path) -> Result<VideoHandle> {
        if !path.is_file() {
            return Err(ReadoutError::Video(format!("video not found: {:?}", path)));
        }

        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height,r_frame_rate:format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let stdout = Self::run(&FFPROBE_BIN, &args)?;
        let handle = parse_probe_output(path, &String::from_utf8_lossy(&stdout))?;

        info!(
            "🎬 Opened {:?}: {}x{}, {:.2} fps, {:.1}s",
            path,
            handle.width,
            handle.height,
            handle.frame_rate,
            handle.duration.as_secs_f64()
        );
        Ok(handle)
    }

    fn grab(&self, handle: &VideoHandle, offset: Duration) -> Result<Frame> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", offset.as_secs_f64()),
            "-i".to_string(),
            handle.path.to_string_lossy().into_owned(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "png".to_string(),
            "-".to_string(),
        ];
        let png = Self::run(&FFMPEG_BIN, &args)?;
        if png.is_empty() {
            return Err(ReadoutError::Video(format!(
                "no frame decoded at {:.3}s",
                offset.as_secs_f64()
            )));
        }

        let image = image::load_from_memory_with_format(&png, image::ImageFormat::Png)?;
        Ok(Frame::new(image.to_rgba8(), Timestamp::from_offset(offset), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let text = "width=1280\nheight=720\nr_frame_rate=30000/1001\nduration=20.000000\n";
        let handle = parse_probe_output(Path::new("a.mp4"), text).unwrap();

        assert_eq!(handle.width, 1280);
        assert_eq!(handle.height, 720);
        assert!((handle.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(handle.duration, Duration::from_secs(20));
    }

    #[test]
    fn test_parse_probe_output_missing_duration() {
        let text = "width=1280\nheight=720\nr_frame_rate=25/1\n";
        let err = parse_probe_output(Path::new("a.mp4"), text).unwrap_err();
        assert!(matches!(err, ReadoutError::Video(_)));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1").unwrap(), 25.0);
        assert_eq!(parse_frame_rate("24").unwrap(), 24.0);
        assert!(parse_frame_rate("1/0").is_err());
        assert!(parse_frame_rate("abc").is_err());
    }

    #[test]
    fn test_open_missing_video() {
        let err = FfmpegSource::new()
            .open(Path::new("/nonexistent/video.mp4"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Io);
    }
}
