//! Rendered seven-segment "videos" for tests and demos.

use crate::core::classifier::segment::{box_pixels, DIGIT_PATTERNS, SEGMENT_BOXES};
use crate::core::config::CropRegion;
use crate::core::error::{ReadoutError, Result};
use crate::core::video::frame::{Frame, Timestamp};
use crate::core::video::source::{FrameSource, VideoHandle};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const BACKGROUND: Rgba<u8> = Rgba([20, 20, 20, 255]);
const LIT: Rgba<u8> = Rgba([230, 230, 230, 255]);

/// Draw `text` as lit segments, one `cell_width` x `cell_height` cell per
/// character. Digits are drawn, anything else leaves the cell dark.
pub fn render_display(text: &str, cell_width: u32, cell_height: u32) -> RgbaImage {
    let chars: Vec<char> = text.chars().collect();
    let mut image = RgbaImage::from_pixel(
        cell_width * chars.len().max(1) as u32,
        cell_height,
        BACKGROUND,
    );

    for (cell, ch) in chars.iter().enumerate() {
        let Some(digit) = ch.to_digit(10) else {
            continue;
        };
        let pattern = DIGIT_PATTERNS[digit as usize];
        let origin_x = cell as u32 * cell_width;
        for (segment, &rel) in SEGMENT_BOXES.iter().enumerate() {
            if pattern & (1 << segment) == 0 {
                continue;
            }
            let (x, y, w, h) = box_pixels(rel, cell_width, cell_height);
            for py in y..y + h {
                for px in x..x + w {
                    image.put_pixel(origin_x + px, py, LIT);
                }
            }
        }
    }
    image
}

type DisplayFn = Box<dyn Fn(Duration) -> String + Send + Sync>;

/// A frame source whose frames show a rendered display on a dark canvas.
pub struct SyntheticSource {
    duration: Duration,
    frame_rate: f64,
    canvas: (u32, u32),
    origin: (u32, u32),
    cell: (u32, u32),
    display: DisplayFn,
    grabs: AtomicUsize,
}

impl SyntheticSource {
    /// A display showing the same text for the whole video.
    pub fn constant(text: &str, duration: Duration) -> Self {
        let text = text.to_string();
        Self::with_display(duration, move |_| text.clone())
    }

    pub fn with_display<F>(duration: Duration, display: F) -> Self
    where
        F: Fn(Duration) -> String + Send + Sync + 'static,
    {
        Self {
            duration,
            frame_rate: 30.0,
            canvas: (320, 180),
            origin: (40, 50),
            cell: (40, 70),
            display: Box::new(display),
            grabs: AtomicUsize::new(0),
        }
    }

    /// Where the display sits on the canvas for `digit_count` digits.
    pub fn display_region(&self, digit_count: usize) -> CropRegion {
        CropRegion::new(
            self.origin.0,
            self.origin.1,
            self.cell.0 * digit_count as u32,
            self.cell.1,
        )
    }

    /// Number of frames decoded so far.
    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl FrameSource for SyntheticSource {
    fn open(&self, path: &Path) -> Result<VideoHandle> {
        Ok(VideoHandle {
            path: path.to_path_buf(),
            duration: self.duration,
            frame_rate: self.frame_rate,
            width: self.canvas.0,
            height: self.canvas.1,
        })
    }

    fn grab(&self, handle: &VideoHandle, offset: Duration) -> Result<Frame> {
        if offset > handle.duration {
            return Err(ReadoutError::Video(format!(
                "offset {:.3}s past end of video",
                offset.as_secs_f64()
            )));
        }
        self.grabs.fetch_add(1, Ordering::SeqCst);

        let text = (self.display)(offset);
        let display = render_display(&text, self.cell.0, self.cell.1);
        let mut image = RgbaImage::from_pixel(self.canvas.0, self.canvas.1, BACKGROUND);
        image::imageops::overlay(
            &mut image,
            &display,
            self.origin.0 as i64,
            self.origin.1 as i64,
        );
        Ok(Frame::new(image, Timestamp::from_offset(offset), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_display_size() {
        let image = render_display("0123", 40, 70);
        assert_eq!(image.width(), 160);
        assert_eq!(image.height(), 70);
    }

    #[test]
    fn test_blank_cells_stay_dark() {
        let image = render_display("  ", 40, 70);
        assert!(image.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn test_grab_counts_and_stamps() {
        let source = SyntheticSource::constant("12", Duration::from_secs(10));
        let handle = source.open(Path::new("synthetic")).unwrap();

        let frame = source.grab(&handle, Duration::from_secs(4)).unwrap();
        assert_eq!(frame.timestamp.to_string(), "00:00:04");
        assert_eq!(frame.width(), 320);
        assert_eq!(source.grab_count(), 1);

        assert!(source.grab(&handle, Duration::from_secs(11)).is_err());
    }
}
