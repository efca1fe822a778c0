pub mod ffmpeg;
pub mod frame;
pub mod sampler;
pub mod source;
pub mod synthetic;

pub use ffmpeg::FfmpegSource;
pub use frame::{Frame, Timestamp};
pub use sampler::{ExtractOptions, FrameSampler, SampledFrames};
pub use source::{FrameSource, VideoHandle};
pub use synthetic::SyntheticSource;
