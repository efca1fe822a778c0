//! 数码管读数会话 - 采样 + 识别 + 导出

use crate::core::classifier::{DigitClassifier, OnnxDigitClassifier, SegmentProbeClassifier};
use crate::core::config::{ClassifierConfig, RunConfig};
use crate::core::detection::{
    CancellationToken, DetectionEvent, DetectionPipeline, PipelineState, ResultAggregator,
    ResultSeries,
};
use crate::core::error::{ReadoutError, Result};
use crate::core::export::Exporter;
use crate::core::video::{ExtractOptions, FfmpegSource, Frame, FrameSampler, FrameSource};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Everything the caller hears about a run, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Sampled { frame_count: usize },
    Detection(DetectionEvent),
    Exported { path: PathBuf },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: PipelineState,
    pub series: ResultSeries,
    /// `None` when nothing was read, so nothing was written.
    pub artifact: Option<PathBuf>,
}

/// 一次视频读数任务
///
/// ```ignore
/// let session = ReadoutSession::new(RunConfig::from_file("run.json5")?)?;
/// let preview = session.preview()?;
/// let run = session.start()?;
/// for event in run.events().iter() { /* progress */ }
/// let summary = run.wait()?;
/// ```
pub struct ReadoutSession {
    config: RunConfig,
    source: Arc<dyn FrameSource>,
    cancel: CancellationToken,
}

impl ReadoutSession {
    /// Decode with the system ffmpeg.
    pub fn new(config: RunConfig) -> Result<Self> {
        Self::with_source(config, Arc::new(FfmpegSource::new()))
    }

    pub fn with_source(config: RunConfig, source: Arc<dyn FrameSource>) -> Result<Self> {
        crate::init_logging();
        config.sampling.validate()?;
        info!("📼 ReadoutSession: created for {:?}", config.video_path);
        Ok(Self {
            config,
            source,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token that stops this session's detection stage once the run starts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 获取预览帧（不裁剪），用于选择数码管区域
    pub fn preview(&self) -> Result<Frame> {
        let handle = self.source.open(&self.config.video_path)?;
        FrameSampler::new(self.source.as_ref(), self.config.sampling.clone()).preview(&handle)
    }

    /// Start with the classifier named in the config.
    pub fn start(self) -> Result<RunHandle> {
        let classifier = build_classifier(
            &self.config.classifier,
            self.config.sampling.digit_count,
        );
        self.start_with(classifier)
    }

    /// Start in the background with the given classifier.
    pub fn start_with(self, classifier: Box<dyn DigitClassifier>) -> Result<RunHandle> {
        let (tx, rx) = unbounded();
        let cancel = self.cancel.clone();

        let worker = thread::Builder::new()
            .name("readout-session".into())
            .spawn(move || {
                let result = self.run(classifier, &tx);
                if let Err(e) = &result {
                    error!("❌ Readout failed: {}", e);
                    let _ = tx.send(SessionEvent::Failed {
                        message: e.to_string(),
                    });
                }
                result
            })?;

        Ok(RunHandle {
            events: rx,
            cancel,
            worker: Some(worker),
        })
    }

    fn run(
        &self,
        mut classifier: Box<dyn DigitClassifier>,
        events: &Sender<SessionEvent>,
    ) -> Result<RunSummary> {
        let source = Arc::clone(&self.source);
        let video_path = self.config.video_path.clone();
        let spec = self.config.sampling.clone();
        let scratch_dir = self.config.scratch_dir.clone();
        let options = ExtractOptions {
            persist_frames: self.config.persist_frames,
            apply_crop: spec.crop_region.is_some(),
            single_frame_only: false,
        };

        let sampled = join_stage(spawn_stage("readout-sample", move || {
            let handle = source.open(&video_path)?;
            FrameSampler::new(source.as_ref(), spec)
                .with_scratch_dir(scratch_dir)
                .extract(&handle, options)
        })?)?;
        let _ = events.send(SessionEvent::Sampled {
            frame_count: sampled.len(),
        });

        let digit_count = self.config.sampling.digit_count;
        let cancel = self.cancel.clone();
        let mut aggregator = ResultAggregator::new(sampled.timestamps);
        let frames = sampled.frames;
        let (detect_tx, detect_rx) = unbounded();

        let detect = spawn_stage("readout-detect", move || {
            let mut pipeline = DetectionPipeline::with_token(digit_count, cancel);
            pipeline.start(frames, classifier.as_mut(), &detect_tx)
        })?;

        // Ends when the detect stage drops its sender.
        let mut relay_error = None;
        for event in detect_rx.iter() {
            if relay_error.is_none() {
                relay_error = aggregator.consume(&event).err();
            }
            let _ = events.send(SessionEvent::Detection(event));
        }
        let outcome = join_stage(detect)?;
        if let Some(e) = relay_error {
            return Err(e);
        }
        let series = aggregator.finish()?;

        let artifact = if series.is_empty() {
            info!("📭 No readings to export");
            None
        } else {
            let exporter = Exporter::from_config(&self.config.export, digit_count);
            let values = series.values.clone();
            let rates = series.failure_rates.clone();
            let timestamps = series.timestamps.clone();
            let path = join_stage(spawn_stage("readout-export", move || {
                let record = exporter.format(&values, &rates, &timestamps)?;
                exporter.export(&record)
            })?)?;
            let _ = events.send(SessionEvent::Exported { path: path.clone() });
            Some(path)
        };

        info!(
            "🎯 Readout {:?}: {} readings",
            outcome.state,
            series.len()
        );
        Ok(RunSummary {
            state: outcome.state,
            series,
            artifact,
        })
    }
}

impl Drop for ReadoutSession {
    fn drop(&mut self) {
        info!("🗑️ ReadoutSession: released");
    }
}

/// A running session.
pub struct RunHandle {
    events: Receiver<SessionEvent>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<Result<RunSummary>>>,
}

impl RunHandle {
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Stop before the next frame; readings so far are kept and exported.
    pub fn cancel(&self) {
        info!("🛑 Readout cancel requested");
        self.cancel.cancel();
    }

    /// Block until the run finishes.
    pub fn wait(mut self) -> Result<RunSummary> {
        match self.worker.take() {
            Some(worker) => join_stage(worker),
            None => Err(ReadoutError::Config("run already joined".into())),
        }
    }
}

pub fn build_classifier(config: &ClassifierConfig, digit_count: usize) -> Box<dyn DigitClassifier> {
    match config {
        ClassifierConfig::Onnx(model) => {
            Box::new(OnnxDigitClassifier::new(model.clone(), digit_count))
        }
        ClassifierConfig::SegmentProbe { inverted } => {
            Box::new(SegmentProbeClassifier::new(digit_count).inverted(*inverted))
        }
    }
}

fn spawn_stage<T, F>(name: &str, work: F) -> Result<JoinHandle<Result<T>>>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_string()).spawn(work)?)
}

fn join_stage<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    let name = handle.thread().name().unwrap_or("readout").to_string();
    handle.join().map_err(|_| {
        ReadoutError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("{} thread panicked", name),
        ))
    })?
}
