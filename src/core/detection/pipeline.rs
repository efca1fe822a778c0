use crate::core::classifier::{DetectionResult, DigitClassifier};
use crate::core::detection::state::{PipelineInput, PipelineState};
use crate::core::error::{ReadoutError, Result};
use crate::core::video::{Frame, Timestamp};
use crossbeam_channel::Sender;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The digit whose all-positions reading means "display off".
pub const SENTINEL_DIGIT: char = '8';

/// Shared stop request, polled once per frame.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionEvent {
    Progress {
        index: usize,
        value: u64,
        failure_rate: f32,
        timestamp: Timestamp,
    },
    Completed {
        values: Vec<u64>,
    },
    Cancelled {
        values: Vec<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    pub state: PipelineState,
    pub values: Vec<u64>,
    pub failure_rates: Vec<f32>,
}

/// An all-`8` reading on a display with more than two digits means the
/// display is powered off, so the reading is marked as failed.
pub fn apply_blank_display_override(result: DetectionResult, digit_count: usize) -> DetectionResult {
    let sentinel: String = std::iter::repeat(SENTINEL_DIGIT).take(digit_count).collect();
    if digit_count > 2 && result.value.to_string() == sentinel {
        DetectionResult::new(result.value, 1.0)
    } else {
        result
    }
}

pub struct DetectionPipeline {
    digit_count: usize,
    state: PipelineState,
    cancel: CancellationToken,
}

impl DetectionPipeline {
    pub fn new(digit_count: usize) -> Self {
        Self::with_token(digit_count, CancellationToken::new())
    }

    pub fn with_token(digit_count: usize, cancel: CancellationToken) -> Self {
        Self {
            digit_count,
            state: PipelineState::new(),
            cancel,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop before the next frame. An in-flight frame finishes.
    pub fn cancel(&self) {
        info!("🛑 Detection cancel requested");
        self.cancel.cancel();
    }

    fn advance(&mut self, input: PipelineInput) -> Result<()> {
        self.state = self.state.transition(input).ok_or_else(|| {
            ReadoutError::Config(format!(
                "pipeline cannot handle {:?} while {:?}",
                input, self.state
            ))
        })?;
        Ok(())
    }

    /// Classify `frames` in order, streaming one `Progress` event per frame.
    ///
    /// The classifier is loaded first; a load failure aborts before any frame
    /// is touched and leaves the pipeline `Idle`.
    pub fn start(
        &mut self,
        frames: Vec<Frame>,
        classifier: &mut dyn DigitClassifier,
        events: &Sender<DetectionEvent>,
    ) -> Result<DetectionOutcome> {
        if self.state != PipelineState::Idle {
            return Err(ReadoutError::Config(format!(
                "pipeline already used (state {:?}); create a new one per run",
                self.state
            )));
        }

        classifier.load()?;
        self.advance(PipelineInput::Start)?;
        info!("🔍 Detection started: {} frames", frames.len());

        let mut values = Vec::with_capacity(frames.len());
        let mut failure_rates = Vec::with_capacity(frames.len());

        for frame in &frames {
            if self.cancel.is_cancelled() {
                self.advance(PipelineInput::CancelObserved)?;
                info!("🛑 Detection cancelled after {} frames", values.len());
                emit(
                    events,
                    DetectionEvent::Cancelled {
                        values: values.clone(),
                    },
                );
                return Ok(DetectionOutcome {
                    state: self.state,
                    values,
                    failure_rates,
                });
            }

            let result = match classifier.detect(frame) {
                Ok(result) => result,
                Err(e) => {
                    error!("❌ Frame {} classification failed: {}", frame.index, e);
                    DetectionResult::failed()
                }
            };
            let result = apply_blank_display_override(result, self.digit_count);

            debug!(
                "Frame {} [{}]: {} (failure rate {:.3})",
                frame.index,
                frame.timestamp,
                result.padded(self.digit_count),
                result.failure_rate
            );

            values.push(result.value);
            failure_rates.push(result.failure_rate);
            emit(
                events,
                DetectionEvent::Progress {
                    index: values.len() - 1,
                    value: result.value,
                    failure_rate: result.failure_rate,
                    timestamp: frame.timestamp,
                },
            );
            self.advance(PipelineInput::FrameProcessed)?;
        }

        self.advance(PipelineInput::FramesExhausted)?;
        info!("✅ Detection finished: {} readings", values.len());
        emit(
            events,
            DetectionEvent::Completed {
                values: values.clone(),
            },
        );
        Ok(DetectionOutcome {
            state: self.state,
            values,
            failure_rates,
        })
    }
}

/// Never blocks; a caller that stopped listening is not an error.
fn emit(events: &Sender<DetectionEvent>, event: DetectionEvent) {
    if events.send(event).is_err() {
        debug!("Event receiver dropped");
    }
}
