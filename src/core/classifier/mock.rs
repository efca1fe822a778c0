use super::{DetectionResult, DigitClassifier};
use crate::core::error::{ReadoutError, Result};
use crate::core::video::Frame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type ResultFn = Box<dyn Fn(usize) -> DetectionResult + Send + Sync>;
type DetectHook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted classifier: the reading is a function of the frame index.
pub struct MockDigitClassifier {
    pattern: ResultFn,
    on_detect: Option<DetectHook>,
    fail_load: bool,
    loaded: bool,
    load_calls: usize,
    detect_calls: Arc<AtomicUsize>,
}

impl MockDigitClassifier {
    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(usize) -> DetectionResult + Send + Sync + 'static,
    {
        Self {
            pattern: Box::new(pattern),
            on_detect: None,
            fail_load: false,
            loaded: false,
            load_calls: 0,
            detect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_fixed(value: u64, failure_rate: f32) -> Self {
        Self::with_pattern(move |_| DetectionResult::new(value, failure_rate))
    }

    pub fn with_sequence(results: Vec<DetectionResult>) -> Self {
        Self::with_pattern(move |index| {
            results
                .get(index)
                .copied()
                .unwrap_or_else(DetectionResult::failed)
        })
    }

    /// Run `hook` after each detection with the frame index.
    pub fn on_detect<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_detect = Some(Box::new(hook));
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Shared counter of `detect` calls, readable after the classifier moved.
    pub fn detect_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.detect_calls)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls
    }
}

impl DigitClassifier for MockDigitClassifier {
    fn load(&mut self) -> Result<()> {
        self.load_calls += 1;
        if self.fail_load {
            return Err(ReadoutError::ModelLoadFailed("mock model missing".into()));
        }
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
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.pattern)(frame.index);
        if let Some(hook) = &self.on_detect {
            hook(frame.index);
        }
        Ok(result)
    }
}
