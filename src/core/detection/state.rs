/// Lifecycle of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// What the run loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineInput {
    Start,
    FrameProcessed,
    CancelObserved,
    FramesExhausted,
}

impl PipelineState {
    pub fn new() -> Self {
        PipelineState::Idle
    }

    /// Next state, or `None` when `input` is not valid in this state.
    pub fn transition(&self, input: PipelineInput) -> Option<PipelineState> {
        match (self, input) {
            (PipelineState::Idle, PipelineInput::Start) => Some(PipelineState::Running),
            (PipelineState::Running, PipelineInput::FrameProcessed) => {
                Some(PipelineState::Running)
            }
            (PipelineState::Running, PipelineInput::CancelObserved) => {
                Some(PipelineState::Cancelled)
            }
            (PipelineState::Running, PipelineInput::FramesExhausted) => {
                Some(PipelineState::Completed)
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Cancelled)
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
