pub mod aggregator;
pub mod pipeline;
pub mod state;

pub use aggregator::{AggregateStatus, ResultAggregator, ResultSeries};
pub use pipeline::{
    apply_blank_display_override, CancellationToken, DetectionEvent, DetectionOutcome,
    DetectionPipeline,
};
pub use state::PipelineState;
