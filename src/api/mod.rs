pub mod readout;

pub use readout::{build_classifier, ReadoutSession, RunHandle, RunSummary, SessionEvent};
