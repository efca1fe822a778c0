use crate::core::detection::pipeline::DetectionEvent;
use crate::core::error::{ReadoutError, Result};
use crate::core::video::Timestamp;
use log::{info, warn};

/// Index-aligned readings; the three vectors always have equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSeries {
    pub values: Vec<u64>,
    pub failure_rates: Vec<f32>,
    pub timestamps: Vec<Timestamp>,
}

impl ResultSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_aligned(&self) -> bool {
        self.values.len() == self.failure_rates.len()
            && self.values.len() == self.timestamps.len()
    }

    fn push(&mut self, value: u64, failure_rate: f32, timestamp: Timestamp) {
        self.values.push(value);
        self.failure_rates.push(failure_rate);
        self.timestamps.push(timestamp);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Builds a `ResultSeries` from the pipeline's event stream.
pub struct ResultAggregator {
    planned: Vec<Timestamp>,
    series: ResultSeries,
    status: AggregateStatus,
}

impl ResultAggregator {
    /// `planned` is the full timestamp sequence of the sampled frames.
    pub fn new(planned: Vec<Timestamp>) -> Self {
        Self {
            series: ResultSeries {
                values: Vec::with_capacity(planned.len()),
                failure_rates: Vec::with_capacity(planned.len()),
                timestamps: Vec::with_capacity(planned.len()),
            },
            planned,
            status: AggregateStatus::Pending,
        }
    }

    pub fn status(&self) -> AggregateStatus {
        self.status
    }

    pub fn series(&self) -> &ResultSeries {
        &self.series
    }

    pub fn consume(&mut self, event: &DetectionEvent) -> Result<()> {
        if self.status != AggregateStatus::Pending {
            return Err(ReadoutError::Validation(format!(
                "event after run finished ({:?})",
                self.status
            )));
        }

        match event {
            DetectionEvent::Progress {
                index,
                value,
                failure_rate,
                timestamp,
            } => {
                if *index != self.series.len() {
                    return Err(ReadoutError::Validation(format!(
                        "progress event {} out of order, expected {}",
                        index,
                        self.series.len()
                    )));
                }
                if let Some(expected) = self.planned.get(*index) {
                    if expected != timestamp {
                        warn!(
                            "⚠️ Event {} timestamp {} differs from planned {}",
                            index, timestamp, expected
                        );
                    }
                }
                self.series.push(*value, *failure_rate, *timestamp);
            }
            DetectionEvent::Completed { values } => {
                self.check_values(values)?;
                if self.series.len() != self.planned.len() {
                    return Err(ReadoutError::Validation(format!(
                        "completed with {} readings for {} frames",
                        self.series.len(),
                        self.planned.len()
                    )));
                }
                self.status = AggregateStatus::Completed;
            }
            DetectionEvent::Cancelled { values } => {
                self.check_values(values)?;
                let kept = self.series.len().min(self.planned.len());
                self.series.timestamps = self.planned[..kept].to_vec();
                self.status = AggregateStatus::Cancelled;
                info!(
                    "✂️ Cancelled run: kept {} of {} planned timestamps",
                    kept,
                    self.planned.len()
                );
            }
        }
        Ok(())
    }

    fn check_values(&self, values: &[u64]) -> Result<()> {
        if values != self.series.values.as_slice() {
            return Err(ReadoutError::Validation(format!(
                "final values ({}) disagree with streamed progress ({})",
                values.len(),
                self.series.len()
            )));
        }
        Ok(())
    }

    /// The finished series. Fails while the run is still pending.
    pub fn finish(self) -> Result<ResultSeries> {
        if self.status == AggregateStatus::Pending {
            return Err(ReadoutError::Validation(
                "detection run has not finished".into(),
            ));
        }
        if !self.series.is_aligned() {
            return Err(ReadoutError::Validation("result series misaligned".into()));
        }
        Ok(self.series)
    }
}
