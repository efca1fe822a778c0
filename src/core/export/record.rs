use crate::core::error::{ReadoutError, Result};
use crate::core::video::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportRow {
    pub timestamp: Timestamp,
    pub value: u64,
    pub failure_rate: f32,
}

/// Rows ready to be encoded, independent of the output format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub digit_count: usize,
    pub rows: Vec<ExportRow>,
}

/// On-disk shape of one row. `value` keeps its leading zeros.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RowFields {
    pub timestamp: Timestamp,
    pub value: String,
    pub failure_rate: f32,
}

impl ExportRecord {
    pub fn from_series(
        values: &[u64],
        failure_rates: &[f32],
        timestamps: &[Timestamp],
        digit_count: usize,
    ) -> Result<Self> {
        if values.len() != failure_rates.len() || values.len() != timestamps.len() {
            return Err(ReadoutError::Validation(format!(
                "sequence lengths differ: {} values, {} failure rates, {} timestamps",
                values.len(),
                failure_rates.len(),
                timestamps.len()
            )));
        }

        let rows = values
            .iter()
            .zip(failure_rates)
            .zip(timestamps)
            .map(|((&value, &failure_rate), &timestamp)| ExportRow {
                timestamp,
                value,
                failure_rate,
            })
            .collect();

        Ok(Self { digit_count, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn to_fields(&self) -> Vec<RowFields> {
        self.rows
            .iter()
            .map(|row| RowFields {
                timestamp: row.timestamp,
                value: format!("{:0width$}", row.value, width = self.digit_count),
                failure_rate: row.failure_rate,
            })
            .collect()
    }

    /// Rebuild from parsed rows; the digit width is taken from the values.
    ///
    /// Artifacts carry no width outside the value column, so an artifact
    /// without rows reads back with `digit_count == 0`.
    pub(crate) fn from_fields(fields: Vec<RowFields>) -> Result<Self> {
        let digit_count = fields.first().map(|f| f.value.len()).unwrap_or(0);
        let mut rows = Vec::with_capacity(fields.len());

        for (line, field) in fields.into_iter().enumerate() {
            if field.value.len() != digit_count {
                return Err(ReadoutError::Validation(format!(
                    "row {}: value {:?} is not {} digits wide",
                    line, field.value, digit_count
                )));
            }
            let value = field.value.parse::<u64>().map_err(|_| {
                ReadoutError::Validation(format!("row {}: invalid value {:?}", line, field.value))
            })?;
            if !(0.0..=1.0).contains(&field.failure_rate) {
                return Err(ReadoutError::Validation(format!(
                    "row {}: failure rate {} outside [0, 1]",
                    line, field.failure_rate
                )));
            }
            rows.push(ExportRow {
                timestamp: field.timestamp,
                value,
                failure_rate: field.failure_rate,
            });
        }

        Ok(Self { digit_count, rows })
    }
}
