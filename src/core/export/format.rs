use crate::core::error::{ReadoutError, Result};
use crate::core::export::record::{ExportRecord, RowFields};
use serde::{Deserialize, Serialize};

pub const HEADER_FIELDS: [&str; 3] = ["timestamp", "value", "failure_rate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "tsv" => Some(ExportFormat::Tsv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    fn delimiter(&self) -> Option<char> {
        match self {
            ExportFormat::Csv => Some(','),
            ExportFormat::Tsv => Some('\t'),
            ExportFormat::Json => None,
        }
    }

    pub fn encode(&self, record: &ExportRecord) -> Result<String> {
        let fields = record.to_fields();
        let Some(sep) = self.delimiter() else {
            return Ok(serde_json::to_string_pretty(&fields)?);
        };

        let sep = sep.to_string();
        let mut out = HEADER_FIELDS.join(&sep);
        out.push('\n');
        for row in &fields {
            // f32 Display is the shortest form that parses back to the same value.
            out.push_str(&format!(
                "{}{sep}{}{sep}{}\n",
                row.timestamp,
                row.value,
                row.failure_rate,
                sep = sep
            ));
        }
        Ok(out)
    }

    pub fn decode(&self, text: &str) -> Result<ExportRecord> {
        let Some(sep) = self.delimiter() else {
            let fields: Vec<RowFields> = serde_json::from_str(text)?;
            return ExportRecord::from_fields(fields);
        };

        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<&str> = lines
            .next()
            .map(|l| l.split(sep).map(str::trim).collect())
            .unwrap_or_default();
        if header != HEADER_FIELDS {
            return Err(ReadoutError::Validation(format!(
                "unexpected header: {:?}",
                header
            )));
        }

        let mut fields = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let cols: Vec<&str> = line.split(sep).map(str::trim).collect();
            if cols.len() != HEADER_FIELDS.len() {
                return Err(ReadoutError::Validation(format!(
                    "row {}: expected {} columns, got {}",
                    line_no,
                    HEADER_FIELDS.len(),
                    cols.len()
                )));
            }
            let failure_rate = cols[2].parse::<f32>().map_err(|_| {
                ReadoutError::Validation(format!("row {}: invalid failure rate {:?}", line_no, cols[2]))
            })?;
            fields.push(RowFields {
                timestamp: cols[0].parse()?,
                value: cols[1].to_string(),
                failure_rate,
            });
        }
        ExportRecord::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::Timestamp;

    fn record() -> ExportRecord {
        ExportRecord::from_series(
            &[123, 9, 4567],
            &[0.1, 1.0, 0.0],
            &[
                Timestamp::from_seconds(0),
                Timestamp::from_seconds(5),
                Timestamp::from_seconds(3725),
            ],
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_csv_layout() {
        let text = ExportFormat::Csv.encode(&record()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,value,failure_rate");
        assert_eq!(lines[1], "00:00:00,0123,0.1");
        assert_eq!(lines[2], "00:00:05,0009,1");
        assert_eq!(lines[3], "01:02:05,4567,0");
    }

    #[test]
    fn test_tsv_uses_tabs() {
        let text = ExportFormat::Tsv.encode(&record()).unwrap();
        assert!(text.starts_with("timestamp\tvalue\tfailure_rate\n"));
        assert!(text.contains("00:00:00\t0123\t0.1"));
    }

    #[test]
    fn test_text_formats_read_back() {
        for format in [ExportFormat::Csv, ExportFormat::Tsv, ExportFormat::Json] {
            let text = format.encode(&record()).unwrap();
            assert_eq!(format.decode(&text).unwrap(), record(), "{:?}", format);
        }
    }

    #[test]
    fn test_json_rows_are_objects() {
        let text = ExportFormat::Json.encode(&record()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["value"], "0123");
        assert_eq!(parsed[2]["timestamp"], "01:02:05");
    }

    #[test]
    fn test_header_only_artifact_reads_back_empty() {
        let empty = ExportRecord::from_series(&[], &[], &[], 4).unwrap();
        for format in [ExportFormat::Csv, ExportFormat::Tsv, ExportFormat::Json] {
            let text = format.encode(&empty).unwrap();
            let decoded = format.decode(&text).unwrap();
            assert!(decoded.is_empty(), "{:?}", format);
            assert_eq!(decoded.digit_count, 0);
        }
    }

    #[test]
    fn test_bad_header_rejected() {
        let err = ExportFormat::Csv.decode("a,b,c\n").unwrap_err();
        assert!(matches!(err, ReadoutError::Validation(_)));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let text = "timestamp,value,failure_rate\n0:0,0123,0.1\n";
        assert!(ExportFormat::Csv.decode(text).is_err());
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(ExportFormat::from_extension("CSV"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::from_extension("xlsx"), None);
        assert_eq!(ExportFormat::default(), ExportFormat::Csv);
    }
}
