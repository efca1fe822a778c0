pub mod exporter;
pub mod format;
pub mod record;

pub use exporter::{is_directory_writable, now_stamp, read_back, Exporter};
pub use format::ExportFormat;
pub use record::{ExportRecord, ExportRow};
