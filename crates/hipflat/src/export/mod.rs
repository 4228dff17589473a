mod csv_file;
pub mod sheets;

pub use csv_file::{CsvConfig, CsvSink, default_file_name, read_csv, read_csv_file, write_csv};
pub use sheets::{DEFAULT_SHEET_NAME, SHEET_LABELS, SheetsConfig, SheetsSink};

use std::path::PathBuf;

use crate::types::ListingRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet authentication failed (HTTP {0})")]
    Unauthorized(u16),
    #[error("Spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),
    #[error("Spreadsheet API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected spreadsheet response: {0}")]
    Response(String),
    #[error("Refusing to overwrite the spreadsheet with an empty table")]
    EmptyTable,
    #[error("Invalid spreadsheet URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Outcome per configured sink; `None` means the sink was not configured.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub csv: Option<Result<PathBuf, SinkError>>,
    pub sheets: Option<Result<usize, SinkError>>,
}

impl ExportReport {
    pub fn all_ok(&self) -> bool {
        !matches!(self.csv, Some(Err(_))) && !matches!(self.sheets, Some(Err(_)))
    }
}

/// Writes the final table to every configured sink. A failing sink does not
/// prevent the others from running.
#[derive(Debug, Default)]
pub struct Exporter {
    csv: Option<CsvSink>,
    sheets: Option<SheetsSink>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_csv(mut self, sink: CsvSink) -> Self {
        self.csv = Some(sink);
        self
    }

    pub fn with_sheets(mut self, sink: SheetsSink) -> Self {
        self.sheets = Some(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.csv.is_none() && self.sheets.is_none()
    }

    pub async fn export(&self, records: &[ListingRecord]) -> ExportReport {
        let csv = self.csv.as_ref().map(|sink| {
            sink.write(records)
                .inspect_err(|e| log::error!("CSV export failed: {}", e))
        });

        let sheets = match &self.sheets {
            Some(sink) => Some(
                sink.write(records)
                    .await
                    .inspect_err(|e| log::error!("Spreadsheet export failed: {}", e)),
            ),
            None => None,
        };

        ExportReport { csv, sheets }
    }
}
