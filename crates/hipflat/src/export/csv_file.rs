use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use csv::{ReaderBuilder, WriterBuilder};

use super::SinkError;
use crate::types::ListingRecord;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct CsvConfig {
    pub dir: PathBuf,
    /// Fixed file name; a timestamped one is generated when `None`.
    pub file_name: Option<String>,
    /// Prefix the file with a UTF-8 byte order mark so spreadsheet
    /// applications pick the right encoding.
    pub bom: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_name: None,
            bom: true,
        }
    }
}

pub fn default_file_name(now: DateTime<Local>) -> String {
    format!("hipflat_pattaya_apartments_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Writes the header row followed by one row per record. An empty table
/// still produces the header.
pub fn write_csv<W: Write>(
    mut writer: W,
    records: &[ListingRecord],
    bom: bool,
) -> Result<(), SinkError> {
    if bom {
        writer.write_all(UTF8_BOM)?;
    }

    let mut csv = WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(ListingRecord::HEADER)?;
    for record in records {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn read_csv<R: Read>(mut reader: R) -> Result<Vec<ListingRecord>, SinkError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes.as_slice());

    let mut csv = ReaderBuilder::new().from_reader(content);
    let records = csv.deserialize().collect::<Result<Vec<ListingRecord>, _>>()?;
    Ok(records)
}

pub fn read_csv_file(path: &Path) -> Result<Vec<ListingRecord>, SinkError> {
    read_csv(File::open(path)?)
}

#[derive(Debug, Clone)]
pub struct CsvSink {
    config: CsvConfig,
}

impl CsvSink {
    pub fn new(config: CsvConfig) -> Self {
        Self { config }
    }

    pub fn target_path(&self, now: DateTime<Local>) -> PathBuf {
        let name = self
            .config
            .file_name
            .clone()
            .unwrap_or_else(|| default_file_name(now));
        self.config.dir.join(name)
    }

    pub fn write(&self, records: &[ListingRecord]) -> Result<PathBuf, SinkError> {
        let path = self.target_path(Local::now());
        fs::create_dir_all(&self.config.dir)?;

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        write_csv(&mut writer, records, self.config.bom)?;
        writer.flush()?;

        log::info!("Saved {} row(s) to {}", records.len(), path.display());
        Ok(path)
    }
}
