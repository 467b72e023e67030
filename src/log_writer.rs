use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::sample::Sample;
use crate::transport::MediumUnit;

pub const DEFAULT_LOG_DIR: &str = "log";

/// Header row of a day file, with flow columns labelled in `unit_label`.
pub fn log_header(unit_label: &str) -> [String; 5] {
    [
        "Unix Timestamp (UTC)".to_string(),
        format!("Setpoint ({unit_label})"),
        format!("Measured Value ({unit_label})"),
        "Temperature (C)".to_string(),
        "Device Status".to_string(),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of a day file. Field order is the on-disk column order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub unix_timestamp: f64,
    pub setpoint: f64,
    pub measured: f64,
    pub temperature: f64,
    pub status: u32,
}

impl LogRecord {
    /// The sample time this record was written for.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let micros = (self.unix_timestamp * 1_000_000.0).round() as i64;
        DateTime::from_timestamp_micros(micros)
    }
}

impl From<&Sample> for LogRecord {
    fn from(sample: &Sample) -> Self {
        Self {
            unix_timestamp: sample.unix_timestamp(),
            setpoint: sample.setpoint(),
            measured: sample.measured(),
            temperature: sample.temperature(),
            status: sample.status().mask(),
        }
    }
}

/// Appends records to one CSV file per calendar day.
///
/// Every call opens, writes, flushes and closes the file, so nothing is held open between
/// samples and a crash loses at most the record being written.
///
/// Flow columns are labelled in sccm unless [`LogWriter::with_unit`] says otherwise. The
/// header of an existing day file is never rewritten.
#[derive(Debug, Clone)]
pub struct LogWriter {
    dir: PathBuf,
    unit_label: String,
}

impl LogWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            unit_label: MediumUnit::default().abbreviation(),
        }
    }

    pub fn with_unit(mut self, unit: &MediumUnit) -> Self {
        self.unit_label = unit.abbreviation();
        self
    }

    pub fn header(&self) -> [String; 5] {
        log_header(&self.unit_label)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("{}_sfc5500_log.csv", date.format("%Y-%m-%d"))
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name(date))
    }

    /// Append to today's file (local calendar date).
    pub fn append(&self, record: &LogRecord) -> Result<PathBuf, LogError> {
        self.append_on(Local::now().date_naive(), record)
    }

    pub fn append_on(&self, date: NaiveDate, record: &LogRecord) -> Result<PathBuf, LogError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(date);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        // An empty file is a new day file, also when a previous run created it and died
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(self.header())?;
        }
        writer.serialize(record)?;
        writer.flush()?;

        Ok(path)
    }
}

/// Parse a day file back into records, by column position.
pub fn read_day_file(path: &Path) -> Result<Vec<LogRecord>, LogError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(file);

    let mut records = Vec::new();
    for row in reader.records() {
        records.push(row?.deserialize(None)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::DeviceStatus;
    use crate::transport::{FlowUnit, TimeBase, UnitPrefix};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn record(measured: f64) -> LogRecord {
        LogRecord {
            unix_timestamp: 1_709_980_000.25,
            setpoint: 12.5,
            measured,
            temperature: 23.4,
            status: 5,
        }
    }

    #[test]
    fn test_file_name_from_date() {
        assert_eq!(LogWriter::file_name(date()), "2024-03-09_sfc5500_log.csv");
    }

    #[test]
    fn test_header_written_once_per_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = LogWriter::new(dir.path().join("log"));

        let path = writer.append_on(date(), &record(1.0)).unwrap();
        writer.append_on(date(), &record(2.0)).unwrap();

        // a restarted process writes through a fresh writer
        let restarted = LogWriter::new(dir.path().join("log"));
        restarted.append_on(date(), &record(3.0)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Unix Timestamp (UTC),Setpoint (sccm),Measured Value (sccm),Temperature (C),Device Status"
        );
        assert_eq!(contents.matches("Unix Timestamp").count(), 1);
        assert_eq!(lines[1], "1709980000.25,12.5,1.0,23.4,5");
    }

    #[test]
    fn test_days_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let writer = LogWriter::new(dir.path());
        let next_day = date().succ_opt().unwrap();

        let first = writer.append_on(date(), &record(1.0)).unwrap();
        let second = writer.append_on(next_day, &record(2.0)).unwrap();

        assert_ne!(first, second);
        assert_eq!(read_day_file(&first).unwrap(), vec![record(1.0)]);
        assert_eq!(read_day_file(&second).unwrap(), vec![record(2.0)]);
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = LogWriter::new(dir.path());

        let timestamp = DateTime::from_timestamp_micros(1_709_980_123_456_789).unwrap();
        let sample = Sample::new(
            timestamp,
            33.333_333_333_333_336,
            0.1 + 0.2,
            -273.15,
            DeviceStatus::new(1024 | 32),
        );
        let written = LogRecord::from(&sample);
        let path = writer.append_on(date(), &written).unwrap();

        let read = read_day_file(&path).unwrap();
        assert_eq!(read.len(), 1);
        let parsed = read[0];
        assert_eq!(parsed.unix_timestamp.to_bits(), sample.unix_timestamp().to_bits());
        assert_eq!(parsed.setpoint.to_bits(), sample.setpoint().to_bits());
        assert_eq!(parsed.measured.to_bits(), sample.measured().to_bits());
        assert_eq!(parsed.temperature.to_bits(), sample.temperature().to_bits());
        assert_eq!(parsed.status, sample.status().mask());
        assert_eq!(parsed.timestamp(), Some(sample.timestamp()));
    }

    #[test]
    fn test_header_labels_configured_unit() {
        let dir = tempfile::tempdir().unwrap();
        let unit = MediumUnit {
            prefix: UnitPrefix::Base,
            unit: FlowUnit::Liter,
            time_base: TimeBase::Hour,
        };
        let writer = LogWriter::new(dir.path()).with_unit(&unit);

        let path = writer.append_on(date(), &record(1.0)).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next(),
            Some("Unix Timestamp (UTC),Setpoint (l/h),Measured Value (l/h),Temperature (C),Device Status")
        );
        assert_eq!(read_day_file(&path).unwrap(), vec![record(1.0)]);
    }

    #[test]
    fn test_unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let writer = LogWriter::new(&blocker);
        assert!(matches!(
            writer.append_on(date(), &record(1.0)),
            Err(LogError::Io(_))
        ));
    }
}
