//! Global population table.
//!
//! One row per step, written by the root worker after the gather and
//! flushed immediately so a partial run still leaves a readable table.

use crate::error::SimError;
use metapop_core::Population;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column names, in order.
pub const HEADER: [&str; 5] = ["T", "S", "I", "R", "N"];

/// Global population at the end of one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct StepRecord {
    #[serde(rename = "T")]
    pub step: u64,
    pub S: f64,
    pub I: f64,
    pub R: f64,
    pub N: f64,
}

impl StepRecord {
    pub fn new(step: u64, population: Population) -> Self {
        Self {
            step,
            S: population.S,
            I: population.I,
            R: population.R,
            N: population.N(),
        }
    }

    pub fn population(&self) -> Population {
        Population::new(self.S, self.I, self.R)
    }
}

/// CSV writer for [`StepRecord`] rows.
pub struct PopulationOutput<W: Write> {
    writer: csv::Writer<W>,
}

impl PopulationOutput<File> {
    /// Creates (or truncates) the file at `path` and writes the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        Self::from_writer(File::create(path)?)
    }
}

impl<W: Write> PopulationOutput<W> {
    /// Wraps `inner` and writes the header.
    pub fn from_writer(inner: W) -> Result<Self, SimError> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Appends one row and flushes it.
    pub fn write(&mut self, record: &StepRecord) -> Result<(), SimError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> Result<W, SimError> {
        self.writer
            .into_inner()
            .map_err(|e| SimError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

/// Destination of the per-step global population.
pub trait RecordSink: Send {
    fn record(&mut self, record: &StepRecord) -> Result<(), SimError>;
}

impl<W: Write + Send> RecordSink for PopulationOutput<W> {
    fn record(&mut self, record: &StepRecord) -> Result<(), SimError> {
        self.write(record)
    }
}

impl<W: Write> std::fmt::Debug for PopulationOutput<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopulationOutput").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(records: &[StepRecord]) -> String {
        let mut output = PopulationOutput::from_writer(Vec::new()).unwrap();
        for record in records {
            output.write(record).unwrap();
        }
        String::from_utf8(output.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_header_only() {
        assert_eq!(render(&[]), "T,S,I,R,N\n");
    }

    #[test]
    fn test_rows_follow_header() {
        let text = render(&[
            StepRecord::new(0, Population::new(99.0, 1.0, 0.0)),
            StepRecord::new(1, Population::new(98.5, 1.25, 0.25)),
        ]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["T,S,I,R,N", "0,99.0,1.0,0.0,100.0", "1,98.5,1.25,0.25,100.0"]);
    }

    #[test]
    fn test_rows_read_back() {
        let record = StepRecord::new(7, Population::new(1.0 / 3.0, 2.0, 0.1));
        let text = render(&[record]);

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, HEADER);

        let loaded: StepRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.population(), Population::new(1.0 / 3.0, 2.0, 0.1));
    }

    #[test]
    fn test_file_output_is_flushed_per_row() {
        let path = std::env::temp_dir().join(format!("metapop-output-{}.csv", std::process::id()));
        let mut output = PopulationOutput::create(&path).unwrap();
        output.write(&StepRecord::new(0, Population::new(1.0, 0.0, 0.0))).unwrap();

        // Still open, the row is already on disk
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);

        drop(output);
        std::fs::remove_file(&path).unwrap();
    }
}
