use std::io::Write;

use dift_core::error::DiftError;
use serde::{Deserialize, Serialize};

/// Analysis state right after an address was marked or unmarked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Instructions executed so far.
    pub executed: u64,
    /// Currently marked addresses.
    pub addr_mem: usize,
    /// Distinct addresses accessed so far.
    pub addr_any: usize,
    /// Address of the instruction that caused the change.
    pub ins_addr: u64,
    pub exhaustion: usize,
    pub img: String,
    pub rtn: String,
}

/// Final result of a replay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of marked addresses.
    pub tracked: usize,
    /// Number of distinct accessed addresses.
    pub accessed: usize,
    pub exhaustion: usize,
    /// Marked addresses in ascending order.
    pub addresses: Vec<u64>,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    #[display(fmt = "csv")]
    Csv,
    #[display(fmt = "json")]
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = DiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            other => Err(DiftError::Config(format!("unknown report format: {}", other))),
        }
    }
}

pub const CSV_HEADER: &str = "executed,addr_mem,addr_any,ins_addr,exhaustion,img,rtn";

/// Writes state records and the final summary in the selected format.
pub struct ReportWriter<W: Write> {
    out: W,
    format: ReportFormat,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: ReportFormat) -> Self {
        Self { out, format }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    pub fn header(&mut self) -> Result<(), DiftError> {
        match self.format {
            ReportFormat::Csv => writeln!(self.out, "{}", CSV_HEADER)?,
            ReportFormat::Json => {}
        }
        Ok(())
    }

    pub fn record(&mut self, record: &StateRecord) -> Result<(), DiftError> {
        match self.format {
            ReportFormat::Csv => writeln!(
                self.out,
                "{},{},{},{:#x},{},{},{}",
                record.executed,
                record.addr_mem,
                record.addr_any,
                record.ins_addr,
                record.exhaustion,
                csv_field(&record.img),
                csv_field(&record.rtn),
            )?,
            ReportFormat::Json => self.json_line(record)?,
        }
        Ok(())
    }

    pub fn summary(&mut self, summary: &Summary) -> Result<(), DiftError> {
        match self.format {
            ReportFormat::Csv => {
                writeln!(
                    self.out,
                    "{} addresses out of {}; {} exhaustion",
                    summary.tracked, summary.accessed, summary.exhaustion
                )?;
                for address in summary.addresses.iter() {
                    writeln!(self.out, "{:#x}", address)?;
                }
            }
            ReportFormat::Json => self.json_line(summary)?,
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn json_line<T: Serialize>(&mut self, value: &T) -> Result<(), DiftError> {
        serde_json::to_writer(&mut self.out, value)
            .map_err(|e| DiftError::Io(e.into()))?;
        writeln!(self.out)?;
        Ok(())
    }
}

/// Quote a field if it contains a separator, a quote or a line break.
fn csv_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}
