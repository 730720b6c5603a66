//! JSON and CSV exporters for the aggregated result set

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn exporter(self) -> Box<dyn Exporter> {
        match self {
            Self::Json => Box::new(JsonExporter),
            Self::Csv => Box::new(CsvExporter),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => anyhow::bail!("unknown export format '{other}' (expected json or csv)"),
        }
    }
}

pub trait Exporter: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Write `records` to `writer`; returns whether anything was written
    fn write(&self, records: &[Record], writer: &mut dyn Write) -> Result<bool>;

    /// Write to `path`. No file is created when the exporter writes nothing.
    fn export_to_path(&self, records: &[Record], path: &Path) -> Result<bool> {
        let mut buffer = Vec::new();
        if !self.write(records, &mut buffer)? {
            debug!("nothing to export to {}", path.display());
            return Ok(false);
        }

        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&buffer)
            .and_then(|()| writer.flush())
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(true)
    }
}

/// Pretty JSON array with every field in record order
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn write(&self, records: &[Record], writer: &mut dyn Write) -> Result<bool> {
        serde_json::to_writer_pretty(&mut *writer, records).context("failed to serialize records")?;
        writer.write_all(b"\n")?;
        Ok(true)
    }
}

/// CSV with a header row taken from the record field names
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn write(&self, records: &[Record], writer: &mut dyn Write) -> Result<bool> {
        if records.is_empty() {
            return Ok(false);
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        for record in records {
            csv_writer.serialize(record).context("failed to serialize record")?;
        }
        csv_writer.flush()?;
        Ok(true)
    }
}

/// Write every requested format as `<output_dir>/<basename>.<ext>`
pub fn export_all(
    records: &[Record],
    formats: &[ExportFormat],
    output_dir: &Path,
    basename: &str,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let mut written = Vec::new();
    for format in formats {
        let path = output_dir.join(format!("{basename}.{}", format.extension()));
        if format.exporter().export_to_path(records, &path)? {
            info!("saved {} records to {}", records.len(), path.display());
            written.push(path);
        }
    }
    Ok(written)
}
