//! Record writers for converted output.
//!
//! Records are written either as NDJSON (one JSON object per line) or as a
//! single JSON array.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use thiserror::Error;

use crate::record::Record;

/// Error type for serialization operations
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Ndjson,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(OutputFormat::Ndjson),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format '{}', expected 'ndjson' or 'json'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Ndjson => write!(f, "ndjson"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Writes records in one of the [`OutputFormat`]s.
pub enum RecordWriter<W: Write> {
    Ndjson(NdjsonWriter<W>),
    Json(JsonArrayWriter<W>),
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Result<Self, SerializationError> {
        match format {
            OutputFormat::Ndjson => Ok(RecordWriter::Ndjson(NdjsonWriter::new(writer))),
            OutputFormat::Json => Ok(RecordWriter::Json(JsonArrayWriter::new(writer)?)),
        }
    }

    pub fn write(&mut self, record: &Record) -> Result<(), SerializationError> {
        match self {
            RecordWriter::Ndjson(w) => w.write(record),
            RecordWriter::Json(w) => w.write(record),
        }
    }

    /// Close the output (the array bracket for JSON) and flush.
    pub fn finish(self) -> Result<(), SerializationError> {
        match self {
            RecordWriter::Ndjson(mut w) => w.flush(),
            RecordWriter::Json(w) => w.finish(),
        }
    }
}

/// NDJSON (Newline Delimited JSON) writer
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single record as an NDJSON line
    pub fn write(&mut self, record: &Record) -> Result<(), SerializationError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a new JSON array writer and write the opening bracket
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
        })
    }

    pub fn write(&mut self, record: &Record) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        let json = serde_json::to_string(record)?;
        write!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Finish writing the array and close the bracket
    pub fn finish(mut self) -> Result<(), SerializationError> {
        writeln!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}
