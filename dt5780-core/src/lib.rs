//! List-mode decoder library for CAEN DT5780 digitizers.
//!
//! This crate decodes the flat binary list-mode files written by the DT5780
//! acquisition software: a concatenation of records built from little-endian
//! 16-bit words, with no header, terminator or checksum. Each record is handed
//! to a [`RowSink`] that stores it as one row of a column store.
//!
//! # Example
//!
//! ```no_run
//! use dt5780_core::{convert, FormatFlags, OutputFormat};
//!
//! let flags = FormatFlags::new(false, true);
//! let summary = convert("run_042.bin", "run_042.dtc", OutputFormat::Columnar, flags, |_| {})
//!     .unwrap();
//!
//! println!("Decoded {} records", summary.records);
//! ```
//!
//! # Record layout
//!
//! | words | field |
//! |---|---|
//! | 1 | board |
//! | 1 | channel |
//! | 4 | timestamp (48 bit) |
//! | 1 | charge |
//! | 4 | energy (f64, calibrated files only) |
//! | 2 | flags |
//! | 2 | sample count |
//! | n | waveform samples |
//!
//! Multi-word fields are stored least-significant word first.

pub mod config;
pub mod convert;
pub mod decoder;
pub mod parser;
pub mod sink;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use convert::{convert, convert_words, ConvertError};
pub use decoder::{DecodeError, Field, RecordDecoder, Records};
pub use sink::{ColumnarFile, ColumnarWriter, CsvWriter, OutputError, OutputFormat, RowSink};
pub use types::{ConvertSummary, FormatFlags, Progress, Record};
