//! Row sinks for decoded DT5780 records.
//!
//! The decoder hands records to a [`RowSink`] one at a time, in input order.
//! Two sinks are provided: a column store ([`ColumnarWriter`]) and CSV
//! ([`CsvWriter`]).

use crate::types::{FormatFlags, Record};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Magic number at the start of every columnar file.
pub const COLUMNAR_MAGIC: &[u8; 8] = b"DT5780C\0";
/// Columnar file format version.
pub const COLUMNAR_VERSION: u32 = 1;
/// Name stored in the columnar header.
pub const TREE_NAME: &str = "dt5780";

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Sink is already closed")]
    Closed,
}

/// Output columns, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Board,
    Channel,
    Charge,
    Timestamp,
    Energy,
    Flags,
    Waveform,
}

impl Column {
    /// Column name as written to headers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Channel => "channel",
            Self::Charge => "charge",
            Self::Timestamp => "timestamp",
            Self::Energy => "energy",
            Self::Flags => "flags",
            Self::Waveform => "waveform",
        }
    }

    /// Storage type of the column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Board | Self::Channel | Self::Charge => "uint16",
            Self::Timestamp => "uint64",
            Self::Energy => "float64",
            Self::Flags => "uint32",
            Self::Waveform => "list<uint16>",
        }
    }
}

/// Returns the output schema for files with the given format flags.
pub fn columns(flags: FormatFlags) -> Vec<Column> {
    let mut columns = vec![
        Column::Board,
        Column::Channel,
        Column::Charge,
        Column::Timestamp,
    ];
    if flags.calibrated {
        columns.push(Column::Energy);
    }
    columns.push(Column::Flags);
    if flags.write_waveform {
        columns.push(Column::Waveform);
    }
    columns
}

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Column store (see [`ColumnarWriter`])
    #[default]
    Columnar,
    /// Comma-separated values, one row per record
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = OutputError;

    /// Parses a format name such as "csv" or "columnar".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "col" | "columnar" | "dtc" | "bin" => Ok(Self::Columnar),
            other => Err(OutputError::InvalidFormat(format!(
                "Unknown output format: {}. Use csv or columnar",
                other
            ))),
        }
    }
}

impl OutputFormat {
    /// Infers the output format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                OutputError::InvalidFormat(format!(
                    "Cannot infer output format from {:?}",
                    path.as_ref()
                ))
            })?;
        ext.parse()
    }
}

/// Destination for decoded records.
///
/// Rows must be appended in input order. Any error from `append_row` is fatal
/// to the conversion: dropping a row would misalign every column after it.
pub trait RowSink {
    /// Appends one record as a row.
    fn append_row(&mut self, record: &Record) -> Result<(), OutputError>;

    /// Flushes and finalizes the output. Further appends fail.
    fn close(&mut self) -> Result<(), OutputError>;

    /// Number of rows appended so far.
    fn rows_written(&self) -> u64;
}

impl<S: RowSink + ?Sized> RowSink for Box<S> {
    fn append_row(&mut self, record: &Record) -> Result<(), OutputError> {
        (**self).append_row(record)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        (**self).close()
    }

    fn rows_written(&self) -> u64 {
        (**self).rows_written()
    }
}

/// Opens a sink writing to `path`.
pub fn create<P: AsRef<Path>>(
    path: P,
    format: OutputFormat,
    flags: FormatFlags,
) -> Result<Box<dyn RowSink>, OutputError> {
    let file = File::create(path)?;
    Ok(match format {
        OutputFormat::Columnar => Box::new(ColumnarWriter::new(file, flags)),
        OutputFormat::Csv => Box::new(CsvWriter::new(file, flags)),
    })
}

fn energy_of(record: &Record) -> Result<f64, OutputError> {
    record.energy.ok_or_else(|| {
        OutputError::InvalidFormat("record has no energy but the output is calibrated".to_string())
    })
}

// ============================================================================
// Columnar output
// ============================================================================

/// Column store writer.
///
/// Rows are accumulated per column and written on [`RowSink::close`]:
///
/// - magic `"DT5780C\0"` (8 bytes)
/// - version: u32
/// - mode: u32 (bit 0 calibrated, bit 1 waveform)
/// - rows: u64
/// - name length: u16, followed by the UTF-8 name
/// - each column in schema order, little-endian, `rows` values each
///
/// The waveform column is stored as `rows + 1` u64 offsets followed by all
/// samples concatenated.
pub struct ColumnarWriter<W: Write> {
    writer: Option<BufWriter<W>>,
    flags: FormatFlags,
    board: Vec<u16>,
    channel: Vec<u16>,
    charge: Vec<u16>,
    timestamp: Vec<u64>,
    energy: Vec<f64>,
    flag_bits: Vec<u32>,
    waveform_offsets: Vec<u64>,
    samples: Vec<u16>,
}

impl<W: Write> ColumnarWriter<W> {
    /// Creates a new columnar writer.
    pub fn new(writer: W, flags: FormatFlags) -> Self {
        Self {
            writer: Some(BufWriter::new(writer)),
            flags,
            board: Vec::new(),
            channel: Vec::new(),
            charge: Vec::new(),
            timestamp: Vec::new(),
            energy: Vec::new(),
            flag_bits: Vec::new(),
            waveform_offsets: vec![0],
            samples: Vec::new(),
        }
    }

    fn write_to(&self, w: &mut BufWriter<W>) -> Result<(), OutputError> {
        w.write_all(COLUMNAR_MAGIC)?;
        w.write_u32::<LittleEndian>(COLUMNAR_VERSION)?;
        w.write_u32::<LittleEndian>(self.flags.bits())?;
        w.write_u64::<LittleEndian>(self.board.len() as u64)?;
        let name_len = u16::try_from(TREE_NAME.len())
            .map_err(|_| OutputError::InvalidFormat("name too long".to_string()))?;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_all(TREE_NAME.as_bytes())?;

        for column in columns(self.flags) {
            match column {
                Column::Board => write_u16s(w, &self.board)?,
                Column::Channel => write_u16s(w, &self.channel)?,
                Column::Charge => write_u16s(w, &self.charge)?,
                Column::Timestamp => {
                    for &value in &self.timestamp {
                        w.write_u64::<LittleEndian>(value)?;
                    }
                }
                Column::Energy => {
                    for &value in &self.energy {
                        w.write_f64::<LittleEndian>(value)?;
                    }
                }
                Column::Flags => {
                    for &value in &self.flag_bits {
                        w.write_u32::<LittleEndian>(value)?;
                    }
                }
                Column::Waveform => {
                    for &offset in &self.waveform_offsets {
                        w.write_u64::<LittleEndian>(offset)?;
                    }
                    write_u16s(w, &self.samples)?;
                }
            }
        }
        w.flush()?;
        Ok(())
    }
}

fn write_u16s<W: Write>(w: &mut W, values: &[u16]) -> Result<(), OutputError> {
    for &value in values {
        w.write_u16::<LittleEndian>(value)?;
    }
    Ok(())
}

impl<W: Write> RowSink for ColumnarWriter<W> {
    fn append_row(&mut self, record: &Record) -> Result<(), OutputError> {
        if self.writer.is_none() {
            return Err(OutputError::Closed);
        }
        // Checked before any column is touched
        let energy = if self.flags.calibrated {
            Some(energy_of(record)?)
        } else {
            None
        };

        self.board.push(record.board);
        self.channel.push(record.channel);
        self.charge.push(record.charge);
        self.timestamp.push(record.timestamp);
        self.energy.extend(energy);
        self.flag_bits.push(record.flags);
        if self.flags.write_waveform {
            self.samples.extend_from_slice(&record.waveform);
            self.waveform_offsets.push(self.samples.len() as u64);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        let mut writer = self.writer.take().ok_or(OutputError::Closed)?;
        self.write_to(&mut writer)
    }

    fn rows_written(&self) -> u64 {
        self.board.len() as u64
    }
}

/// A columnar file read back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnarFile {
    pub name: String,
    pub format: FormatFlags,
    pub board: Vec<u16>,
    pub channel: Vec<u16>,
    pub charge: Vec<u16>,
    pub timestamp: Vec<u64>,
    /// Present only in calibrated files
    pub energy: Option<Vec<f64>>,
    pub flags: Vec<u32>,
    /// Present only in waveform files
    pub waveform: Option<Vec<Vec<u16>>>,
}

impl ColumnarFile {
    /// Reads a columnar file from disk.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Reads a columnar file from any reader.
    pub fn from_reader<R: Read>(mut r: R) -> Result<Self, OutputError> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if &magic != COLUMNAR_MAGIC {
            return Err(OutputError::InvalidFormat(
                "not a DT5780 columnar file".to_string(),
            ));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != COLUMNAR_VERSION {
            return Err(OutputError::InvalidFormat(format!(
                "unsupported columnar version {}",
                version
            )));
        }
        let format = FormatFlags::from_bits(r.read_u32::<LittleEndian>()?);
        let rows = usize::try_from(r.read_u64::<LittleEndian>()?)
            .map_err(|_| OutputError::InvalidFormat("row count overflows usize".to_string()))?;
        let name_len = r.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|_| OutputError::InvalidFormat("name is not UTF-8".to_string()))?;

        let mut file = ColumnarFile {
            name,
            format,
            board: Vec::new(),
            channel: Vec::new(),
            charge: Vec::new(),
            timestamp: Vec::new(),
            energy: None,
            flags: Vec::new(),
            waveform: None,
        };

        for column in columns(format) {
            match column {
                Column::Board => file.board = read_u16s(&mut r, rows)?,
                Column::Channel => file.channel = read_u16s(&mut r, rows)?,
                Column::Charge => file.charge = read_u16s(&mut r, rows)?,
                Column::Timestamp => {
                    file.timestamp = read_column(&mut r, rows, 8, LittleEndian::read_u64_into)?
                }
                Column::Energy => {
                    file.energy = Some(read_column(&mut r, rows, 8, LittleEndian::read_f64_into)?)
                }
                Column::Flags => {
                    file.flags = read_column(&mut r, rows, 4, LittleEndian::read_u32_into)?
                }
                Column::Waveform => file.waveform = Some(read_waveforms(&mut r, rows)?),
            }
        }
        Ok(file)
    }

    /// Number of rows in the file.
    pub fn rows(&self) -> usize {
        self.board.len()
    }
}

/// Reads `count` values of `width` bytes each.
///
/// Only bytes actually present in the stream are buffered; a short column is
/// an [`OutputError::InvalidFormat`].
fn read_column<R, T>(
    r: &mut R,
    count: usize,
    width: usize,
    decode: fn(&[u8], &mut [T]),
) -> Result<Vec<T>, OutputError>
where
    R: Read,
    T: Copy + Default,
{
    let len = count
        .checked_mul(width)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| OutputError::InvalidFormat(format!("column of {} rows is too large", count)))?;
    let mut bytes = Vec::new();
    r.by_ref().take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(OutputError::InvalidFormat(format!(
            "column truncated: expected {} bytes, found {}",
            len,
            bytes.len()
        )));
    }
    let mut values = vec![T::default(); count];
    decode(&bytes, &mut values);
    Ok(values)
}

fn read_u16s<R: Read>(r: &mut R, count: usize) -> Result<Vec<u16>, OutputError> {
    read_column(r, count, 2, LittleEndian::read_u16_into)
}

fn read_waveforms<R: Read>(r: &mut R, rows: usize) -> Result<Vec<Vec<u16>>, OutputError> {
    let offset_count = rows
        .checked_add(1)
        .ok_or_else(|| OutputError::InvalidFormat("row count overflows".to_string()))?;
    let offsets = read_column(r, offset_count, 8, LittleEndian::read_u64_into)?;
    if offsets[0] != 0 || offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(OutputError::InvalidFormat(
            "waveform offsets are not monotonic".to_string(),
        ));
    }
    let total = usize::try_from(offsets[rows])
        .map_err(|_| OutputError::InvalidFormat("waveform too large".to_string()))?;
    let samples = read_u16s(r, total)?;
    Ok(offsets
        .windows(2)
        .map(|w| samples[w[0] as usize..w[1] as usize].to_vec())
        .collect())
}

// ============================================================================
// CSV output
// ============================================================================

/// CSV writer.
///
/// Writes a header line derived from [`columns`], then one line per record.
/// Waveform samples are joined with `;` inside a single field.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
    flags: FormatFlags,
    rows: u64,
    header_written: bool,
    closed: bool,
}

impl<W: Write> CsvWriter<W> {
    /// Creates a new CSV writer.
    pub fn new(writer: W, flags: FormatFlags) -> Self {
        Self {
            writer: BufWriter::new(writer),
            flags,
            rows: 0,
            header_written: false,
            closed: false,
        }
    }

    /// Returns the header line for this writer's columns.
    pub fn header(&self) -> String {
        columns(self.flags)
            .iter()
            .map(Column::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn ensure_header(&mut self) -> Result<(), OutputError> {
        if !self.header_written {
            let header = self.header();
            writeln!(self.writer, "{}", header)?;
            self.header_written = true;
        }
        Ok(())
    }
}

impl<W: Write> RowSink for CsvWriter<W> {
    fn append_row(&mut self, record: &Record) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        let energy = if self.flags.calibrated {
            Some(energy_of(record)?)
        } else {
            None
        };
        self.ensure_header()?;

        write!(
            self.writer,
            "{},{},{},{}",
            record.board, record.channel, record.charge, record.timestamp
        )?;
        if let Some(energy) = energy {
            write!(self.writer, ",{}", energy)?;
        }
        write!(self.writer, ",{}", record.flags)?;
        if self.flags.write_waveform {
            self.writer.write_all(b",")?;
            for (i, sample) in record.waveform.iter().enumerate() {
                if i > 0 {
                    self.writer.write_all(b";")?;
                }
                write!(self.writer, "{}", sample)?;
            }
        }
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        self.ensure_header()?;
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }
}
