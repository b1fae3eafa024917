//! Single-pass DT5780 record decoder.
//!
//! This module implements the framing loop that splits a flat buffer of 16-bit
//! words into records. There is no terminator, length prefix or checksum: the
//! fixed field widths plus the self-declared sample count are the only framing
//! information, so any truncation is reported and decoding stops.

use crate::parser;
use crate::types::{FormatFlags, Record};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::iter::FusedIterator;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Record fields in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Board,
    Channel,
    Timestamp,
    Charge,
    Energy,
    Flags,
    SampleCount,
    Waveform,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Board => "board",
            Self::Channel => "channel",
            Self::Timestamp => "timestamp",
            Self::Charge => "charge",
            Self::Energy => "energy",
            Self::Flags => "flags",
            Self::SampleCount => "sample count",
            Self::Waveform => "waveform",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during decoding.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The buffer ended before a field (or a declared waveform) was complete.
    #[error(
        "Truncated record {record} at word offset {word_offset}: \
         {field} needs {needed} words but only {available} remain"
    )]
    Truncated {
        field: Field,
        record: u64,
        word_offset: usize,
        needed: usize,
        available: usize,
    },

    /// The input is not a whole number of 16-bit words.
    #[error("Input is {bytes} bytes, not a whole number of 16-bit words")]
    OddLength { bytes: usize },
}

impl DecodeError {
    /// Returns true for errors caused by the input's framing rather than I/O.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::OddLength { .. })
    }

    /// Byte offset into the input at which a framing error was detected.
    pub fn byte_offset(&self) -> Option<usize> {
        match self {
            Self::Truncated { word_offset, .. } => Some(word_offset * 2),
            Self::OddLength { bytes } => Some(bytes.saturating_sub(1)),
            Self::Io(_) => None,
        }
    }
}

/// Converts raw little-endian bytes into 16-bit words.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u16>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength { bytes: bytes.len() });
    }
    let mut words = vec![0u16; bytes.len() / 2];
    LittleEndian::read_u16_into(bytes, &mut words);
    Ok(words)
}

/// Reads a whole file into memory as 16-bit words.
pub fn read_words<P: AsRef<Path>>(path: P) -> Result<Vec<u16>, DecodeError> {
    let bytes = std::fs::read(path.as_ref())?;
    debug!(
        path = %path.as_ref().display(),
        bytes = bytes.len(),
        "Read input file"
    );
    words_from_bytes(&bytes)
}

/// DT5780 record decoder.
///
/// Holds only the whole-file format flags; all per-file state lives in the
/// [`Records`] iterator returned by [`RecordDecoder::records`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDecoder {
    flags: FormatFlags,
}

impl RecordDecoder {
    /// Creates a decoder for files written with the given format flags.
    pub fn new(flags: FormatFlags) -> Self {
        Self { flags }
    }

    /// Returns the format flags this decoder was created with.
    pub fn flags(&self) -> FormatFlags {
        self.flags
    }

    /// Returns a lazy iterator over the records in `words`.
    ///
    /// The iterator yields at most one error, after which it is exhausted.
    pub fn records<'a>(&self, words: &'a [u16]) -> Records<'a> {
        Records {
            words,
            pos: 0,
            flags: self.flags,
            records: 0,
            failed: false,
        }
    }

    /// Decodes every record in `words`, failing on the first framing error.
    pub fn decode_all(&self, words: &[u16]) -> Result<Vec<Record>, DecodeError> {
        self.records(words).collect()
    }

    /// Reads a file from disk and decodes every record in it.
    pub fn decode_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Record>, DecodeError> {
        let words = read_words(path)?;
        self.decode_all(&words)
    }
}

/// Lazy sequence of records decoded from a word buffer.
#[derive(Debug)]
pub struct Records<'a> {
    words: &'a [u16],
    pos: usize,
    flags: FormatFlags,
    records: u64,
    failed: bool,
}

impl<'a> Records<'a> {
    /// Current word cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total number of words in the buffer.
    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    /// Number of records decoded so far.
    pub fn records_decoded(&self) -> u64 {
        self.records
    }

    /// Returns true once the cursor sits exactly on the end of the buffer.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.words.len()
    }

    /// Consumes `count` words for `field`, or reports truncation without
    /// moving the cursor.
    #[inline]
    fn read_slice(&mut self, field: Field, count: usize) -> Result<&'a [u16], DecodeError> {
        let words = self.words;
        let available = words.len() - self.pos;
        if available < count {
            return Err(DecodeError::Truncated {
                field,
                record: self.records,
                word_offset: self.pos,
                needed: count,
                available,
            });
        }
        let slice = &words[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    #[inline]
    fn read_limbs<const N: usize>(&mut self, field: Field) -> Result<[u16; N], DecodeError> {
        let mut limbs = [0u16; N];
        limbs.copy_from_slice(self.read_slice(field, N)?);
        Ok(limbs)
    }

    #[inline]
    fn read_word(&mut self, field: Field) -> Result<u16, DecodeError> {
        Ok(self.read_slice(field, 1)?[0])
    }

    /// Decodes the record starting at the cursor.
    fn read_record(&mut self) -> Result<Record, DecodeError> {
        let board = self.read_word(Field::Board)?;
        let channel = self.read_word(Field::Channel)?;
        let timestamp = parser::assemble_u64(self.read_limbs(Field::Timestamp)?);
        let charge = self.read_word(Field::Charge)?;
        let energy = if self.flags.calibrated {
            Some(parser::f64_from_limbs(self.read_limbs(Field::Energy)?))
        } else {
            None
        };
        let flags = parser::assemble_u32(self.read_limbs(Field::Flags)?);
        let sample_count = parser::assemble_u32(self.read_limbs(Field::SampleCount)?);

        // The samples occupy stream positions even when they are not kept.
        let samples = self.read_slice(Field::Waveform, sample_count as usize)?;
        let waveform = if self.flags.write_waveform {
            samples.to_vec()
        } else {
            Vec::new()
        };

        Ok(Record {
            board,
            channel,
            timestamp,
            charge,
            energy,
            flags,
            sample_count,
            waveform,
        })
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.is_exhausted() {
            return None;
        }

        match self.read_record() {
            Ok(record) => {
                self.records += 1;
                Some(Ok(record))
            }
            Err(err) => {
                warn!(
                    record = self.records,
                    word_offset = self.pos,
                    "Framing error: {}",
                    err
                );
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Records<'_> {}
