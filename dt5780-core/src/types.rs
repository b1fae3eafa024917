//! Core types for DT5780 list-mode data.
//!
//! This module defines the decoded record and the whole-file format flags that
//! determine which optional fields are present in the stream.

use crate::parser;

/// Whole-file format flags.
///
/// These describe the wire format itself, not individual records. They must be
/// known before decoding starts and apply to every record in the file: decoding
/// a calibrated file as uncalibrated (or vice versa) shifts the offset of every
/// field after the first record's charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags {
    /// Every record carries a 64-bit floating point energy after the charge.
    pub calibrated: bool,
    /// Waveform samples are retained in the decoded record and written out.
    pub write_waveform: bool,
}

impl FormatFlags {
    /// Creates a new set of format flags.
    pub fn new(calibrated: bool, write_waveform: bool) -> Self {
        Self {
            calibrated,
            write_waveform,
        }
    }

    /// Bitmask representation used by the columnar file header.
    ///
    /// Bit 0 is calibrated mode, bit 1 is waveform mode.
    pub fn bits(&self) -> u32 {
        (self.calibrated as u32) | ((self.write_waveform as u32) << 1)
    }

    /// Inverse of [`FormatFlags::bits`]. Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            calibrated: bits & 0x1 != 0,
            write_waveform: bits & 0x2 != 0,
        }
    }
}

/// A single decoded acquisition event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Digitizer board id
    pub board: u16,
    /// Channel within the board
    pub channel: u16,
    /// Acquisition clock, 48 bits packed in four limbs
    pub timestamp: u64,
    /// Integrated charge (always present)
    pub charge: u16,
    /// Calibrated energy, present only in calibrated mode
    pub energy: Option<f64>,
    /// Opaque flag bitfield
    pub flags: u32,
    /// Number of waveform samples declared in the stream
    pub sample_count: u32,
    /// Waveform samples, retained only in waveform mode
    pub waveform: Vec<u16>,
}

impl Record {
    /// Number of 16-bit words this record occupied in the stream.
    pub fn word_len(&self, flags: FormatFlags) -> usize {
        parser::fixed_words(flags) + self.sample_count as usize
    }

    /// Appends the stream encoding of this record to `out`.
    ///
    /// Fields are written in the same order the decoder reads them. When
    /// `waveform` is shorter than `sample_count` the missing samples are
    /// written as zero so the record still frames correctly; a missing
    /// `energy` in calibrated mode is written as `0.0`.
    pub fn write_words(&self, flags: FormatFlags, out: &mut Vec<u16>) {
        out.reserve(self.word_len(flags));
        out.push(self.board);
        out.push(self.channel);
        out.extend_from_slice(&parser::split_u64(self.timestamp));
        out.push(self.charge);
        if flags.calibrated {
            out.extend_from_slice(&parser::f64_to_limbs(self.energy.unwrap_or(0.0)));
        }
        out.extend_from_slice(&parser::split_u32(self.flags));
        out.extend_from_slice(&parser::split_u32(self.sample_count));

        let declared = self.sample_count as usize;
        let present = self.waveform.len().min(declared);
        out.extend_from_slice(&self.waveform[..present]);
        out.resize(out.len() + (declared - present), 0);
    }
}

/// Summary returned after a completed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Number of records decoded and written
    pub records: u64,
    /// Number of 16-bit words consumed from the input
    pub words: usize,
    /// Format flags the file was decoded with
    pub flags: FormatFlags,
}

/// Progress snapshot handed to conversion callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Words consumed so far
    pub words_read: usize,
    /// Total words in the input buffer
    pub words_total: usize,
    /// Records decoded so far
    pub records: u64,
}

impl Progress {
    /// Integer completion percentage (0-100).
    pub fn percent(&self) -> usize {
        if self.words_total == 0 {
            100
        } else {
            (100 * self.words_read) / self.words_total
        }
    }
}
