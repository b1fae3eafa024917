//! File-to-file conversion driver.
//!
//! Loads the whole input, decodes it record by record and appends each record
//! to a [`RowSink`]. The conversion is all-or-nothing: on any framing or sink
//! error the partially written output file is removed.

use crate::decoder::{words_from_bytes, DecodeError, RecordDecoder};
use crate::sink::{self, OutputError, OutputFormat, RowSink};
use crate::types::{ConvertSummary, FormatFlags, Progress};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of records between progress callbacks.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Errors that can occur during a conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to open input {path:?}: {source}")]
    OpenInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open output {path:?}: {source}")]
    OpenOutput { path: PathBuf, source: OutputError },

    #[error("Framing error: {0}")]
    Framing(#[from] DecodeError),

    #[error("Failed to write row {row}: {source}")]
    Sink { row: u64, source: OutputError },
}

/// Decodes `words` and appends every record to `sink`, then closes it.
///
/// `on_progress` is called every [`PROGRESS_INTERVAL`] records and once more
/// after the sink is closed, unless the last periodic call already covered
/// every record. On error the sink is left open; the caller decides
/// whether to close or discard it.
pub fn convert_words<S, F>(
    words: &[u16],
    sink: &mut S,
    flags: FormatFlags,
    mut on_progress: F,
) -> Result<ConvertSummary, ConvertError>
where
    S: RowSink + ?Sized,
    F: FnMut(Progress),
{
    let decoder = RecordDecoder::new(flags);
    let mut records = decoder.records(words);
    let mut last_reported = None;

    while let Some(result) = records.next() {
        let record = result?;
        sink.append_row(&record).map_err(|source| ConvertError::Sink {
            row: sink.rows_written(),
            source,
        })?;

        if records.records_decoded() % PROGRESS_INTERVAL == 0 {
            let progress = Progress {
                words_read: records.position(),
                words_total: records.len_words(),
                records: records.records_decoded(),
            };
            debug!(
                records = progress.records,
                words_read = progress.words_read,
                words_total = progress.words_total,
                "{}% done",
                progress.percent()
            );
            on_progress(progress);
            last_reported = Some(progress.records);
        }
    }

    let rows = sink.rows_written();
    sink.close()
        .map_err(|source| ConvertError::Sink { row: rows, source })?;

    let summary = ConvertSummary {
        records: records.records_decoded(),
        words: records.position(),
        flags: decoder.flags(),
    };
    if last_reported != Some(summary.records) {
        on_progress(Progress {
            words_read: summary.words,
            words_total: records.len_words(),
            records: summary.records,
        });
    }
    Ok(summary)
}

/// Converts the DT5780 file at `input` into `output`.
pub fn convert<P, Q, F>(
    input: P,
    output: Q,
    format: OutputFormat,
    flags: FormatFlags,
    on_progress: F,
) -> Result<ConvertSummary, ConvertError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(Progress),
{
    let input = input.as_ref();
    let output = output.as_ref();

    let bytes = std::fs::read(input).map_err(|source| ConvertError::OpenInput {
        path: input.to_path_buf(),
        source,
    })?;
    info!(
        input = %input.display(),
        bytes = bytes.len(),
        calibrated = flags.calibrated,
        write_waveform = flags.write_waveform,
        "Opened input"
    );
    let words = words_from_bytes(&bytes)?;
    drop(bytes);

    let mut sink = sink::create(output, format, flags).map_err(|source| ConvertError::OpenOutput {
        path: output.to_path_buf(),
        source,
    })?;

    match convert_words(&words, &mut sink, flags, on_progress) {
        Ok(summary) => {
            info!(
                output = %output.display(),
                records = summary.records,
                words = summary.words,
                "Conversion complete"
            );
            Ok(summary)
        }
        Err(err) => {
            drop(sink);
            if let Err(remove_err) = std::fs::remove_file(output) {
                warn!(
                    output = %output.display(),
                    "Failed to remove incomplete output: {}",
                    remove_err
                );
            }
            Err(err)
        }
    }
}
