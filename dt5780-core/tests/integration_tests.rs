//! Integration tests for the DT5780 decoder using synthetic list-mode files.
//!
//! Files are generated in a temporary directory with the same field layout the
//! acquisition software writes.

use dt5780_core::{
    convert, ColumnarFile, ConvertError, DecodeError, Field, FormatFlags, OutputFormat, Record,
    RecordDecoder,
};
use std::path::Path;
use tempfile::TempDir;

fn synthetic_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let samples = (i % 5) as u16;
            Record {
                board: (i % 2) as u16,
                channel: (i % 16) as u16,
                timestamp: 0x0000_1000_0000_0000 + (i as u64) * 4000,
                charge: 100 + (i as u16 % 900),
                energy: Some(i as f64 * 1.25),
                flags: if i % 7 == 0 { 0x0000_8000 } else { 0 },
                sample_count: samples as u32,
                waveform: (0..samples).map(|s| 8000 + s).collect(),
            }
        })
        .collect()
}

fn write_input(path: &Path, records: &[Record], flags: FormatFlags) -> usize {
    let mut words = Vec::new();
    for record in records {
        record.write_words(flags, &mut words);
    }
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    std::fs::write(path, bytes).unwrap();
    words.len()
}

#[test]
fn test_convert_waveform_file_to_columnar() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("run.bin");
    let output = dir.path().join("run.dtc");
    let flags = FormatFlags::new(false, true);
    let records = synthetic_records(3000);
    let word_count = write_input(&input, &records, flags);

    let mut last_progress = None;
    let summary = convert(&input, &output, OutputFormat::Columnar, flags, |p| {
        last_progress = Some(p)
    })
    .unwrap();

    assert_eq!(summary.records, 3000);
    assert_eq!(summary.words, word_count);
    assert_eq!(last_progress.unwrap().percent(), 100);

    let file = ColumnarFile::read(&output).unwrap();
    assert_eq!(file.rows(), 3000);
    assert_eq!(file.energy, None);
    let waveforms = file.waveform.unwrap();
    for (i, record) in records.iter().enumerate() {
        assert_eq!(file.board[i], record.board);
        assert_eq!(file.channel[i], record.channel);
        assert_eq!(file.charge[i], record.charge);
        assert_eq!(file.timestamp[i], record.timestamp);
        assert_eq!(file.flags[i], record.flags);
        assert_eq!(waveforms[i], record.waveform);
    }
}

#[test]
fn test_convert_calibrated_file_to_csv() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("calibrated.bin");
    let output = dir.path().join("calibrated.csv");
    let flags = FormatFlags::new(true, false);
    let records = synthetic_records(10);
    write_input(&input, &records, flags);

    let summary = convert(&input, &output, OutputFormat::Csv, flags, |_| {}).unwrap();
    assert_eq!(summary.records, 10);

    let csv = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], "board,channel,charge,timestamp,energy,flags");
    assert_eq!(lines[1], "0,0,100,17592186044416,0,32768");
    assert_eq!(lines[3], "0,2,102,17592186052416,2.5,0");
}

#[test]
fn test_same_file_decoded_with_wrong_mode_diverges() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("calibrated.bin");
    let flags = FormatFlags::new(true, false);
    write_input(&input, &synthetic_records(50), flags);

    let correct = RecordDecoder::new(flags).decode_file(&input).unwrap();
    assert_eq!(correct.len(), 50);

    match RecordDecoder::new(FormatFlags::default()).decode_file(&input) {
        Ok(wrong) => assert_ne!(wrong, correct),
        Err(err) => assert!(err.is_framing()),
    }
}

#[test]
fn test_truncated_input_removes_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("truncated.bin");
    let output = dir.path().join("truncated.dtc");
    let flags = FormatFlags::new(false, true);
    let records = vec![
        Record::default(),
        Record {
            sample_count: 3,
            waveform: vec![1, 2, 3],
            ..Default::default()
        },
    ];
    let mut words = Vec::new();
    for record in &records {
        record.write_words(flags, &mut words);
    }
    words.pop();
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    std::fs::write(&input, bytes).unwrap();

    let err = convert(&input, &output, OutputFormat::Columnar, flags, |_| {}).unwrap_err();

    match err {
        ConvertError::Framing(DecodeError::Truncated {
            field,
            word_offset,
            ..
        }) => {
            assert_eq!(field, Field::Waveform);
            assert_eq!(word_offset, 26);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_odd_length_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("odd.bin");
    let output = dir.path().join("odd.csv");
    std::fs::write(&input, [0u8; 27]).unwrap();

    let err = convert(&input, &output, OutputFormat::Csv, FormatFlags::default(), |_| {})
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Framing(DecodeError::OddLength { bytes: 27 })
    ));
    assert!(!output.exists());
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let err = convert(
        dir.path().join("missing.bin"),
        dir.path().join("out.dtc"),
        OutputFormat::Columnar,
        FormatFlags::default(),
        |_| {},
    )
    .unwrap_err();
    assert!(matches!(err, ConvertError::OpenInput { .. }));
}

#[test]
fn test_unwritable_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("run.bin");
    write_input(&input, &synthetic_records(2), FormatFlags::default());

    let err = convert(
        &input,
        dir.path().join("no_such_dir").join("out.dtc"),
        OutputFormat::Columnar,
        FormatFlags::default(),
        |_| {},
    )
    .unwrap_err();
    assert!(matches!(err, ConvertError::OpenOutput { .. }));
}

#[test]
fn test_empty_input_produces_empty_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.bin");
    let output = dir.path().join("empty.dtc");
    std::fs::write(&input, b"").unwrap();

    let summary = convert(&input, &output, OutputFormat::Columnar, FormatFlags::default(), |_| {})
        .unwrap();
    assert_eq!(summary.records, 0);
    assert_eq!(ColumnarFile::read(&output).unwrap().rows(), 0);
}
