use std::{fs::File, io::Cursor, path::Path};

mod common;
use common::{label_bytes, scanlines, spec, write_dataset, write_lines, BYTE_LINES, BYTE_RECORDS};
use libvicar::{
    decode_scanline, encode_scanline, open_label, CodecError, Compression, Error, GeometryError,
    LabelError, Placement, RecordIndex, SampleFormat, Value, VicarReader, VicarWriter,
};
use mktemp::Temp;

fn byte_lines() -> Vec<Vec<u8>> {
    BYTE_LINES.iter().map(|line| line.to_vec()).collect()
}

fn label_size(bytes: &[u8]) -> anyhow::Result<usize> {
    let label = open_label(&mut Cursor::new(bytes))?;
    Ok(label.label_size().unwrap() as usize)
}

#[test]
fn basic_records_carry_their_size() -> anyhow::Result<()> {
    let bytes = write_dataset(
        spec(4, 2, 1, SampleFormat::Byte, Compression::Basic),
        &byte_lines(),
    )?;
    let size = label_size(&bytes)?;

    let mut expected = vec![7, 0, 0, 0];
    expected.extend(BYTE_RECORDS[0]);
    expected.extend([8, 0, 0, 0]);
    expected.extend(BYTE_RECORDS[1]);
    assert_eq!(&bytes[size..], expected);

    let label = open_label(&mut Cursor::new(&bytes))?;
    assert_eq!(label.get_text("COMPRESS").as_deref(), Some("BASIC"));
    assert_eq!(
        label.get("EOCI1").and_then(Value::as_i64),
        Some(bytes.len() as i64)
    );
    assert_eq!(label.get("EOCI2"), Some(&Value::Integer(0)));
    Ok(())
}

#[test]
fn basic2_sizes_follow_the_label() -> anyhow::Result<()> {
    let bytes = write_dataset(
        spec(4, 2, 1, SampleFormat::Byte, Compression::Basic2),
        &byte_lines(),
    )?;
    let size = label_size(&bytes)?;

    let mut expected = vec![3, 0, 0, 0, 4, 0, 0, 0];
    expected.extend(BYTE_RECORDS[0]);
    expected.extend(BYTE_RECORDS[1]);
    assert_eq!(&bytes[size..], expected);

    let mut reader = VicarReader::open(Cursor::new(bytes))?;
    assert_eq!(reader.compression(), Compression::Basic2);
    assert_eq!(reader.read_band(0)?, BYTE_LINES.concat());
    Ok(())
}

#[test]
fn compressed_file_reads_back() -> anyhow::Result<()> {
    for (compression, format) in [
        (Compression::Basic, SampleFormat::Half),
        (Compression::Basic2, SampleFormat::Full),
        (Compression::Basic, SampleFormat::Byte),
    ] {
        let spec = spec(33, 8, 1, format, compression);
        let lines = scanlines(&spec);
        let tmp = Temp::new_file()?;
        let mut writer = VicarWriter::create_file(&tmp, spec)?;
        for (row, line) in lines.iter().enumerate() {
            writer.write_scanline(0, row as u64, line)?;
        }
        writer.finish()?;

        let mut reader = VicarReader::from_file(&tmp)?;
        assert_eq!(reader.layout().format, format);
        // rows may be requested in any order
        assert_eq!(reader.read_scanline(0, 5)?, lines[5]);
        assert_eq!(reader.record_index().unwrap().high_water_mark(), 6);
        assert_eq!(reader.read_scanline(0, 0)?, lines[0]);
        assert_eq!(reader.read_band(0)?, lines.concat());
        assert_eq!(reader.record_index().unwrap().high_water_mark(), 8);
    }
    Ok(())
}

#[test]
fn identical_datasets_hash_identically() -> anyhow::Result<()> {
    let spec = spec(64, 4, 1, SampleFormat::Half, Compression::Basic);
    let lines = scanlines(&spec);
    let first = Temp::new_file()?;
    let second = Temp::new_file()?;
    write_lines(File::create(&first)?, spec.clone(), &lines)?;
    write_lines(File::create(&second)?, spec.clone(), &lines)?;

    let first_path: &Path = first.as_ref();
    let second_path: &Path = second.as_ref();
    assert_eq!(
        sha256::try_digest(first_path)?,
        sha256::try_digest(second_path)?
    );
    assert_eq!(std::fs::read(first_path)?, write_dataset(spec, &lines)?);
    Ok(())
}

#[test]
fn uncompressed_bands_are_sequential() -> anyhow::Result<()> {
    let spec = spec(3, 2, 2, SampleFormat::Half, Compression::None);
    let lines = scanlines(&spec);
    let bytes = write_dataset(spec, &lines)?;
    let size = label_size(&bytes)?;
    assert_eq!(bytes.len(), size + 24);
    assert_eq!(&bytes[size + 12..size + 18], lines[2]);

    let mut reader = VicarReader::open(Cursor::new(bytes))?;
    let layout = *reader.layout();
    assert_eq!((layout.line_stride, layout.band_stride), (6, 12));
    assert_eq!(layout.data_offset, size as u64);
    assert_eq!(reader.read_band(1)?, [lines[2].clone(), lines[3].clone()].concat());
    Ok(())
}

#[test]
fn unwritten_lines_are_zero_filled() -> anyhow::Result<()> {
    let spec = spec(3, 2, 2, SampleFormat::Half, Compression::None);
    let mut writer = VicarWriter::create(Cursor::new(Vec::new()), spec)?;
    writer.write_scanline(1, 0, &[1, 2, 3, 4, 5, 6])?;
    let bytes = writer.finish()?.into_inner();
    let size = label_size(&bytes)?;
    assert_eq!(bytes.len(), size + 24);

    let mut reader = VicarReader::open(Cursor::new(bytes))?;
    assert_eq!(reader.read_scanline(0, 1)?, [0; 6]);
    assert_eq!(reader.read_scanline(1, 0)?, [1, 2, 3, 4, 5, 6]);
    assert_eq!(reader.read_scanline(1, 1)?, [0; 6]);
    Ok(())
}

#[test]
fn prefixes_and_header_records_are_skipped() -> anyhow::Result<()> {
    let mut bytes = label_bytes(
        "LBLSIZE=80 FORMAT='BYTE' ORG='BIL' NS=3 NL=2 NB=2 NBB=2 NLB=1 RECSIZE=8",
        80,
    );
    bytes.extend([0xEE; 8]);
    bytes.extend([0xAA, 0xAA, 1, 2, 3, 4, 5, 6]);
    bytes.extend([0xAA, 0xAA, 7, 8, 9, 10, 11, 12]);

    let mut reader = VicarReader::open(Cursor::new(bytes))?;
    assert_eq!(reader.layout().data_offset, 88);
    assert_eq!(reader.read_scanline(1, 1)?, [10, 11, 12]);
    assert_eq!(reader.read_band(0)?, [1, 2, 3, 7, 8, 9]);
    assert!(matches!(
        reader.read_scanline(0, 2),
        Err(Error::Geometry(GeometryError::OutOfBounds { band: 0, row: 2 }))
    ));
    Ok(())
}

#[test]
fn end_of_dataset_label_is_merged() -> anyhow::Result<()> {
    let mut bytes = label_bytes(
        "LBLSIZE=80 FORMAT='BYTE' TYPE='IMAGE' ORG='BSQ' NL=2 NS=2 NB=1 EOL=1",
        80,
    );
    bytes.extend([1, 2, 3, 4]);
    bytes.extend(label_bytes("LBLSIZE=48 TARGET='IO' TASK='EDIT' USER='x'", 48));

    let mut reader = VicarReader::open(Cursor::new(bytes.clone()))?;
    let label = reader.label();
    assert_eq!(label.label_size(), Some(80));
    assert_eq!(label.get_text("TARGET").as_deref(), Some("IO"));
    assert_eq!(label.task("EDIT").and_then(|task| task.user()), Some("x"));
    assert_eq!(reader.read_scanline(0, 1)?, [3, 4]);

    bytes.truncate(84 + 10);
    assert!(matches!(
        open_label(&mut Cursor::new(bytes)),
        Err(Error::Format(LabelError::MissingSecondaryLabel(84)))
    ));
    Ok(())
}

#[test]
fn end_of_dataset_label_follows_eoci() -> anyhow::Result<()> {
    let mut bytes = label_bytes(
        "LBLSIZE=80 FORMAT='BYTE' NL=2 NS=2 NB=1 EOL=1 EOCI1=100 EOCI2=0",
        80,
    );
    bytes.extend([1, 2, 3, 4]);
    bytes.extend([0; 16]);
    bytes.extend(label_bytes("LBLSIZE=48 TARGET='IO' TASK='EDIT' USER='x'", 48));

    let label = open_label(&mut Cursor::new(bytes))?;
    assert_eq!(label.get_text("TARGET").as_deref(), Some("IO"));
    Ok(())
}

#[test]
fn scanlines_through_a_bare_index() -> anyhow::Result<()> {
    let mut stream = Cursor::new(Vec::new());
    let mut index = RecordIndex::for_writing(Placement::InlineBeforeRecord, 0, 2, 4)?;
    for (record, line) in BYTE_LINES.iter().enumerate() {
        encode_scanline(&mut stream, &mut index, record, line, 4, 1)?;
    }
    assert_eq!(index.offsets(), [4, 11, 19]);
    assert_eq!(
        stream.get_ref().as_slice(),
        [7, 0, 0, 0, 0xF0, 0xE1, 0x40, 8, 0, 0, 0, 0xE0, 0xA9, 0x3B, 0x20]
    );

    assert!(matches!(
        encode_scanline(&mut stream, &mut index, 0, &BYTE_LINES[0], 4, 1),
        Err(Error::Codec(CodecError::OutOfOrder {
            expected: 2,
            requested: 0
        }))
    ));
    assert!(matches!(
        encode_scanline(&mut stream, &mut index, 2, &BYTE_LINES[0], 4, 1),
        Err(Error::Codec(CodecError::NoSuchRecord { record: 2, .. }))
    ));
    assert!(matches!(
        encode_scanline(&mut stream, &mut index, 2, &[1, 2, 3], 4, 1),
        Err(Error::Codec(CodecError::ScanlineLength {
            expected: 4,
            actual: 3
        }))
    ));

    let mut index = RecordIndex::for_reading(Placement::InlineBeforeRecord, 0, 2, 4)?;
    assert_eq!(decode_scanline(&mut stream, &mut index, 1, 4, 1)?, BYTE_LINES[1]);
    assert_eq!(decode_scanline(&mut stream, &mut index, 0, 4, 1)?, BYTE_LINES[0]);
    Ok(())
}

#[test]
fn corrupt_records_are_reported() -> anyhow::Result<()> {
    let bytes = write_dataset(
        spec(4, 2, 1, SampleFormat::Byte, Compression::Basic),
        &byte_lines(),
    )?;
    let size = label_size(&bytes)?;

    let mut oversized = bytes.clone();
    oversized[size..size + 4].copy_from_slice(&[0xFF; 4]);
    let mut reader = VicarReader::open(Cursor::new(oversized))?;
    assert!(matches!(
        reader.read_scanline(0, 0),
        Err(Error::Codec(CodecError::ImplausibleRecordSize {
            record: 0,
            size: 0xFFFF_FFFF
        }))
    ));

    let mut truncated = bytes;
    truncated.pop();
    let mut reader = VicarReader::open(Cursor::new(truncated))?;
    assert_eq!(reader.read_scanline(0, 0)?, BYTE_LINES[0]);
    assert!(matches!(reader.read_scanline(0, 1), Err(Error::Io(_))));
    Ok(())
}

#[test]
fn huge_lines_are_rejected_at_open() -> anyhow::Result<()> {
    // one plausible 7-byte record for a line of 2^44 samples
    let mut bytes = label_bytes(
        "LBLSIZE=80 FORMAT='BYTE' NS=17592186044416 NL=1 NB=1 COMPRESS='BASIC'",
        80,
    );
    bytes.extend([7, 0, 0, 0, 0xF0, 0xE1, 0x40]);
    assert!(matches!(
        VicarReader::open(Cursor::new(bytes)),
        Err(Error::Geometry(GeometryError::ScanlineTooLarge(17_592_186_044_416)))
    ));

    let mut bytes = label_bytes("LBLSIZE=64 FORMAT='HALF' NS=1073741824 NL=1 NB=1", 64);
    bytes.extend([0; 16]);
    assert!(matches!(
        VicarReader::open(Cursor::new(bytes)),
        Err(Error::Geometry(GeometryError::ScanlineTooLarge(_)))
    ));

    assert!(matches!(
        VicarWriter::create(
            Cursor::new(Vec::new()),
            spec(1 << 31, 1, 1, SampleFormat::Byte, Compression::Basic2)
        ),
        Err(Error::Geometry(GeometryError::ScanlineTooLarge(_)))
    ));

    // the host functions check their own arguments
    let mut stream = Cursor::new(Vec::new());
    let mut index = RecordIndex::for_writing(Placement::InlineBeforeRecord, 0, 1, 4)?;
    assert!(matches!(
        encode_scanline(&mut stream, &mut index, 0, &BYTE_LINES[0], 4, 0),
        Err(Error::Codec(CodecError::ZeroSampleSize))
    ));
    encode_scanline(&mut stream, &mut index, 0, &BYTE_LINES[0], 4, 1)?;
    let mut index = RecordIndex::for_reading(Placement::InlineBeforeRecord, 0, 1, 4)?;
    assert!(matches!(
        decode_scanline(&mut stream, &mut index, 0, usize::MAX, 2),
        Err(Error::Codec(CodecError::ScanlineTooLarge { .. }))
    ));
    assert!(matches!(
        decode_scanline(&mut stream, &mut index, 0, 4, 0),
        Err(Error::Codec(CodecError::ZeroSampleSize))
    ));
    Ok(())
}

#[test]
fn unusable_labels_are_rejected() {
    let open = |text: &str, size: usize| VicarReader::open(Cursor::new(label_bytes(text, size)));

    assert!(matches!(
        open("LBLSIZE=48 FORMAT='FOO' NS=1 NL=1 NB=1", 48),
        Err(Error::Geometry(GeometryError::UnsupportedFormat(format))) if format == "FOO"
    ));
    assert!(matches!(
        open("LBLSIZE=40 FORMAT='BYTE' NL=1 NB=1", 40),
        Err(Error::Format(LabelError::MissingItem("NS")))
    ));
    assert!(matches!(
        open("LBLSIZE=64 FORMAT='REAL' NS=1 NL=1 NB=1 COMPRESS='BASIC'", 64),
        Err(Error::Geometry(GeometryError::Incompatible(_)))
    ));
    assert!(matches!(
        open("LBLSIZE=64 FORMAT='DOUB' NS=1 NL=1 NB=1 REALFMT='CRAY'", 64),
        Err(Error::Geometry(GeometryError::UnsupportedByteOrder { key: "REALFMT", value })) if value == "CRAY"
    ));
    assert!(matches!(
        open("NOT A VICAR FILE, JUST SOME TEXT PADDED WITH NUL", 64),
        Err(Error::Format(LabelError::MissingLabelSize))
    ));
    assert!(matches!(
        VicarReader::open(Cursor::new(label_bytes("LBLSIZE=200 FORMAT='BYTE'", 64))),
        Err(Error::Format(LabelError::TruncatedLabel {
            expected: 200,
            read: 64
        }))
    ));
}
