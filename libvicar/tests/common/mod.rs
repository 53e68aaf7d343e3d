#![allow(dead_code)]

use libvicar::{Compression, ImageSpec, SampleFormat, VicarWriter};
use std::io::{Cursor, Seek, Write};

/// Scanlines of the 4x2 BYTE dataset and their BASIC encoding
pub const BYTE_LINES: [[u8; 4]; 2] = [[10, 10, 10, 10], [10, 11, 12, 200]];
pub const BYTE_RECORDS: [&[u8]; 2] = [&[0xF0, 0xE1, 0x40], &[0xE0, 0xA9, 0x3B, 0x20]];

pub fn spec(
    width: u64,
    height: u64,
    bands: u64,
    format: SampleFormat,
    compression: Compression,
) -> ImageSpec {
    ImageSpec::builder()
        .width(width)
        .height(height)
        .bands(bands)
        .format(format)
        .compression(compression)
        .build()
}

/// Deterministic scanline of `len` bytes, smooth enough to exercise runs and
/// difference codes
pub fn scanline(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| match i % 24 {
            0..=7 => seed,
            8..=15 => seed.wrapping_add((i % 8) as u8),
            _ => seed.wrapping_mul(31).wrapping_add((i * 17) as u8),
        })
        .collect()
}

/// Every scanline of a dataset, band after band
pub fn scanlines(spec: &ImageSpec) -> Vec<Vec<u8>> {
    let len = (spec.width * spec.format.item_size()) as usize;
    (0..spec.bands * spec.height)
        .map(|record| scanline(len, record as u8))
        .collect()
}

pub fn write_lines<W: Write + Seek>(
    stream: W,
    spec: ImageSpec,
    lines: &[Vec<u8>],
) -> anyhow::Result<W> {
    let height = spec.height;
    let mut writer = VicarWriter::create(stream, spec)?;
    for (record, line) in lines.iter().enumerate() {
        let record = record as u64;
        writer.write_scanline(record / height, record % height, line)?;
    }
    Ok(writer.finish()?)
}

/// Writes a dataset in memory
pub fn write_dataset(spec: ImageSpec, lines: &[Vec<u8>]) -> anyhow::Result<Vec<u8>> {
    Ok(write_lines(Cursor::new(Vec::new()), spec, lines)?.into_inner())
}

/// Label text NUL padded to `size` bytes
pub fn label_bytes(text: &str, size: usize) -> Vec<u8> {
    assert!(text.len() <= size, "label text longer than {size} bytes");
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(size, 0);
    bytes
}
