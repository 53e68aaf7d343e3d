use std::io::{Seek, SeekFrom, Write};
use tracing::{instrument, trace};

use crate::error::{CodecError, Error};

use super::decompress::scanline_len;
use super::index::RecordIndex;

/// Longest run a single run code can describe
const MAX_RUN: u32 = 0xFF_FFFF + 4;

/// Upper bound of the encoded size of a scanline of `raw_len` bytes
#[must_use]
pub const fn max_encoded_len(raw_len: usize) -> usize {
    raw_len + raw_len / 2 + 11
}

/// MSB-first bit writer refusing to grow past `limit` bytes
struct BitWriter {
    buf: Vec<u8>,
    acc: u8,
    bits: u32,
    limit: usize,
}

impl BitWriter {
    fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            acc: 0,
            bits: 0,
            limit,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), CodecError> {
        if self.buf.len() >= self.limit {
            return Err(CodecError::EncodeOverrun { limit: self.limit });
        }
        self.buf.push(byte);
        Ok(())
    }

    fn write_bits(&mut self, value: u32, count: u32) -> Result<(), CodecError> {
        for shift in (0..count).rev() {
            self.acc = (self.acc << 1) | u8::from((value >> shift) & 1 == 1);
            self.bits += 1;
            if self.bits == 8 {
                let byte = self.acc;
                self.push(byte)?;
                self.acc = 0;
                self.bits = 0;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, CodecError> {
        if self.bits > 0 {
            let byte = self.acc << (8 - self.bits);
            self.push(byte)?;
        }
        Ok(self.buf)
    }
}

struct Encoder {
    bits: BitWriter,
    old: u8,
    // last value written, none before the first code
    vold: Option<u8>,
    run: u32,
}

impl Encoder {
    /// 3-bit code of `old` relative to the last written value, if close enough
    #[allow(clippy::cast_sign_loss)]
    fn delta_code(&self) -> Option<u32> {
        let diff = i32::from(self.old) - i32::from(self.vold?);
        (diff.abs() < 4).then_some((diff + 3) as u32)
    }

    fn write_value(&mut self) -> Result<(), CodecError> {
        match self.delta_code() {
            Some(code) => self.bits.write_bits(code, 3),
            None => {
                self.bits.write_bits(0b1110, 4)?;
                self.bits.write_bits(u32::from(self.old), 8)
            }
        }
    }

    fn write_run(&mut self, run: u32) -> Result<(), CodecError> {
        self.bits.write_bits(0b1111, 4)?;
        if run < 19 {
            self.bits.write_bits(run - 4, 4)?;
        } else {
            self.bits.write_bits(15, 4)?;
            if run < 274 {
                self.bits.write_bits(run - 19, 8)?;
            } else {
                self.bits.write_bits(255, 8)?;
                let stored = run - 4;
                for byte in stored.to_le_bytes().into_iter().take(3) {
                    self.bits.write_bits(u32::from(byte), 8)?;
                }
            }
        }
        match self.delta_code() {
            Some(code) => self.bits.write_bits(code, 3),
            None => {
                self.bits.write_bits(7, 3)?;
                self.bits.write_bits(u32::from(self.old), 8)
            }
        }
    }

    /// Writes the pending run of `old` and moves on to `next`
    fn flush(&mut self, next: u8) -> Result<(), CodecError> {
        while self.run > MAX_RUN {
            self.write_run(MAX_RUN)?;
            self.vold = Some(self.old);
            self.run -= MAX_RUN;
        }
        if self.run < 4 {
            self.write_value()?;
            for _ in 1..self.run {
                self.bits.write_bits(3, 3)?;
            }
        } else {
            self.write_run(self.run)?;
        }
        self.vold = Some(self.old);
        self.old = next;
        self.run = 1;
        Ok(())
    }
}

/// Encodes a raw scanline with the BASIC scheme
///
/// Samples are visited byte plane by byte plane, see
/// [`super::decompress::decode_into`].
///
/// # Errors
///
/// Returns [`CodecError::EncodeOverrun`] if the output would exceed
/// [`max_encoded_len`] and [`CodecError::ZeroSampleSize`] if
/// `bytes_per_sample` is 0
pub fn encode(raw: &[u8], bytes_per_sample: usize) -> Result<Vec<u8>, CodecError> {
    if bytes_per_sample == 0 {
        return Err(CodecError::ZeroSampleSize);
    }
    let mut samples = (0..bytes_per_sample)
        .flat_map(|plane| raw.iter().skip(plane).step_by(bytes_per_sample).copied());
    let Some(first) = samples.next() else {
        return Ok(Vec::new());
    };
    let mut encoder = Encoder {
        bits: BitWriter::with_limit(max_encoded_len(raw.len())),
        old: first,
        vold: None,
        run: 1,
    };
    for value in samples {
        if value == encoder.old {
            encoder.run += 1;
        } else {
            encoder.flush(value)?;
        }
    }
    let last = encoder.old;
    encoder.flush(last)?;
    encoder.bits.finish()
}

/// Encodes `raw` and stores it as record `record`
///
/// # Errors
///
/// Fails if the scanline size is unusable, if `raw` is not
/// `width * bytes_per_sample` bytes long, if the record is not the next one
/// to write, or on I/O errors
#[instrument(skip(stream, index, raw), level = "trace")]
pub fn encode_record<W: Write + Seek>(
    stream: &mut W,
    index: &mut RecordIndex,
    record: usize,
    raw: &[u8],
    width: usize,
    bytes_per_sample: usize,
) -> Result<(), Error> {
    let expected = scanline_len(width, bytes_per_sample)?;
    if raw.len() != expected {
        return Err(CodecError::ScanlineLength {
            expected,
            actual: raw.len(),
        }
        .into());
    }
    let coded = encode(raw, bytes_per_sample)?;
    let slot = index.append(record, coded.len())?;
    trace!("record {record}: {} bytes at {}", coded.len(), slot.payload_position);
    stream.seek(SeekFrom::Start(slot.size_position))?;
    stream.write_all(&slot.size.to_le_bytes())?;
    stream.seek(SeekFrom::Start(slot.payload_position))?;
    stream.write_all(&coded)?;
    Ok(())
}
