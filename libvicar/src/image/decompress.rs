use std::io::{Read, Seek, SeekFrom};
use tracing::{instrument, trace};

use crate::error::{CodecError, Error};

use super::index::RecordIndex;
use super::layout::MAX_SCANLINE_SIZE;

/// MSB-first bit reader over one compressed record
struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
    // bits of `buf[pos]` already consumed
    used: u32,
}

impl<'a> BitReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            used: 0,
        }
    }

    fn read_bits(&mut self, count: u32) -> Result<u32, CodecError> {
        let mut value = 0;
        for _ in 0..count {
            let byte = *self.buf.get(self.pos).ok_or(CodecError::DecodeOverrun)?;
            let bit = (byte >> (7 - self.used)) & 1;
            value = (value << 1) | u32::from(bit);
            self.used += 1;
            if self.used == 8 {
                self.used = 0;
                self.pos += 1;
            }
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bits(8)? as u8)
    }
}

/// Applies a 3-bit difference code (0..7) to the previous sample
#[allow(clippy::cast_possible_truncation)]
const fn apply_delta(old: u8, code: u32) -> u8 {
    old.wrapping_add(code as u8).wrapping_sub(3)
}

/// Decoded size of a scanline of `width` samples
///
/// # Errors
///
/// Fails for a zero sample size and for lines longer than
/// [`MAX_SCANLINE_SIZE`] bytes
pub(crate) fn scanline_len(width: usize, bytes_per_sample: usize) -> Result<usize, CodecError> {
    if bytes_per_sample == 0 {
        return Err(CodecError::ZeroSampleSize);
    }
    width
        .checked_mul(bytes_per_sample)
        .filter(|&len| len as u64 <= MAX_SCANLINE_SIZE)
        .ok_or(CodecError::ScanlineTooLarge {
            width,
            bytes_per_sample,
        })
}

/// Decodes a BASIC/BASIC2 record into `out`
///
/// Byte `p` of every sample is decoded first for `p = 0`, then `p = 1` and so
/// on, the previous value and pending run carrying over between planes.
///
/// # Errors
///
/// Returns [`CodecError::DecodeOverrun`] if `coded` ends before `out` is full
/// and [`CodecError::ZeroSampleSize`] if `bytes_per_sample` is 0
pub fn decode_into(coded: &[u8], out: &mut [u8], bytes_per_sample: usize) -> Result<(), CodecError> {
    if bytes_per_sample == 0 {
        return Err(CodecError::ZeroSampleSize);
    }
    let mut bits = BitReader::new(coded);
    let mut old = 0u8;
    let mut pending = 0u32;
    for plane in 0..bytes_per_sample {
        for sample in out.iter_mut().skip(plane).step_by(bytes_per_sample) {
            if pending > 0 {
                *sample = old;
                pending -= 1;
                continue;
            }
            let code = bits.read_bits(3)?;
            let value = if code < 7 {
                apply_delta(old, code)
            } else if bits.read_bits(1)? == 0 {
                bits.read_byte()?
            } else {
                let short = bits.read_bits(4)?;
                let stored = if short < 15 {
                    short
                } else {
                    let medium = bits.read_bits(8)?;
                    if medium < 255 {
                        medium + 15
                    } else {
                        let b0 = bits.read_bits(8)?;
                        let b1 = bits.read_bits(8)?;
                        let b2 = bits.read_bits(8)?;
                        b0 | (b1 << 8) | (b2 << 16)
                    }
                };
                let fill = bits.read_bits(3)?;
                let fill = if fill < 7 {
                    apply_delta(old, fill)
                } else {
                    bits.read_byte()?
                };
                // a run covers stored + 4 samples, this one included
                pending = stored + 3;
                fill
            };
            *sample = value;
            old = value;
        }
    }
    Ok(())
}

/// Reads and decodes compressed record `record`
///
/// # Errors
///
/// Fails if the scanline size is unusable, if the record cannot be located
/// or read, or if its payload is shorter than `width * bytes_per_sample`
/// decoded bytes require
#[instrument(skip(stream, index), level = "trace")]
pub fn decode_record<R: Read + Seek>(
    stream: &mut R,
    index: &mut RecordIndex,
    record: usize,
    width: usize,
    bytes_per_sample: usize,
) -> Result<Vec<u8>, Error> {
    let out_len = scanline_len(width, bytes_per_sample)?;
    let (start, len) = index.record_span(stream, record)?;
    trace!("decoding {len} bytes at {start}");
    let mut coded = vec![0; usize::try_from(len).map_err(|_| CodecError::DecodeOverrun)?];
    stream.seek(SeekFrom::Start(start))?;
    stream.read_exact(&mut coded)?;
    let mut out = vec![0; out_len];
    decode_into(&coded, &mut out, bytes_per_sample)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_read_msb_first() {
        let mut bits = BitReader::new(&[0b1010_0000, 0xFF]);
        assert_eq!(bits.read_bits(3), Ok(0b101));
        assert_eq!(bits.read_bits(7), Ok(3));
        assert_eq!(bits.read_bits(6), Ok(0b11_1111));
        assert_eq!(bits.read_bits(1), Err(CodecError::DecodeOverrun));
    }

    #[test]
    fn decodes_known_scanlines() {
        let mut out = [0; 4];
        decode_into(&[0xF0, 0xE1, 0x40], &mut out, 1).unwrap();
        assert_eq!(out, [10, 10, 10, 10]);
        decode_into(&[0xE0, 0xA9, 0x3B, 0x20], &mut out, 1).unwrap();
        assert_eq!(out, [10, 11, 12, 200]);
    }

    #[test]
    fn deltas_wrap_around() {
        // literal 1, then code 0 (-3)
        let mut out = [0; 2];
        decode_into(&[0b1110_0000, 0b0001_0000], &mut out, 1).unwrap();
        assert_eq!(out, [1, 254]);
    }

    #[test]
    fn scanline_sizes_are_checked() {
        assert_eq!(scanline_len(10, 2), Ok(20));
        assert_eq!(scanline_len(3, 0), Err(CodecError::ZeroSampleSize));
        assert_eq!(
            scanline_len(usize::MAX, 2),
            Err(CodecError::ScanlineTooLarge {
                width: usize::MAX,
                bytes_per_sample: 2
            })
        );
        assert!(scanline_len(1 << 31, 1).is_err());
        assert_eq!(
            decode_into(&[0xF0, 0xE1, 0x40], &mut [0; 4], 0),
            Err(CodecError::ZeroSampleSize)
        );
    }

    #[test]
    fn truncated_record_overruns() {
        let mut out = [0; 6];
        assert_eq!(
            decode_into(&[0xF0, 0xE1, 0x40], &mut out, 1),
            Err(CodecError::DecodeOverrun)
        );
    }
}
