use crate::serde;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
/// Possible `libvicar` errors
pub enum Error {
    /// Error returned if the VICAR label cannot be parsed, or if a required
    /// label item is missing
    #[error("label format error: {0}")]
    Format(#[from] serde::error::Error),
    /// Error returned if the label describes a raster that cannot be laid out
    #[error("invalid raster geometry: {0}")]
    Geometry(#[from] GeometryError),
    /// Error returned if a compressed scanline cannot be encoded or decoded
    #[error("scanline codec error: {0}")]
    Codec(#[from] CodecError),
    /// Error returned by the underlying stream
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while deriving the raster layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GeometryError {
    /// `ORG` is not one of BSQ, BIL or BIP
    #[error("ORG={0} layout not supported")]
    UnsupportedOrganization(String),
    /// `FORMAT` is not a known VICAR sample format
    #[error("FORMAT={0} not supported")]
    UnsupportedFormat(String),
    /// `COMPRESS` is not one of NONE, BASIC or BASIC2
    #[error("COMPRESS={0} not supported")]
    UnsupportedCompression(String),
    /// `INTFMT` or `REALFMT` names an unknown sample encoding
    #[error("{key}={value} layout not supported")]
    UnsupportedByteOrder {
        /// label key
        key: &'static str,
        /// offending value, as found in the label
        value: String,
    },
    /// A dimension is zero, negative or not an integer
    #[error("invalid value for {key}: {value}")]
    InvalidDimension {
        /// label key
        key: &'static str,
        /// offending value, as found in the label
        value: String,
    },
    /// Stride or offset computation does not fit in 64 bits
    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),
    /// The requested combination cannot be stored compressed
    #[error("{0}")]
    Incompatible(&'static str),
    /// A line does not fit in `i32::MAX` bytes
    #[error("too large scanline: {0} bytes")]
    ScanlineTooLarge(u64),
    /// Band or row out of the raster bounds
    #[error("band {band}, row {row} is outside of the raster")]
    OutOfBounds {
        /// zero-based band
        band: u64,
        /// zero-based row
        row: u64,
    },
}

/// Errors raised by the BASIC/BASIC2 scanline codec and the record index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// A bit read went past the end of the compressed record
    #[error("out of decoding buffer")]
    DecodeOverrun,
    /// The encoded scanline does not fit the maximum encoded size
    #[error("out of encoding buffer (limit {limit} bytes)")]
    EncodeOverrun {
        /// maximum size of an encoded scanline
        limit: usize,
    },
    /// A record size field holds a value no valid record can have
    #[error("wrong size {size} at record {record}")]
    ImplausibleRecordSize {
        /// record number
        record: usize,
        /// value of the size field
        size: u64,
    },
    /// Records must be written in sequential order
    #[error("records must be written in sequential order: expected {expected}, got {requested}")]
    OutOfOrder {
        /// next record the index can accept
        expected: usize,
        /// record the caller tried to write
        requested: usize,
    },
    /// The raw scanline does not have `width * bytes_per_sample` bytes
    #[error("scanline has {actual} bytes, expected {expected}")]
    ScanlineLength {
        /// expected length
        expected: usize,
        /// actual length
        actual: usize,
    },
    /// Samples must be at least one byte wide
    #[error("sample size must not be 0")]
    ZeroSampleSize,
    /// A decoded scanline would not fit in `i32::MAX` bytes
    #[error("too large scanline: {width} samples of {bytes_per_sample} bytes")]
    ScanlineTooLarge {
        /// samples per line
        width: usize,
        /// bytes per sample
        bytes_per_sample: usize,
    },
    /// The record number is not covered by the index
    #[error("record {record} is outside of the index ({records} records)")]
    NoSuchRecord {
        /// requested record
        record: usize,
        /// number of records in the index
        records: usize,
    },
}
