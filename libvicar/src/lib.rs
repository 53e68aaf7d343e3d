//! # libvicar
//!
//!
//! This library provides datatypes and i/o functionality for the VICAR raster format, the image
//! format of the JPL Multimission Image Processing Laboratory, used for planetary imagery
//! since the 1960s and still found in PDS archives.
//!
//! It aims to provide a minimal, low-level API to build upon: the label is exposed as an
//! ordered set of items, the raster as scanlines of raw bytes in file byte order.
//!
//! ### Format
//!
//! A VICAR file starts with a textual label of `NAME=VALUE` items, the first one being
//! `LBLSIZE`, the size of the label in bytes. `PROPERTY=` and `TASK=` items open groups
//! (property sets and processing history) that the following items belong to. The raster
//! follows the label, optionally preceded by binary header records (`NLB`) and with a binary
//! prefix at the start of each line (`NBB`). Bands are stored sequentially (`BSQ`), interleaved
//! by line (`BIL`) or by pixel (`BIP`). When `EOL=1` a second label follows the raster.
//!
//! Integer rasters can be compressed line by line with the `BASIC` or `BASIC2` schemes: a
//! difference and run-length code where each scanline is a record preceded by its size
//! (`BASIC`) or whose sizes are grouped in a table after the label (`BASIC2`).
//!
//! ### Usage
//!
//! #### Writing a compressed dataset
//!
//! ```rust
//! use libvicar::{Compression, ImageSpec, SampleFormat, VicarReader, VicarWriter};
//! use std::io::Cursor;
//!
//! fn main() -> anyhow::Result<()> {
//!     let spec = ImageSpec::builder()
//!         .width(4)
//!         .height(2)
//!         .format(SampleFormat::Byte)
//!         .compression(Compression::Basic)
//!         .build();
//!     let mut writer = VicarWriter::create(Cursor::new(Vec::new()), spec)?;
//!     if let Some(label) = writer.label_mut() {
//!         label.set("TARGET_NAME", "MARS");
//!     }
//!     writer.write_scanline(0, 0, &[10, 10, 10, 10])?;
//!     writer.write_scanline(0, 1, &[10, 11, 12, 200])?;
//!     let bytes = writer.finish()?.into_inner();
//!
//!     let mut reader = VicarReader::open(Cursor::new(bytes))?;
//!     assert_eq!(reader.label().get_text("TARGET_NAME").as_deref(), Some("MARS"));
//!     assert_eq!(reader.read_scanline(0, 1)?, [10, 11, 12, 200]);
//!     Ok(())
//! }
//! ```
//!
//! #### Reading a label
//!
//! Items of property sets and history tasks are reached with a dotted path.
//!
//! ```rust
//! use libvicar::{open_label, compute_layout, Value};
//! use std::io::Cursor;
//!
//! fn main() -> anyhow::Result<()> {
//!     let text = "LBLSIZE=120 FORMAT='HALF' ORG='BIL' NS=10 NL=5 NB=3 \
//!                 PROPERTY='MAP' MAP_SCALE=0.25 TASK='COPY' USER='me'";
//!     let mut bytes = text.as_bytes().to_vec();
//!     bytes.resize(120, 0);
//!     let label = open_label(&mut Cursor::new(bytes))?;
//!     assert_eq!(label.get("MAP.MAP_SCALE"), Some(&Value::Real(0.25)));
//!     assert_eq!(label.task("COPY").and_then(|t| t.user()), Some("me"));
//!
//!     let layout = compute_layout(&label)?;
//!     assert_eq!(layout.line_stride, 60);
//!     Ok(())
//! }
//! ```
//!
//! #### Unstable API
//!
//! This crate is still very much a work-in-progress. Expect breaking changes between minor
//! releases until`v1.0`. Error types carry the `#[non_exhaustive]` attribute.
//!
//!

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

mod error;
/// Module containing the dataset reader and writer
pub mod image;
mod label;
mod serde;

use std::io::{Read, Seek, Write};

pub use error::{CodecError, Error, GeometryError};
pub use image::compress::max_encoded_len;
pub use image::index::{Placement, RecordIndex, RecordSlot};
pub use image::layout::{
    ByteOrder, Compression, Layout, LayoutParams, Organization, SampleFormat, MAX_SCANLINE_SIZE,
};
pub use image::{ImageSpec, VicarReader, VicarWriter};
pub use label::{Group, Label, Value, DAT_TIM_FORMAT};
pub use serde::{sanitize_item_name, Error as LabelError};

/// Reads the label at the start of `stream`
///
/// When the label announces an end-of-dataset label (`EOL=1`), its items are
/// merged in, overriding the primary ones; `LBLSIZE` stays the primary one.
///
/// # Errors
///
/// Fails if `LBLSIZE` cannot be found, if the stream is shorter than the
/// label, or if an item cannot be parsed
pub fn open_label<R: Read + Seek>(stream: &mut R) -> Result<Label, Error> {
    image::read_label(stream)
}

/// Parses label text already in memory
///
/// # Errors
///
/// Fails if an item cannot be parsed
pub fn parse_label(text: &[u8]) -> Result<Label, Error> {
    Ok(serde::parse_label(text)?)
}

/// Derives the raster geometry described by a label
///
/// # Errors
///
/// See [`Layout::from_label`]
pub fn compute_layout(label: &Label) -> Result<Layout, Error> {
    Layout::from_label(label)
}

/// Reads and decodes compressed record `record` (`band * height + row`)
///
/// # Errors
///
/// Fails on I/O errors, implausible record sizes and truncated records
pub fn decode_scanline<R: Read + Seek>(
    stream: &mut R,
    index: &mut RecordIndex,
    record: usize,
    width: usize,
    bytes_per_sample: usize,
) -> Result<Vec<u8>, Error> {
    image::decompress::decode_record(stream, index, record, width, bytes_per_sample)
}

/// Encodes `raw` and writes it as compressed record `record`
///
/// Records must be written in order.
///
/// # Errors
///
/// Fails if `raw` is not `width * bytes_per_sample` bytes long, if the record
/// is not the next one, or on I/O errors
pub fn encode_scanline<W: Write + Seek>(
    stream: &mut W,
    index: &mut RecordIndex,
    record: usize,
    raw: &[u8],
    width: usize,
    bytes_per_sample: usize,
) -> Result<(), Error> {
    image::compress::encode_record(stream, index, record, raw, width, bytes_per_sample)
}
