#![allow(clippy::module_name_repetitions)]

pub(crate) mod compress;
pub(crate) mod decompress;
pub(crate) mod index;
pub(crate) mod layout;

use bon::Builder;
use regex::bytes::Regex;
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::LazyLock,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{Error, GeometryError};
use crate::label::{Label, Value};
use crate::serde::{self, LABEL_PROBE, LBLSIZE_FIELD_WIDTH, MIN_LABEL_PROBE};
use compress::encode_record;
use decompress::decode_record;
use index::{Placement, RecordIndex};
use layout::{ByteOrder, Compression, Layout, LayoutParams, SampleFormat};

/// Compressed datasets may not hold more records than this
const MAX_RECORDS: u64 = 100_000_000;
/// Placeholder for the end-of-dataset offset, as long as its final value
const EOCI_PLACEHOLDER: &str = "XXXXXXXX";

static EOCI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s\x00])(EOCI[12])='XXXXXXXX'").expect("EOCI regex is valid")
});

fn to_usize(value: u64, what: &'static str) -> Result<usize, GeometryError> {
    usize::try_from(value).map_err(|_| GeometryError::Overflow(what))
}

/// Reads at most [`LABEL_PROBE`] bytes at `offset` and looks for `LBLSIZE=`
fn probe_label_size<R: Read + Seek>(stream: &mut R, offset: u64) -> Result<Option<u64>, Error> {
    stream.seek(SeekFrom::Start(offset))?;
    let mut probe = Vec::with_capacity(LABEL_PROBE);
    stream.by_ref().take(LABEL_PROBE as u64).read_to_end(&mut probe)?;
    if probe.len() < MIN_LABEL_PROBE {
        debug!("only {} bytes at {offset}, no label there", probe.len());
        return Ok(None);
    }
    Ok(serde::find_label_size(&probe))
}

fn read_label_text<R: Read + Seek>(stream: &mut R, offset: u64, size: u64) -> Result<Vec<u8>, Error> {
    stream.seek(SeekFrom::Start(offset))?;
    let mut text = Vec::new();
    let read = stream.by_ref().take(size).read_to_end(&mut text)? as u64;
    if read < size {
        return Err(serde::Error::TruncatedLabel {
            expected: size,
            read,
        }
        .into());
    }
    Ok(text)
}

/// Offset of the end-of-dataset label announced by `EOCI1`/`EOCI2`, 0 if unset
fn end_of_cube_offset(label: &Label) -> u64 {
    let half = |key: &str| {
        label
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|n| u32::try_from(n).ok())
            .map_or(0, u64::from)
    };
    half("EOCI1") | (half("EOCI2") << 32)
}

/// Reads the label of a dataset, merged with its end-of-dataset label when
/// `EOL=1`
#[instrument(skip(stream), level = "debug")]
pub(crate) fn read_label<R: Read + Seek>(stream: &mut R) -> Result<Label, Error> {
    let size = probe_label_size(stream, 0)?.ok_or(serde::Error::MissingLabelSize)?;
    debug!("LBLSIZE={size}");
    let text = read_label_text(stream, 0, size)?;
    trace!("Label:\n{}", String::from_utf8_lossy(&text));
    let mut label = serde::parse_label(&text)?;

    if label.get("EOL").and_then(Value::as_i64) == Some(1) {
        let start = match end_of_cube_offset(&label) {
            0 => Layout::from_label(&label)?.end_offset()?,
            offset => offset,
        };
        let size = probe_label_size(stream, start)?
            .ok_or(serde::Error::MissingSecondaryLabel(start))?;
        debug!("end-of-dataset label of {size} bytes at {start}");
        let text = read_label_text(stream, start, size)?;
        serde::parse_continuation(&mut label, &text)?;
    }
    Ok(label)
}

fn compression_of(label: &Label) -> Result<Compression, GeometryError> {
    label.get("COMPRESS").map_or(Ok(Compression::None), |value| {
        let text = value.to_text();
        text.trim()
            .parse()
            .map_err(|_| GeometryError::UnsupportedCompression(text.clone()))
    })
}

fn record_count(layout: &Layout) -> Result<usize, GeometryError> {
    let records = layout
        .height
        .checked_mul(layout.bands)
        .ok_or(GeometryError::Overflow("record count"))?;
    if records > MAX_RECORDS {
        return Err(GeometryError::Incompatible(
            "too many records for a compressed dataset",
        ));
    }
    to_usize(records, "record count")
}

/// An open VICAR dataset
///
/// Scanlines are returned in file byte order, see [`Self::byte_order`].
#[derive(Debug)]
pub struct VicarReader<R> {
    stream: R,
    label: Label,
    layout: Layout,
    byte_order: ByteOrder,
    compression: Compression,
    index: Option<RecordIndex>,
}

impl VicarReader<BufReader<File>> {
    /// Opens the dataset stored at `path`
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened, see [`Self::open`] for the rest
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> VicarReader<R> {
    /// Reads the label of a dataset and prepares access to its scanlines
    ///
    /// Nothing past the label is read until a scanline is requested.
    ///
    /// # Errors
    ///
    /// Fails if the label cannot be read or parsed, or if it describes a
    /// raster this crate cannot lay out
    pub fn open(mut stream: R) -> Result<Self, Error> {
        let label = read_label(&mut stream)?;
        let layout = Layout::from_label(&label)?;
        let byte_order = ByteOrder::from_label(&label, layout.format)?;
        let compression = compression_of(&label)?;
        let index = match Placement::for_compression(compression) {
            None => None,
            Some(placement) => {
                if !layout.format.is_integer() {
                    return Err(GeometryError::Incompatible(
                        "compressed datasets must hold integer samples",
                    )
                    .into());
                }
                Some(RecordIndex::for_reading(
                    placement,
                    layout.data_offset,
                    record_count(&layout)?,
                    layout.scanline_size(),
                )?)
            }
        };
        info!(
            "Opened {}x{}x{} {} dataset, compression {}",
            layout.width,
            layout.height,
            layout.bands,
            layout.format.as_str(),
            compression.as_str()
        );
        Ok(Self {
            stream,
            label,
            layout,
            byte_order,
            compression,
            index,
        })
    }

    /// Returns the label, end-of-dataset items included
    #[must_use]
    pub const fn label(&self) -> &Label {
        &self.label
    }

    /// Returns the raster geometry
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the scanline compression
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Encoding of the samples, from `INTFMT` or `REALFMT` depending on the
    /// sample format
    #[must_use]
    pub const fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Returns the record index of a compressed dataset
    #[must_use]
    pub const fn record_index(&self) -> Option<&RecordIndex> {
        self.index.as_ref()
    }

    /// Returns the underlying stream
    pub fn into_inner(self) -> R {
        self.stream
    }

    fn read_raw_line(&mut self, band: u64, row: u64) -> Result<Vec<u8>, Error> {
        let offset = self.layout.line_offset(band, row)?;
        let item = to_usize(self.layout.item_size(), "sample size")?;
        let stride = to_usize(self.layout.pixel_stride, "pixel stride")?;
        let width = to_usize(self.layout.width, "scanline size")?;
        let span = (width - 1)
            .checked_mul(stride)
            .and_then(|n| n.checked_add(item))
            .ok_or(GeometryError::Overflow("scanline size"))?;
        let mut buf = vec![0; span];
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.read_exact(&mut buf)?;
        if stride == item {
            return Ok(buf);
        }
        Ok(buf
            .chunks(stride)
            .flat_map(|sample| &sample[..item])
            .copied()
            .collect())
    }

    /// Reads one line of one band
    ///
    /// The result holds `width * item_size` bytes whatever the interleaving.
    ///
    /// # Errors
    ///
    /// Fails if the line is outside of the raster, on I/O errors, or if a
    /// compressed record is corrupt
    #[instrument(skip(self), level = "trace")]
    pub fn read_scanline(&mut self, band: u64, row: u64) -> Result<Vec<u8>, Error> {
        let Some(index) = self.index.as_mut() else {
            return self.read_raw_line(band, row);
        };
        self.layout.line_offset(band, row)?;
        let record = to_usize(band * self.layout.height + row, "record")?;
        decode_record(
            &mut self.stream,
            index,
            record,
            to_usize(self.layout.width, "scanline size")?,
            to_usize(self.layout.item_size(), "sample size")?,
        )
    }

    /// Reads every line of a band, top to bottom
    ///
    /// # Errors
    ///
    /// See [`Self::read_scanline`]
    pub fn read_band(&mut self, band: u64) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        for row in 0..self.layout.height {
            out.extend(self.read_scanline(band, row)?);
        }
        Ok(out)
    }
}

/// Parameters of a dataset to create
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct ImageSpec {
    /// Samples per line
    pub width: u64,
    /// Lines per band
    pub height: u64,
    /// Number of bands
    #[builder(default = 1)]
    pub bands: u64,
    /// Sample type
    pub format: SampleFormat,
    /// Scanline compression
    #[builder(default)]
    pub compression: Compression,
    /// Label whose items are carried over to the new dataset
    pub source_label: Option<Label>,
}

impl ImageSpec {
    /// Builds the label of the dataset: the source label items, overridden
    /// by the items describing the new raster
    #[must_use]
    pub fn build_label(&self) -> Label {
        let mut label = self.source_label.clone().unwrap_or_default();
        let record_size = self.width * self.format.item_size();
        label.set("LBLSIZE", 0);
        if label.get("TYPE").is_none() {
            label.set("TYPE", "IMAGE");
        }
        label.set("FORMAT", self.format.as_str());
        label.set("BUFSIZ", record_size);
        label.set("DIM", 3);
        label.set("EOL", 0);
        label.set("RECSIZE", record_size);
        label.set("ORG", "BSQ");
        label.set("NL", self.height);
        label.set("NS", self.width);
        label.set("NB", self.bands);
        label.set("N1", self.width);
        label.set("N2", self.height);
        label.set("N3", self.bands);
        label.set("N4", 0);
        label.set("NBB", 0);
        label.set("NLB", 0);
        label.set("HOST", "X86-64-LINX");
        label.set("INTFMT", "LOW");
        label.set("REALFMT", "RIEEE");
        label.set("BHOST", "X86-64-LINX");
        label.set("BINTFMT", "LOW");
        if label.get("BLTYPE").is_none() {
            label.set("BLTYPE", "");
        }
        label.set("COMPRESS", self.compression.as_str());
        if self.compression.is_compressed() {
            label.set("EOCI1", EOCI_PLACEHOLDER);
            label.set("EOCI2", EOCI_PLACEHOLDER);
        } else {
            label.set("EOCI1", 0);
            label.set("EOCI2", 0);
        }
        label
    }
}

/// State of a dataset whose label has been written
#[derive(Debug)]
struct Written {
    layout: Layout,
    index: Option<RecordIndex>,
    // offsets of the EOCI1/EOCI2 values to patch
    eoci_positions: Vec<u64>,
}

/// A VICAR dataset being written
///
/// The label can be edited until the first scanline is written; it is then
/// serialized and its size, and every offset depending on it, is frozen.
#[derive(Debug)]
pub struct VicarWriter<W: Write + Seek> {
    stream: W,
    spec: ImageSpec,
    label: Label,
    written: Option<Written>,
}

impl VicarWriter<BufWriter<File>> {
    /// Creates a dataset at `path`, truncating any existing file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be created, see [`Self::create`] for the rest
    pub fn create_file<P: AsRef<Path>>(path: P, spec: ImageSpec) -> Result<Self, Error> {
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Self::create(BufWriter::new(file), spec)
    }
}

impl<W: Write + Seek> VicarWriter<W> {
    /// Prepares a dataset for writing
    ///
    /// # Errors
    ///
    /// Fails for an empty or overflowing raster, and for compressed datasets
    /// with several bands or non-integer samples
    pub fn create(stream: W, spec: ImageSpec) -> Result<Self, Error> {
        Layout::compute(
            &LayoutParams::builder()
                .format(spec.format)
                .width(spec.width)
                .height(spec.height)
                .bands(spec.bands)
                .label_size(0)
                .build(),
        )?;
        if spec.compression.is_compressed() {
            if spec.bands != 1 {
                return Err(GeometryError::Incompatible(
                    "compressed datasets must have a single band",
                )
                .into());
            }
            if !spec.format.is_integer() {
                return Err(GeometryError::Incompatible(
                    "compressed datasets must hold integer samples",
                )
                .into());
            }
        }
        let label = spec.build_label();
        Ok(Self {
            stream,
            spec,
            label,
            written: None,
        })
    }

    /// Returns the label
    #[must_use]
    pub const fn label(&self) -> &Label {
        &self.label
    }

    /// Returns the label for edition, or `None` once it has been written
    pub fn label_mut(&mut self) -> Option<&mut Label> {
        if self.written.is_some() {
            return None;
        }
        Some(&mut self.label)
    }

    /// Serializes the label at the start of the stream, once
    fn write_label(&mut self) -> Result<&mut Written, Error> {
        if self.written.is_none() {
            let bytes = self.label.serialize();
            let label_size = bytes.len() as u64;
            debug!("Writing {label_size} bytes of label");
            self.stream.seek(SeekFrom::Start(0))?;
            self.stream.write_all(&bytes)?;
            self.label.set("LBLSIZE", label_size);

            let eoci_positions = EOCI_REGEX
                .captures_iter(&bytes)
                .filter_map(|captures| captures.get(1))
                // skip the name and `=`
                .map(|name| (name.end() + 1) as u64)
                .collect();
            let layout = Layout::from_label(&self.label)?;
            let index = match Placement::for_compression(self.spec.compression) {
                None => None,
                Some(placement) => Some(RecordIndex::for_writing(
                    placement,
                    label_size,
                    record_count(&layout)?,
                    layout.scanline_size(),
                )?),
            };
            self.written = Some(Written {
                layout,
                index,
                eoci_positions,
            });
        }
        self.written
            .as_mut()
            .ok_or_else(|| io::Error::other("label not written").into())
    }

    /// Writes one line of one band
    ///
    /// Compressed scanlines must be written in order.
    ///
    /// # Errors
    ///
    /// Fails if the line is outside of the raster, if `scanline` does not
    /// hold `width * item_size` bytes, if a compressed scanline is written
    /// out of order, or on I/O errors
    #[instrument(skip(self, scanline), level = "trace")]
    pub fn write_scanline(&mut self, band: u64, row: u64, scanline: &[u8]) -> Result<(), Error> {
        self.write_label()?;
        let Self {
            stream, written, ..
        } = self;
        let Some(Written { layout, index, .. }) = written.as_mut() else {
            return Err(io::Error::other("label not written").into());
        };
        let offset = layout.line_offset(band, row)?;
        let width = to_usize(layout.width, "scanline size")?;
        let item = to_usize(layout.item_size(), "sample size")?;
        match index {
            Some(index) => {
                let record = to_usize(band * layout.height + row, "record")?;
                encode_record(stream, index, record, scanline, width, item)
            }
            None => {
                let expected = width * item;
                if scanline.len() != expected {
                    return Err(crate::error::CodecError::ScanlineLength {
                        expected,
                        actual: scanline.len(),
                    }
                    .into());
                }
                stream.seek(SeekFrom::Start(offset))?;
                stream.write_all(scanline)?;
                Ok(())
            }
        }
    }

    /// Completes the dataset and returns the underlying stream
    ///
    /// Uncompressed rasters are zero filled up to their full size; compressed
    /// ones get `EOCI1`/`EOCI2` patched with the final file length.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors
    pub fn finish(mut self) -> Result<W, Error> {
        self.write_label()?;
        let Self {
            mut stream,
            written,
            ..
        } = self;
        let Some(written) = written else {
            return Err(io::Error::other("label not written").into());
        };
        let file_len = stream.seek(SeekFrom::End(0))?;
        match &written.index {
            None => {
                let end = written.layout.end_offset()?;
                if file_len < end {
                    io::copy(&mut io::repeat(0).take(end - file_len), &mut stream)?;
                }
            }
            Some(index) => {
                if index.high_water_mark() < index.records() {
                    warn!(
                        "Only {} of {} records written",
                        index.high_water_mark(),
                        index.records()
                    );
                }
                let halves = [file_len & u64::from(u32::MAX), file_len >> 32];
                for (position, half) in written.eoci_positions.iter().zip(halves) {
                    let text = format!("{half:<LBLSIZE_FIELD_WIDTH$}");
                    stream.seek(SeekFrom::Start(*position))?;
                    stream.write_all(text.as_bytes())?;
                }
                debug!("EOCI patched with file length {file_len}");
            }
        }
        stream.flush()?;
        info!("Finished writing dataset");
        Ok(stream)
    }
}
