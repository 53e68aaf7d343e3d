use bon::Builder;
use strum::{EnumString, IntoStaticStr};
use tracing::{debug, instrument};

use crate::error::{Error, GeometryError};
use crate::label::{Label, Value};
use crate::serde;

/// Sample type of a raster (`FORMAT` label item)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum SampleFormat {
    /// Unsigned 8-bit integer
    #[strum(serialize = "BYTE")]
    Byte,
    /// Signed 16-bit integer
    #[strum(to_string = "HALF", serialize = "WORD")]
    Half,
    /// Signed 32-bit integer
    #[strum(to_string = "FULL", serialize = "LONG")]
    Full,
    /// 32-bit float
    #[strum(serialize = "REAL")]
    Real,
    /// 64-bit float
    #[strum(serialize = "DOUB")]
    Double,
    /// Complex made of two 32-bit floats
    #[strum(to_string = "COMP", serialize = "COMPLEX")]
    Complex,
}

impl SampleFormat {
    /// Size of one sample in bytes
    #[must_use]
    pub const fn item_size(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Full | Self::Real => 4,
            Self::Double | Self::Complex => 8,
        }
    }

    /// Returns true for the formats the BASIC codecs can store
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Byte | Self::Half | Self::Full)
    }

    /// Label spelling of the format
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Interleaving of bands (`ORG` label item)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum Organization {
    /// Band sequential: each band is a complete image
    #[default]
    #[strum(serialize = "BSQ")]
    Bsq,
    /// Band interleaved by line
    #[strum(serialize = "BIL")]
    Bil,
    /// Band interleaved by pixel
    #[strum(serialize = "BIP")]
    Bip,
}

impl Organization {
    /// Label spelling of the organization
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Scanline compression (`COMPRESS` label item)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum Compression {
    /// Raw records
    #[default]
    #[strum(serialize = "NONE")]
    None,
    /// Each record is preceded by its own size field
    #[strum(serialize = "BASIC")]
    Basic,
    /// Record sizes are stored in a table right after the label
    #[strum(serialize = "BASIC2")]
    Basic2,
}

impl Compression {
    /// Label spelling of the compression
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns true unless records are stored raw
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Encoding of multi-byte samples (`INTFMT` / `REALFMT` label items)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum ByteOrder {
    /// Least significant byte first (`LOW`, `RIEEE`)
    #[default]
    #[strum(serialize = "LOW")]
    Little,
    /// Most significant byte first (`HIGH`, `IEEE`)
    #[strum(serialize = "HIGH")]
    Big,
    /// VAX F and D floating point, not IEEE 754
    #[strum(serialize = "VAX")]
    Vax,
}

impl ByteOrder {
    /// Parses an `INTFMT` value
    #[must_use]
    pub fn from_int_format(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Little),
            "HIGH" => Some(Self::Big),
            _ => None,
        }
    }

    /// Parses a `REALFMT` value
    #[must_use]
    pub fn from_real_format(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "RIEEE" => Some(Self::Little),
            "IEEE" => Some(Self::Big),
            "VAX" => Some(Self::Vax),
            _ => None,
        }
    }

    /// Encoding of the samples a label describes
    ///
    /// Integer formats follow `INTFMT` (`LOW` if absent), real ones
    /// `REALFMT` (`VAX` if absent).
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnsupportedByteOrder`] for an unknown value
    pub fn from_label(label: &Label, format: SampleFormat) -> Result<Self, GeometryError> {
        let (key, default, parse): (_, _, fn(&str) -> Option<Self>) = if format.is_integer() {
            ("INTFMT", Self::Little, Self::from_int_format)
        } else {
            ("REALFMT", Self::Vax, Self::from_real_format)
        };
        let Some(value) = label.get(key) else {
            return Ok(default);
        };
        let value = value.to_text();
        parse(&value).ok_or(GeometryError::UnsupportedByteOrder { key, value })
    }

    /// Label spelling for integer formats
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Largest line, in bytes, a dataset may have (`i32::MAX`)
pub const MAX_SCANLINE_SIZE: u64 = 0x7FFF_FFFF;

/// Inputs of the layout computation
#[derive(Builder, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutParams {
    /// Sample type
    pub format: SampleFormat,
    /// Band interleaving
    #[builder(default)]
    pub organization: Organization,
    /// Samples per line (`NS`)
    pub width: u64,
    /// Lines per band (`NL`)
    pub height: u64,
    /// Number of bands (`NB`)
    pub bands: u64,
    /// Binary prefix bytes at the start of every line (`NBB`)
    #[builder(default)]
    pub prefix_bytes: u64,
    /// Record size in bytes (`RECSIZE`)
    #[builder(default)]
    pub record_size: u64,
    /// Label size in bytes (`LBLSIZE`)
    pub label_size: u64,
    /// Binary header records between the label and the image (`NLB`)
    #[builder(default)]
    pub leading_records: u64,
}

/// Byte geometry of an uncompressed raster
///
/// All strides are in bytes. The start of line `row` of band `band` is
/// `data_offset + prefix_bytes + band * band_stride + row * line_stride`,
/// samples within a line being `pixel_stride` bytes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Sample type
    pub format: SampleFormat,
    /// Band interleaving
    pub organization: Organization,
    /// Samples per line
    pub width: u64,
    /// Lines per band
    pub height: u64,
    /// Number of bands
    pub bands: u64,
    /// Binary prefix bytes per line
    pub prefix_bytes: u64,
    /// Label size in bytes
    pub label_size: u64,
    /// Distance between two samples of a line
    pub pixel_stride: u64,
    /// Distance between two lines of a band
    pub line_stride: u64,
    /// Distance between the same line of two bands
    pub band_stride: u64,
    /// Size of the raster, prefixes included
    pub image_size: u64,
    /// Offset of the raster, without the prefix of the first line
    pub data_offset: u64,
}

fn mul(a: u64, b: u64, what: &'static str) -> Result<u64, GeometryError> {
    a.checked_mul(b).ok_or(GeometryError::Overflow(what))
}

fn add(a: u64, b: u64, what: &'static str) -> Result<u64, GeometryError> {
    a.checked_add(b).ok_or(GeometryError::Overflow(what))
}

impl Layout {
    /// Derives strides and offsets
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidDimension`] for an empty raster,
    /// [`GeometryError::ScanlineTooLarge`] when a line exceeds
    /// [`MAX_SCANLINE_SIZE`] and [`GeometryError::Overflow`] if any offset
    /// does not fit in 64 bits
    pub fn compute(params: &LayoutParams) -> Result<Self, GeometryError> {
        for (key, value) in [
            ("NS", params.width),
            ("NL", params.height),
            ("NB", params.bands),
        ] {
            if value == 0 {
                return Err(GeometryError::InvalidDimension {
                    key,
                    value: value.to_string(),
                });
            }
        }
        let item_size = params.format.item_size();
        let (pixel_stride, line_stride, band_stride, image_size) = match params.organization {
            Organization::Bip => {
                let pixel_stride = mul(item_size, params.bands, "pixel stride")?;
                let line_stride = add(
                    params.prefix_bytes,
                    mul(pixel_stride, params.width, "line stride")?,
                    "line stride",
                )?;
                let image_size = mul(line_stride, params.height, "image size")?;
                (pixel_stride, line_stride, item_size, image_size)
            }
            Organization::Bil => {
                let band_stride = mul(item_size, params.width, "band stride")?;
                let line_stride = add(
                    params.prefix_bytes,
                    mul(band_stride, params.bands, "line stride")?,
                    "line stride",
                )?;
                let image_size = mul(line_stride, params.height, "image size")?;
                (item_size, line_stride, band_stride, image_size)
            }
            Organization::Bsq => {
                let line_stride = add(
                    params.prefix_bytes,
                    mul(item_size, params.width, "line stride")?,
                    "line stride",
                )?;
                let band_stride = mul(line_stride, params.height, "band stride")?;
                let image_size = mul(band_stride, params.bands, "image size")?;
                (item_size, line_stride, band_stride, image_size)
            }
        };
        // lines are buffered whole
        let scanline_size = mul(item_size, params.width, "scanline size")?;
        for size in [scanline_size, line_stride] {
            if size > MAX_SCANLINE_SIZE {
                return Err(GeometryError::ScanlineTooLarge(size));
            }
        }

        let with_prefix = add(
            add(
                params.label_size,
                mul(params.record_size, params.leading_records, "data offset")?,
                "data offset",
            )?,
            params.prefix_bytes,
            "data offset",
        )?;
        let data_offset = with_prefix - params.prefix_bytes;
        // the last band must still be addressable
        let last_band = mul(band_stride, params.bands - 1, "band offset")?;
        add(
            data_offset,
            add(params.prefix_bytes, last_band, "band offset")?,
            "band offset",
        )?;

        Ok(Self {
            format: params.format,
            organization: params.organization,
            width: params.width,
            height: params.height,
            bands: params.bands,
            prefix_bytes: params.prefix_bytes,
            label_size: params.label_size,
            pixel_stride,
            line_stride,
            band_stride,
            image_size,
            data_offset,
        })
    }

    /// Derives the layout of the raster a label describes
    ///
    /// # Errors
    ///
    /// Fails with a format error if `FORMAT`, `NS`, `NL`, `NB` or `LBLSIZE` is
    /// missing and with a geometry error if a value is unsupported
    #[instrument(skip(label), level = "trace")]
    pub fn from_label(label: &Label) -> Result<Self, Error> {
        let format = label
            .get("FORMAT")
            .ok_or(serde::Error::MissingItem("FORMAT"))?
            .to_text();
        let format: SampleFormat = format
            .trim()
            .parse()
            .map_err(|_| GeometryError::UnsupportedFormat(format.clone()))?;
        let organization: Organization = match label.get("ORG") {
            Some(org) => {
                let org = org.to_text();
                org.trim()
                    .parse()
                    .map_err(|_| GeometryError::UnsupportedOrganization(org.clone()))?
            }
            None => Organization::default(),
        };
        let params = LayoutParams::builder()
            .format(format)
            .organization(organization)
            .width(dimension(label, "NS", None)?)
            .height(dimension(label, "NL", None)?)
            .bands(dimension(label, "NB", None)?)
            .prefix_bytes(dimension(label, "NBB", Some(0))?)
            .record_size(dimension(label, "RECSIZE", Some(0))?)
            .label_size(dimension(label, "LBLSIZE", None)?)
            .leading_records(dimension(label, "NLB", Some(0))?)
            .build();
        let layout = Self::compute(&params)?;
        debug!("Layout: {layout:?}");
        Ok(layout)
    }

    /// Size of one sample in bytes
    #[must_use]
    pub const fn item_size(&self) -> u64 {
        self.format.item_size()
    }

    /// Size in bytes of one line of one band once its samples are gathered
    #[must_use]
    pub const fn scanline_size(&self) -> u64 {
        self.width * self.format.item_size()
    }

    /// Offset of the first sample of a line
    ///
    /// # Errors
    ///
    /// Fails if the line is outside of the raster
    pub fn line_offset(&self, band: u64, row: u64) -> Result<u64, GeometryError> {
        if band >= self.bands || row >= self.height {
            return Err(GeometryError::OutOfBounds { band, row });
        }
        let offset = add(self.data_offset, self.prefix_bytes, "line offset")?;
        let offset = add(offset, mul(band, self.band_stride, "line offset")?, "line offset")?;
        add(offset, mul(row, self.line_stride, "line offset")?, "line offset")
    }

    /// Offset right after the raster, where an end-of-dataset label starts
    ///
    /// # Errors
    ///
    /// Fails on overflow
    pub fn end_offset(&self) -> Result<u64, GeometryError> {
        add(self.data_offset, self.image_size, "end of image")
    }
}

// Reads a non-negative integer item, `default` standing in for an absent one
fn dimension(label: &Label, key: &'static str, default: Option<u64>) -> Result<u64, Error> {
    let Some(value) = label.get(key) else {
        return default.ok_or_else(|| serde::Error::MissingItem(key).into());
    };
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            GeometryError::InvalidDimension {
                key,
                value: Value::to_text(value),
            }
            .into()
        })
}
