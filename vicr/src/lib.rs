use std::{fmt::Write as _, fs::File, path::Path};

use anyhow::{bail, Context, Result};
use chrono::Local;
use image::{codecs::png::PngEncoder, ImageEncoder};
use libvicar::{ByteOrder, Compression, ImageSpec, SampleFormat, VicarReader, VicarWriter};
use tracing::{debug, info, instrument};

/// Name of the history task appended to converted datasets
pub const TASK_NAME: &str = "VICR";

/// Label and geometry of a dataset, one item per line
#[instrument]
pub fn dataset_info(vicar_file: &Path) -> Result<String> {
    let reader = VicarReader::from_file(vicar_file)?;
    let mut out = String::new();
    for (path, value) in reader.label().iter_flat() {
        let _ = writeln!(out, "{path:<32} {value}");
    }
    let layout = reader.layout();
    let _ = writeln!(
        out,
        "\n{} samples x {} lines x {} bands, {} {}, {} compression",
        layout.width,
        layout.height,
        layout.bands,
        layout.format.as_str(),
        layout.organization.as_str(),
        reader.compression().as_str()
    );
    let _ = writeln!(
        out,
        "label {} bytes, raster at {} ({} bytes uncompressed)",
        layout.label_size, layout.data_offset, layout.image_size
    );
    Ok(out)
}

/// Writes one band of a BYTE dataset as a grayscale PNG
#[instrument]
pub fn vicar_to_png(vicar_file: &Path, band: u64, output_name: &Path) -> Result<()> {
    let mut reader = VicarReader::from_file(vicar_file)?;
    let layout = *reader.layout();
    if layout.format != SampleFormat::Byte {
        bail!(
            "only BYTE datasets can be exported, found {}",
            layout.format.as_str()
        );
    }
    if band >= layout.bands {
        bail!("band {band} requested, dataset has {}", layout.bands);
    }
    let width = u32::try_from(layout.width).context("dataset is too wide for a PNG")?;
    let height = u32::try_from(layout.height).context("dataset is too tall for a PNG")?;

    let pixels = reader.read_band(band)?;
    debug!("Read {} bytes of band {band}", pixels.len());

    let output = File::options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output_name)?;
    info!("Writing grayscale image to {}", output_name.display());
    let encoder = PngEncoder::new(output);
    encoder.write_image(&pixels, width, height, image::ExtendedColorType::L8)?;
    info!("Successfully wrote image to {}", output_name.display());
    Ok(())
}

/// Size of the units to byte swap, complex samples being pairs of reals
const fn swap_unit(format: SampleFormat) -> usize {
    match format {
        SampleFormat::Complex => 4,
        other => other.item_size() as usize,
    }
}

/// Reorders the samples of a scanline from big to little endian
pub fn swap_to_little_endian(scanline: &mut [u8], format: SampleFormat) {
    let unit = swap_unit(format);
    if unit > 1 {
        scanline
            .chunks_exact_mut(unit)
            .for_each(<[u8]>::reverse);
    }
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| TASK_NAME.to_lowercase())
}

/// Rewrites a dataset with another compression
///
/// The source label is carried over with a new history task. Samples are
/// written little endian whatever the byte order of the source; VAX real
/// datasets are refused.
#[instrument]
pub fn convert(vicar_file: &Path, output_name: &Path, compression: Compression) -> Result<()> {
    let mut reader = VicarReader::from_file(vicar_file)?;
    let layout = *reader.layout();
    let byte_order = reader.byte_order();
    if byte_order == ByteOrder::Vax {
        bail!(
            "{} samples are VAX floating point, only IEEE datasets can be converted",
            layout.format.as_str()
        );
    }
    if compression.is_compressed() && layout.bands != 1 {
        bail!(
            "{} compression needs a single band dataset, found {} bands",
            compression.as_str(),
            layout.bands
        );
    }

    let spec = ImageSpec::builder()
        .width(layout.width)
        .height(layout.height)
        .bands(layout.bands)
        .format(layout.format)
        .compression(compression)
        .source_label(reader.label().clone())
        .build();
    let mut writer = VicarWriter::create_file(output_name, spec)?;
    if let Some(label) = writer.label_mut() {
        label
            .push_task(TASK_NAME, user_name(), Local::now().naive_local())
            .set("SOURCE", vicar_file.display().to_string());
    }

    for band in 0..layout.bands {
        for row in 0..layout.height {
            let mut scanline = reader.read_scanline(band, row)?;
            if byte_order == ByteOrder::Big {
                swap_to_little_endian(&mut scanline, layout.format);
            }
            writer.write_scanline(band, row, &scanline)?;
        }
    }
    writer.finish()?;
    info!(
        "Wrote {} dataset to {}",
        compression.as_str(),
        output_name.display()
    );
    Ok(())
}
