/// Demonstrates how to write a `BASIC` compressed dataset with a
/// [`VicarWriter`], stamping the label with a history task
///
use chrono::Local;
use libvicar::{Compression, ImageSpec, SampleFormat, VicarWriter};

fn main() -> anyhow::Result<()> {
    let (width, height) = (256u64, 128u64);
    let spec = ImageSpec::builder()
        .width(width)
        .height(height)
        .format(SampleFormat::Half)
        .compression(Compression::Basic)
        .build();
    let mut writer = VicarWriter::create_file("basic_example.vic", spec)?;
    if let Some(label) = writer.label_mut() {
        label.set("TARGET_NAME", "SYNTHETIC");
        label
            .property_mut("IDENTIFICATION")
            .set("INSTRUMENT_NAME", "GRADIENT");
        label.push_task("WRITE_BASIC", "libvicar", Local::now().naive_local());
    }

    for row in 0..height {
        // a horizontal ramp, constant over blocks of 16 samples
        let line: Vec<u8> = (0..width)
            .flat_map(|x| u16::try_from((x / 16) * 64 + row).unwrap_or(u16::MAX).to_le_bytes())
            .collect();
        writer.write_scanline(0, row, &line)?;
    }
    writer.finish()?;
    Ok(())
}
