/// Demonstrates how to inspect the label and the geometry of a dataset
///
/// Usage: `cargo run --example read_label -- <file.vic>`
///
use anyhow::Context;
use libvicar::VicarReader;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: read_label <file.vic>")?;
    let mut reader = VicarReader::from_file(&path)?;

    for (path, value) in reader.label().iter_flat() {
        println!("{path:<32} {value}");
    }
    let layout = *reader.layout();
    println!(
        "{} samples x {} lines x {} bands of {}, {} compression",
        layout.width,
        layout.height,
        layout.bands,
        layout.format.as_str(),
        reader.compression().as_str()
    );

    let first = reader.read_scanline(0, 0)?;
    println!("first scanline: {} bytes", first.len());
    Ok(())
}
