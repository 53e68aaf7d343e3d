use libvicar::Compression;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use vicr::{convert, dataset_info, vicar_to_png};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[cfg(not(debug_assertions))]
const DEFAULT_DEBUG_LEVEL: u8 = 1;
#[cfg(debug_assertions)]
const DEFAULT_DEBUG_LEVEL: u8 = 99;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, default_value_t = DEFAULT_DEBUG_LEVEL, action = clap::ArgAction::Count)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// prints the label and the geometry of a VICAR dataset
    Info {
        /// The VICAR dataset
        vicar_file: PathBuf,
    },

    /// converts one band of a BYTE dataset to a grayscale PNG
    #[command(name = "topng")]
    ToPng {
        /// The VICAR dataset
        vicar_file: PathBuf,

        /// The band to export
        #[arg(short, long, default_value_t = 0)]
        band: u64,

        /// The output file name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// compresses a single band dataset with BASIC or BASIC2
    Compress {
        /// The VICAR dataset
        vicar_file: PathBuf,

        /// The compression scheme
        #[arg(short, long, default_value = "BASIC")]
        scheme: Compression,

        /// The output file name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// rewrites a dataset without compression
    Decompress {
        /// The VICAR dataset
        vicar_file: PathBuf,

        /// The output file name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// `<dir>/<stem>.<suffix>` next to the input file
fn output_name(input: &Path, suffix: &str) -> Result<PathBuf> {
    let mut output = PathBuf::new();
    let Some(dir) = input.parent() else {
        bail!("Invalid vicar file");
    };
    let Some(Some(filename)) = input.file_stem().map(|os| os.to_str()) else {
        bail!("Invalid vicar file");
    };
    output.push(dir);
    output.push(format!("{filename}.{suffix}"));
    info!("output name: {}", output.display());
    Ok(output)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_file(true)
        .with_line_number(true)
        .init();

    match cli.command {
        Commands::Info { vicar_file } => {
            print!("{}", dataset_info(&vicar_file)?);
        }
        Commands::ToPng {
            vicar_file,
            band,
            output,
        } => {
            let output = match output {
                Some(o) => o,
                None => output_name(&vicar_file, "png")?,
            };
            vicar_to_png(&vicar_file, band, &output)?;
        }
        Commands::Compress {
            vicar_file,
            scheme,
            output,
        } => {
            if !scheme.is_compressed() {
                bail!("use decompress to write an uncompressed dataset");
            }
            let output = match output {
                Some(o) => o,
                None => {
                    output_name(&vicar_file, &format!("{}.vic", scheme.as_str().to_lowercase()))?
                }
            };
            convert(&vicar_file, &output, scheme)?;
        }
        Commands::Decompress { vicar_file, output } => {
            let output = match output {
                Some(o) => o,
                None => output_name(&vicar_file, "raw.vic")?,
            };
            convert(&vicar_file, &output, Compression::None)?;
        }
    }
    Ok(())
}
