//! Resolve a layout manifest and render the result to `stdout`
//!
//! Renders either a readable report, the resolved map as JSON, or a linker
//! script. Every violation is printed when the layout is rejected, and the
//! `--output` file is left as it was. JSON diagnostics always go to `stdout`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use imxrt_rt_layout::manifest::{self, Manifest, ManifestError};
use imxrt_rt_layout::{generate, LayoutEngine, LayoutMap, NoSizes, SizeProvider, Word};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Section and region table
    Text,
    /// Resolved map as JSON
    Json,
    /// GNU ld linker script
    Ld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Width {
    #[value(name = "32")]
    Bits32,
    #[value(name = "64")]
    Bits64,
}

#[derive(Parser, Debug)]
#[command(
    name = "render",
    about = "Place firmware sections into memory regions and render the resolved layout."
)]
struct Args {
    /// Layout manifest (JSON regions and sections)
    manifest: PathBuf,

    /// JSON table of section sizes for sections without a fixed size
    #[arg(long, value_name = "PATH")]
    sizes: Option<PathBuf>,

    /// Only place these sections, plus retained ones
    #[arg(long, value_name = "SECTION", value_delimiter = ',')]
    keep: Option<Vec<String>>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Write here instead of stdout
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Target address width in bits
    #[arg(long, value_enum, default_value_t = Width::Bits32)]
    address_width: Width,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.address_width {
        Width::Bits32 => run::<u32>(&args),
        Width::Bits64 => run::<u64>(&args),
    }
}

fn run<W: Word>(args: &Args) -> anyhow::Result<()> {
    let manifest = Manifest::from_path(&args.manifest)
        .with_context(|| format!("load manifest {}", args.manifest.display()))?;
    let sizes = match &args.sizes {
        Some(path) => Some(
            manifest::sizes_from_path(path)
                .with_context(|| format!("load section sizes {}", path.display()))?,
        ),
        None => None,
    };
    let provider: &dyn SizeProvider = match &sizes {
        Some(sizes) => sizes,
        None => &NoSizes,
    };

    let resolved = manifest.build::<W>().and_then(|(regions, sections)| {
        let mut engine = LayoutEngine::new(&regions, &sections).sizes(provider);
        if let Some(keep) = &args.keep {
            engine = engine.keep_only(keep.iter().cloned());
        }
        engine.resolve().map_err(ManifestError::from)
    });

    match resolved {
        Ok(map) => {
            // only opened once the layout is accepted, so a rejected layout
            // keeps the previous output
            let mut out: Box<dyn Write> = match &args.output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).with_context(|| format!("create {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            write_map(&map, args.format, &mut out)?;
            out.flush()?;
            Ok(())
        }
        Err(ManifestError::Layout(diagnostics)) => {
            for diagnostic in &diagnostics {
                eprintln!("error: {}", diagnostic);
            }
            if args.format == Format::Json {
                let mut out = io::stdout().lock();
                serde_json::to_writer_pretty(
                    &mut out,
                    &json!({ "diagnostics": diagnostics.records() }),
                )?;
                writeln!(out)?;
                out.flush()?;
            }
            bail!("{}", diagnostics)
        }
        Err(err) => Err(err).context("build layout"),
    }
}

fn write_map<W: Word, Wr: Write>(
    map: &LayoutMap<W>,
    format: Format,
    out: &mut Wr,
) -> anyhow::Result<()> {
    match format {
        Format::Text => generate::report::render(map, out)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, map)?;
            writeln!(out)?;
        }
        Format::Ld => generate::link::render(map, out)?,
    }
    Ok(())
}
