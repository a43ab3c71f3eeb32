//! fmconv - convert FM instrument presets between tracker formats
//!
//! # Commands
//!
//! - `fmconv formats` - list the supported formats
//! - `fmconv show <input>` - print a decoded instrument
//! - `fmconv convert <input> --to <format>` - write the instrument in another format
//!
//! Binary inputs are recognised by extension. Text voice definitions have no
//! extension of their own, so pass `--from` with the format name:
//!
//! ```bash
//! fmconv convert lead.tfi --to pmd
//! fmconv convert voice.txt --from mucom88 --to furnace -o lead.fui
//! RUST_LOG=debug fmconv show lead.bti --json
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fmconv::{
    conversion::{self, Exporter},
    FmInstrument, Format,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "fmconv")]
#[command(about = "Convert FM instrument presets between tracker formats")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported formats and what can be done with them
    Formats,

    /// Decode an instrument and print it
    Show(ShowArgs),

    /// Decode an instrument and export it in another format
    Convert(ConvertArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Instrument file to read
    input: PathBuf,

    /// Input format; required for text voice definitions
    #[arg(long)]
    from: Option<Format>,
}

#[derive(Args)]
struct ShowArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Print the instrument as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ConvertArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output format
    #[arg(long)]
    to: Format,

    /// Output path. Defaults to the input path with the format's extension
    /// for binary formats, and to stdout for text formats.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Instrument name to store, for formats that have one
    #[arg(long)]
    name: Option<String>,
}

fn decode(args: &InputArgs) -> Result<(FmInstrument, String)> {
    let path = &args.input;
    match args.from {
        Some(format) => {
            let codec = format
                .codec()
                .ok_or_else(|| anyhow!("{format} has no codec"))?;
            if let Some(parse) = codec.parse {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let instrument = parse(&text)
                    .with_context(|| format!("Failed to parse {} as {format}", path.display()))?;
                Ok((instrument, String::new()))
            } else if let Some(load) = codec.load {
                let data =
                    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
                load(&data).with_context(|| format!("Failed to load {} as {format}", path.display()))
            } else {
                bail!("{format} cannot be read")
            }
        }
        None => {
            let data =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path.to_string_lossy();
            conversion::load_file(&file_name, &data)
                .with_context(|| format!("Failed to load {}", path.display()))
        }
    }
}

fn list_formats() {
    println!(
        "{:<16} {:<10} {:<5} {:<5} {}",
        "FORMAT", "EXTENSION", "READ", "WRITE", "EXPORT"
    );
    for codec in conversion::supported_formats() {
        let d = &codec.descriptor;
        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        let export = match codec.export_kind() {
            Some(fmconv::ExportKind::File) => "file",
            Some(fmconv::ExportKind::Text) => "text",
            None => "-",
        };
        println!(
            "{:<16} {:<10} {:<5} {:<5} {}",
            d.format.id(),
            if d.extensions.is_empty() {
                "-".to_string()
            } else {
                d.extensions.join(" ")
            },
            yes_no(d.readable),
            yes_no(d.writable),
            export
        );
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let (instrument, name) = decode(&args.input)?;
    if args.json {
        let json = serde_json::to_string_pretty(&instrument)
            .context("Failed to serialize instrument")?;
        println!("{json}");
    } else {
        if !name.is_empty() {
            println!("Name: {name}");
        }
        println!("{instrument}");
    }
    Ok(())
}

fn default_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn convert(args: ConvertArgs) -> Result<()> {
    let (instrument, decoded_name) = decode(&args.input)?;
    let input = &args.input.input;
    let name = args.name.clone().unwrap_or_else(|| {
        if decoded_name.is_empty() {
            default_name(input)
        } else {
            decoded_name
        }
    });

    match conversion::exporter_for(args.to)? {
        Exporter::File { save, extension } => {
            let data = save(&instrument, &name)
                .with_context(|| format!("Failed to encode instrument as {}", args.to))?;
            let output = args
                .output
                .unwrap_or_else(|| input.with_extension(extension.trim_start_matches('.')));
            if output == *input {
                bail!("Refusing to overwrite the input file {}", input.display());
            }
            fs::write(&output, &data)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} ({} bytes)", output.display(), data.len());
        }
        Exporter::Text { stringify } => {
            let text = stringify(&instrument);
            match args.output {
                Some(output) => {
                    fs::write(&output, format!("{text}\n"))
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    info!("Wrote {}", output.display());
                }
                None => println!("{text}"),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Formats => {
            list_formats();
            Ok(())
        }
        Commands::Show(args) => show(args),
        Commands::Convert(args) => convert(args),
    }
}
