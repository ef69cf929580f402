//! jp2bridge CLI - classify JPEG 2000 files and list known format codes.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use jp2bridge_rs::diagnostics::{Message, Severity};
use jp2bridge_rs::format::{self, FormatCode};

/// Inspect JPEG 2000 codestreams and containers
#[derive(Parser)]
#[command(name = "jp2bridge")]
#[command(version)]
#[command(about = "Classify JPEG 2000 files by magic bytes and extension", long_about = None)]
#[command(after_help = "EXAMPLES:
    jp2bridge detect -i scan.jp2 tile.j2k
    RUST_LOG=debug jp2bridge detect -i stream.jpt
    jp2bridge formats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify files from their first 12 bytes, using the extension as a hint
    ///
    /// A file whose extension disagrees with its content is reported with a
    /// warning; the content wins.
    #[command(visible_alias = "d")]
    Detect {
        /// Files to classify
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
    },

    /// List format codes and the extensions mapped to them
    #[command(visible_alias = "f")]
    Formats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Detect { input } => detect_files(&input),
        Commands::Formats => {
            list_formats();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn detect_files(paths: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let mut failures = 0usize;
    for path in paths {
        match detect_file(path) {
            Ok(format) => println!("{}: {} ({})", path.display(), format, i32::from(format)),
            Err(e) => {
                failures += 1;
                println!("{}: {}", path.display(), e);
            }
        }
    }
    if failures > 0 {
        return Err(format!("{} of {} files not recognized", failures, paths.len()).into());
    }
    Ok(())
}

fn detect_file(path: &Path) -> Result<FormatCode, Box<dyn std::error::Error>> {
    let head = format::read_signature(path)?;
    let mut messages = Vec::<Message>::new();
    let detected = format::detect_format_with_path(&head, Some(path), &mut messages);
    for message in &messages {
        let label = match message.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        eprintln!("{}: {}: {}", path.display(), label, message.text);
    }
    Ok(detected?)
}

fn list_formats() {
    println!("Format codes:");
    println!();
    for format in FormatCode::ALL {
        let extensions: Vec<_> = format.extensions().collect();
        let role = if format.is_codestream() {
            "codestream"
        } else {
            "raster"
        };
        println!(
            "  {:>2}  {:<4} {:<11} {}",
            i32::from(format),
            format.name(),
            role,
            extensions.join(", ")
        );
    }
}
