use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use walkdir::WalkDir;

use ncmbox::ConvertOptions;

#[derive(Parser)]
#[command(name = "ncmbox", version, about = "Decrypt NCM files to MP3/FLAC")]
struct Cli {
    /// NCM files to convert
    files: Vec<PathBuf>,
    /// Convert all NCM files in a directory
    #[arg(short, long, value_name = "PATH")]
    directory: Option<PathBuf>,
    /// Recursive directory traversal (with -d)
    #[arg(short, long)]
    recursive: bool,
    /// Output directory (defaults to each file's directory)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Fetch cover art over the network when none is embedded
    #[arg(long)]
    fetch_cover: bool,
    /// Remove source file after successful conversion
    #[arg(short = 'm', long = "remove")]
    remove: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut files = cli.files;
    if let Some(dir) = &cli.directory {
        if cli.recursive {
            for entry in WalkDir::new(dir)
                .into_iter()
                .filter_map(std::result::Result::ok)
            {
                if entry.path().extension().is_some_and(|e| e == "ncm") {
                    files.push(entry.into_path());
                }
            }
        } else {
            for entry in std::fs::read_dir(dir).context("failed to read directory")? {
                let path = entry?.path();
                if path.extension().is_some_and(|e| e == "ncm") {
                    files.push(path);
                }
            }
        }
    }

    if files.is_empty() {
        eprintln!("No NCM files specified. Use --help for usage.");
        std::process::exit(1);
    }

    let opts = ConvertOptions {
        output_dir: cli.output,
        fetch_cover: cli.fetch_cover,
    };
    let mut failures = 0usize;
    for file in &files {
        match ncmbox::convert_with_options(file, &opts) {
            Ok(outcome) => {
                println!("{} -> {}", file.display(), outcome.output_path.display());
                for warning in &outcome.warnings {
                    eprintln!("warning: {}: {warning}", file.display());
                }
                if cli.remove {
                    if let Err(e) = std::fs::remove_file(file) {
                        eprintln!("warning: failed to remove {}: {e}", file.display());
                    }
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("error: {}: {e}", file.display());
            }
        }
    }
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
