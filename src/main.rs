use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "manga-translator-rust",
    version,
    about = "Translate manga pages and re-letter the speech bubbles"
)]
struct Cli {
    /// Page images to translate
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Text boxes JSON for a single page (default: <stem>.boxes.json next to the page)
    #[arg(short = 'b', long = "boxes")]
    boxes: Option<PathBuf>,

    /// Directory for translated pages (default: settings [output] dir)
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Largest vertical gap in pixels between boxes of one bubble
    #[arg(long = "y-threshold")]
    y_threshold: Option<i32>,

    /// Text removal backend (iopaint, fill, none)
    #[arg(long = "inpaint")]
    inpaint: Option<String>,

    /// Also write the translation units as JSON next to each page
    #[arg(long = "emit-units")]
    emit_units: bool,

    /// Also write an overlay of the grouped boxes for each page
    #[arg(long = "debug-groups")]
    debug_groups: bool,

    /// Pages processed at once (default: number of CPUs)
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_translator_rust::logging::init(cli.verbose)?;

    let config = manga_translator_rust::Config {
        inputs: cli.inputs,
        boxes: cli.boxes,
        output_dir: cli.output_dir,
        settings_path: cli.read_settings,
        y_threshold: cli.y_threshold,
        inpaint: cli.inpaint,
        emit_units: cli.emit_units,
        debug_groups: cli.debug_groups,
        jobs: cli.jobs,
    };

    let summary = manga_translator_rust::run(config).await?;
    for page in &summary.pages {
        if let Ok(report) = &page.outcome {
            println!(
                "{}\t{} ({}/{} units drawn)",
                page.input.display(),
                report.output.display(),
                report.drawn,
                report.units
            );
        }
    }

    let failed = summary.failed();
    if failed > 0 {
        return Err(anyhow!(
            "{} of {} pages failed",
            failed,
            summary.pages.len()
        ));
    }
    Ok(())
}
