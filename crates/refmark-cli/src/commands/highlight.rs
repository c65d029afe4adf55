//! Highlight command - mark codes in a single document.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info};

use refmark_core::{HighlightReport, InputDocument, Outcome};

use super::{build_pipeline, load_config, resolve_model_dir, NotFound, PatternArgs};

/// Arguments for the highlight command.
#[derive(Args)]
pub struct HighlightArgs {
    /// Input PDF or image
    #[arg(required = true)]
    input: PathBuf,

    /// Output PDF (defaults to <input>_highlighted.pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print a JSON report instead of a summary
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    pattern: PatternArgs,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Search the PDF text layer only, never run OCR
    #[arg(long)]
    text_only: bool,
}

pub async fn run(args: HighlightArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.pattern.apply(&mut config);
    resolve_model_dir(&mut config, args.model_dir.clone());

    let input = InputDocument::open(&args.input)?;
    info!("Highlighting {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    if !args.json {
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
    }
    pb.set_message("Loading");

    let pipeline = build_pipeline(config, args.text_only)?;
    pb.set_message("Searching for codes");
    let outcome = pipeline.run(&input)?;
    pb.finish_and_clear();

    let report = match outcome {
        Outcome::Highlighted(report) => report,
        Outcome::NotFound { message } => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "status": "not-found", "message": message }))?
                );
            }
            return Err(NotFound(message).into());
        }
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    fs::write(&output, &report.pdf)?;

    if args.json {
        let value = json!({
            "status": "ok",
            "output": output.display().to_string(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_summary(&report, &output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn print_summary(report: &HighlightReport, output: &Path) {
    println!(
        "{} Highlighted {} code(s) via {:?}: {}",
        style("✓").green(),
        report.code_values().len(),
        report.path,
        report.code_values().join(", ")
    );
    println!(
        "{} {} mark(s) across {} page(s) in {}ms",
        style("ℹ").blue(),
        report.highlights.len(),
        report.pages.len(),
        report.elapsed_ms
    );
    println!(
        "{} Output written to {}",
        style("✓").green(),
        output.display()
    );
}

/// `scan.png` -> `scan_highlighted.pdf` in the same directory.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{}_highlighted.pdf", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/in/scan.png")),
            PathBuf::from("/tmp/in/scan_highlighted.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("doc.pdf")),
            PathBuf::from("doc_highlighted.pdf")
        );
    }
}
