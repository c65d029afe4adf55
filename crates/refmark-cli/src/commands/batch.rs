//! Batch command - highlight codes in many files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use refmark_core::{InputDocument, Outcome, PathTaken, Pipeline};

use super::highlight::default_output_path;
use super::{build_pipeline, load_config, resolve_model_dir, PatternArgs};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting input files
    #[arg(required = true)]
    input: String,

    /// Output directory (defaults to next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also write summary.csv
    #[arg(long)]
    summary: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    #[command(flatten)]
    pattern: PatternArgs,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Search PDF text layers only, never run OCR
    #[arg(long)]
    text_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileStatus {
    Highlighted,
    NotFound,
    Error,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Highlighted => "highlighted",
            FileStatus::NotFound => "not-found",
            FileStatus::Error => "error",
        }
    }
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    status: FileStatus,
    taken: Option<PathTaken>,
    codes: Vec<String>,
    highlights: usize,
    message: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.pattern.apply(&mut config);
    resolve_model_dir(&mut config, args.model_dir.clone());

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pipeline = build_pipeline(config, args.text_only)?;

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let result = process_file(&pipeline, &path, args.output_dir.as_deref());
        if result.status == FileStatus::Error {
            let message = result.message.clone().unwrap_or_default();
            if args.continue_on_error {
                warn!("Failed to process {}: {}", path.display(), message);
            } else {
                error!("Failed to process {}: {}", path.display(), message);
                overall_pb.abandon();
                anyhow::bail!("Processing {} failed: {}", path.display(), message);
            }
        }
        results.push(result);
        overall_pb.inc(1);
    }

    overall_pb.finish_with_message("Complete");

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let count = |status| results.iter().filter(|r| r.status == status).count();
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} highlighted, {} without codes, {} failed",
        style(count(FileStatus::Highlighted)).green(),
        style(count(FileStatus::NotFound)).yellow(),
        style(count(FileStatus::Error)).red()
    );

    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.status == FileStatus::Error)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    matches!(ext.as_str(), "pdf" | "png" | "jpg" | "jpeg")
}

fn process_file(pipeline: &Pipeline, path: &Path, output_dir: Option<&Path>) -> FileResult {
    let file_start = Instant::now();
    let mut result = FileResult {
        path: path.to_path_buf(),
        status: FileStatus::Error,
        taken: None,
        codes: Vec::new(),
        highlights: 0,
        message: None,
        processing_time_ms: 0,
    };

    let outcome = InputDocument::open(path).and_then(|input| pipeline.run(&input));
    match outcome {
        Ok(Outcome::Highlighted(report)) => {
            let output = output_path(path, output_dir);
            match fs::write(&output, &report.pdf) {
                Ok(()) => {
                    debug!("Wrote {}", output.display());
                    result.status = FileStatus::Highlighted;
                    result.taken = Some(report.path);
                    result.codes = report.code_values().into_iter().map(str::to_string).collect();
                    result.highlights = report.highlights.len();
                }
                Err(e) => result.message = Some(format!("failed to write {}: {}", output.display(), e)),
            }
        }
        Ok(Outcome::NotFound { message }) => {
            result.status = FileStatus::NotFound;
            result.message = Some(message);
        }
        Err(e) => result.message = Some(e.to_string()),
    }

    result.processing_time_ms = file_start.elapsed().as_millis() as u64;
    result
}

fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let default = default_output_path(input);
    match (output_dir, default.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => default,
    }
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let timestamp = Local::now().to_rfc3339();

    wtr.write_record([
        "filename",
        "status",
        "path",
        "codes",
        "highlights",
        "processing_time_ms",
        "timestamp",
        "message",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        let taken = match result.taken {
            Some(PathTaken::TextLayer) => "text_layer",
            Some(PathTaken::Ocr) => "ocr",
            None => "",
        };

        wtr.write_record([
            filename,
            result.status.as_str(),
            taken,
            &result.codes.join(";"),
            &result.highlights.to_string(),
            &result.processing_time_ms.to_string(),
            &timestamp,
            result.message.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("a.PDF")));
        assert!(is_supported(Path::new("scan.jpeg")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[test]
    fn test_output_path_uses_output_dir() {
        assert_eq!(
            output_path(Path::new("/data/in/a.pdf"), Some(Path::new("/data/out"))),
            PathBuf::from("/data/out/a_highlighted.pdf")
        );
        assert_eq!(
            output_path(Path::new("/data/in/a.pdf"), None),
            PathBuf::from("/data/in/a_highlighted.pdf")
        );
    }

    #[test]
    fn test_summary_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let results = vec![FileResult {
            path: PathBuf::from("a.pdf"),
            status: FileStatus::Highlighted,
            taken: Some(PathTaken::TextLayer),
            codes: vec!["AB-1".to_string(), "CD-2".to_string()],
            highlights: 2,
            message: None,
            processing_time_ms: 12,
        }];

        write_summary(&path, &results).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("filename,status,path,codes"));
        assert!(lines.next().unwrap().starts_with("a.pdf,highlighted,text_layer,AB-1;CD-2,2,12,"));
    }
}
