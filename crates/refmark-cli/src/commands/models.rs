//! Models command - download and manage OCR models.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use console::style;
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Where the PaddleOCR ONNX exports are fetched from unless `--base-url` is given.
const DEFAULT_BASE_URL: &str = "https://github.com/jakubmatias/incr/raw/main/models";

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List available models
    List,

    /// Download models
    Download(DownloadArgs),

    /// Check model status
    Status(DirArgs),

    /// Remove downloaded models
    Clean(DirArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelVariant {
    /// Mobile detection model - smaller, faster
    Mobile,
    /// Server detection model - better on dense scans
    Server,
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelVariant::Mobile => write!(f, "mobile"),
            ModelVariant::Server => write!(f, "server"),
        }
    }
}

#[derive(Args)]
struct DownloadArgs {
    /// Model variant to download
    #[arg(long, value_enum, default_value = "mobile")]
    variant: ModelVariant,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Base URL hosting `<variant>/<file>`
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Force re-download even if files exist
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct DirArgs {
    /// Model directory
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

/// A file the OCR engine needs.
struct ModelFile {
    filename: &'static str,
    size_bytes: u64,
    description: &'static str,
}

fn model_files(variant: ModelVariant) -> [ModelFile; 3] {
    let detection = match variant {
        ModelVariant::Mobile => ModelFile {
            filename: "det.onnx",
            size_bytes: 4_500_000,
            description: "PP-OCRv3 mobile text detection",
        },
        ModelVariant::Server => ModelFile {
            filename: "det.onnx",
            size_bytes: 84_000_000,
            description: "PP-OCRv5 server text detection",
        },
    };
    [
        detection,
        ModelFile {
            filename: "latin_rec.onnx",
            size_bytes: 7_500_000,
            description: "Latin text recognition",
        },
        ModelFile {
            filename: "latin_dict.txt",
            size_bytes: 2_000,
            description: "Latin character dictionary",
        },
    ]
}

/// Managed model location, used when no other directory is configured.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("refmark")
        .join("models")
}

pub async fn run(args: ModelsArgs) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::List => list_models(),
        ModelsCommand::Download(download_args) => download_models(download_args).await,
        ModelsCommand::Status(dir_args) => check_status(&dir_args.dir.unwrap_or_else(default_model_dir)).map(|_| ()),
        ModelsCommand::Clean(dir_args) => clean_models(&dir_args.dir.unwrap_or_else(default_model_dir)),
    }
}

fn list_models() -> anyhow::Result<()> {
    println!("{}", style("Available Model Variants").bold());
    println!();

    for variant in [ModelVariant::Mobile, ModelVariant::Server] {
        let files = model_files(variant);
        let total_size: u64 = files.iter().map(|m| m.size_bytes).sum();

        println!(
            "{} {}",
            style(format!("▸ {}", variant)).bold().cyan(),
            format_size(total_size)
        );
        for model in &files {
            println!(
                "    {:<20} {:>10}  {}",
                model.filename,
                format_size(model.size_bytes),
                model.description
            );
        }
        println!();
    }

    println!("Models are installed to {}", default_model_dir().display());
    println!();
    println!("Commands:");
    println!("  refmark models download --variant mobile   Download mobile models");
    println!("  refmark models download --variant server   Download server models");

    Ok(())
}

async fn download_models(args: DownloadArgs) -> anyhow::Result<()> {
    let variant = args.variant;
    let output_dir = args.output.unwrap_or_else(default_model_dir);
    fs::create_dir_all(&output_dir)?;

    println!(
        "{} Downloading {} models to {}",
        style("ℹ").blue(),
        style(variant.to_string()).cyan().bold(),
        output_dir.display()
    );
    println!();

    let client = reqwest::Client::builder()
        .user_agent(concat!("refmark/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let multi_progress = MultiProgress::new();
    let bar_style = ProgressStyle::default_bar()
        .template("  {spinner:.green} {msg:<30} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")?
        .progress_chars("=>-");

    let mut success_count = 0;
    let mut skip_count = 0;
    let mut error_count = 0;

    for model in model_files(variant) {
        let path = output_dir.join(model.filename);

        if path.exists() && !args.force {
            let size = fs::metadata(&path)?.len();
            if size > model.size_bytes / 2 {
                println!(
                    "  {} {} (already exists, {})",
                    style("✓").green(),
                    model.filename,
                    format_size(size)
                );
                skip_count += 1;
                continue;
            }
        }

        let url = format!("{}/{}/{}", args.base_url.trim_end_matches('/'), variant, model.filename);

        let pb = multi_progress.add(ProgressBar::new(model.size_bytes));
        pb.set_style(bar_style.clone());
        pb.set_message(model.filename.to_string());

        match download_file(&client, &url, &path, &pb).await {
            Ok(()) => {
                pb.finish_with_message(format!("{} {}", style("✓").green(), model.filename));
                success_count += 1;
            }
            Err(e) => {
                pb.finish_with_message(format!("{} {} - {}", style("✗").red(), model.filename, e));
                error_count += 1;
            }
        }
    }

    println!();

    if error_count == 0 {
        println!(
            "{} {} models ready",
            style("✓").green().bold(),
            variant
        );
        if skip_count > 0 {
            println!(
                "   {} downloaded, {} already present",
                success_count, skip_count
            );
        }
    } else {
        println!(
            "{} Download completed with errors",
            style("⚠").yellow().bold()
        );
        println!(
            "   {} downloaded, {} skipped, {} failed",
            success_count, skip_count, error_count
        );
        println!("Retry with: refmark models download --variant {} --force", variant);
    }

    println!();
    check_status(&output_dir)?;

    if error_count > 0 {
        anyhow::bail!("{} model file(s) failed to download", error_count);
    }

    Ok(())
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    pb: &ProgressBar,
) -> anyhow::Result<()> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }

    if let Some(content_length) = response.content_length() {
        pb.set_length(content_length);
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Print which model files are present; returns whether all are.
fn check_status(model_dir: &Path) -> anyhow::Result<bool> {
    println!("{}", style("Model Status").bold());
    println!("Directory: {}", model_dir.display());
    println!();

    let mut all_present = true;
    let mut total_size: u64 = 0;

    // Mobile minimums; a server det.onnx is larger and passes too.
    for model in model_files(ModelVariant::Mobile) {
        let path = model_dir.join(model.filename);
        let (status, size_str) = if path.exists() {
            let size = fs::metadata(&path)?.len();
            total_size += size;
            if size > model.size_bytes / 2 {
                (style("✓").green(), format_size(size))
            } else {
                all_present = false;
                (style("⚠").yellow(), format!("{} (incomplete?)", format_size(size)))
            }
        } else {
            all_present = false;
            (style("✗").red(), "missing".to_string())
        };

        println!("    {} {:<25} {:>10}", status, model.filename, size_str);
    }

    if all_present {
        println!(
            "    {} Ready ({} total)",
            style("✓").green(),
            format_size(total_size)
        );
    } else {
        println!(
            "    {} Run 'refmark models download' to download",
            style("⚠").yellow()
        );
    }

    Ok(all_present)
}

fn clean_models(model_dir: &Path) -> anyhow::Result<()> {
    if !model_dir.exists() {
        println!("{} No model files to remove.", style("ℹ").blue());
        return Ok(());
    }

    let mut total_removed = 0;
    let mut total_freed: u64 = 0;

    for model in model_files(ModelVariant::Mobile) {
        let path = model_dir.join(model.filename);
        if path.exists() {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            fs::remove_file(&path)?;
            total_removed += 1;
            total_freed += size;
            println!("  {} Removed {}", style("✓").green(), model.filename);
        }
    }

    for entry in fs::read_dir(model_dir)?.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "tmp") {
            let _ = fs::remove_file(&path);
        }
    }

    if total_removed > 0 {
        println!();
        println!(
            "{} Removed {} files, freed {}",
            style("✓").green(),
            total_removed,
            format_size(total_freed)
        );
    } else {
        println!("{} No model files to remove.", style("ℹ").blue());
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1}GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}
