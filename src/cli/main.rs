//! Heuristic background removal CLI
//!
//! Removes backgrounds from single files, directories or stdin, and can
//! replace the removed background in the same run.

use super::config::CliConfigBuilder;
use crate::{
    background::compose_image,
    config::{BackgroundConfig, BackgroundKind, CompositingOptions, ProcessingOptions},
    remove_background_from_bytes,
    services::{ConsoleProgressReporter, ImageIOService, OutputFormatHandler, ProgressHandle},
    tracing_config::{init_cli_tracing, TracingFormat},
    OutputFormat, ProcessingResult,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Heuristic background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "heuristic-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Segmentation strategy
    #[arg(short, long, value_enum, default_value_t = CliAlgorithm::Auto)]
    pub algorithm: CliAlgorithm,

    /// Detection sensitivity (10-100); higher keeps more of the image as foreground
    #[arg(short, long, default_value_t = 25)]
    pub sensitivity: u8,

    /// Edge feathering radius in pixels
    #[arg(long, default_value_t = 15.0)]
    pub feather: f32,

    /// Disable edge feathering
    #[arg(long)]
    pub no_feather: bool,

    /// Detail preservation strength (0-1)
    #[arg(long, default_value_t = 0.5)]
    pub detail: f32,

    /// Disable detail preservation
    #[arg(long)]
    pub no_detail: bool,

    /// Morphological closing iterations (0-10)
    #[arg(long, default_value_t = 1)]
    pub smoothing: u8,

    /// Maximum working width in pixels
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Maximum working height in pixels
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Trade speed for a lower memory ceiling
    #[arg(long)]
    pub memory_optimized: bool,

    /// Seed for color clustering
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output quality (10-100)
    #[arg(short, long, default_value_t = 90)]
    pub quality: u8,

    /// Replacement background: transparent, color:#hex, gradient:#c1,#c2[;angle], blur[:sigma], image:path
    #[arg(short, long, value_name = "BACKGROUND")]
    pub background: Option<String>,

    /// Drop shadow opacity (0-1), needs --background
    #[arg(long, default_value_t = 0.0)]
    pub shadow_intensity: f32,

    /// Drop shadow offset as "x,y"
    #[arg(long, value_name = "X,Y", allow_hyphen_values = true)]
    pub shadow_offset: Option<String>,

    /// Drop shadow blur sigma
    #[arg(long, default_value_t = 6.0)]
    pub shadow_softness: f32,

    /// Also write the mask next to each output as <name>_mask.png
    #[arg(long)]
    pub save_mask: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Plain log output without colors
    #[arg(long)]
    pub plain_logs: bool,

    /// Process directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for batch processing (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Webp,
    Rgba8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliAlgorithm {
    Auto,
    Portrait,
    Object,
    Precise,
}

/// Everything a single job needs besides its input
struct JobSettings {
    options: ProcessingOptions,
    background: Option<BackgroundConfig>,
    compositing: CompositingOptions,
    save_mask: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.plain_logs {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };
    init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli)?;

    let mut options = CliConfigBuilder::from_cli(&cli)?;
    let background = cli
        .background
        .as_deref()
        .map(CliConfigBuilder::background)
        .transpose()?;
    let compositing = CliConfigBuilder::compositing(&cli)?;

    // Stage logging is only useful when one file is being processed
    if cli.verbose > 0 && cli.input.len() == 1 {
        options.progress = ProgressHandle::new(Arc::new(
            ConsoleProgressReporter::new(cli.verbose > 1),
        ));
    }

    debug!(
        algorithm = ?options.primary_algorithm,
        sensitivity = options.sensitivity,
        seed = options.seed,
        "Options resolved"
    );

    let settings = JobSettings {
        options,
        background,
        compositing,
        save_mask: cli.save_mask,
    };

    let start_time = Instant::now();
    let processed = process_inputs(&cli, &settings).await?;
    info!(
        "Processed {} image(s) in {:.2}s",
        processed,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn process_inputs(cli: &Cli, settings: &JobSettings) -> Result<usize> {
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli.output.as_deref(), settings).await;
    }

    let all_files = collect_input_files(&cli.input, cli.recursive, cli.pattern.as_deref())?;
    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }
    info!("Found {} image file(s) to process", all_files.len());

    let file_count = all_files.len();
    let output_format = settings.options.output_format;
    let output_dir = if file_count > 1 {
        prepare_output_dir(cli.output.as_deref())?
    } else {
        None
    };

    let progress = if file_count > 1 {
        let pb = ProgressBar::new(file_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut processed_count = 0;
    let mut failed_count = 0;

    for input_file in &all_files {
        if let Some(pb) = &progress {
            pb.set_message(format!("Processing {}", input_file.display()));
        }

        let output_path = match (&output_dir, file_count) {
            (_, 1) => cli
                .output
                .as_ref()
                .map_or_else(|| generate_output_path(input_file, output_format), PathBuf::from),
            (Some(dir), _) => generate_output_path_with_dir(input_file, dir, output_format),
            (None, _) => generate_output_path(input_file, output_format),
        };

        match process_single_file(input_file, &output_path, settings).await {
            Ok(()) => processed_count += 1,
            Err(e) => {
                error!("Failed to process {}: {:#}", input_file.display(), e);
                failed_count += 1;
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {processed_count}, Failed: {failed_count}"
        ));
    }

    if failed_count > 0 {
        warn!("Some files failed to process. Processed: {processed_count}, Failed: {failed_count}");
        if processed_count == 0 {
            anyhow::bail!("All {failed_count} input(s) failed");
        }
    }

    Ok(processed_count)
}

/// Expand inputs into a sorted list of image files
fn collect_input_files(
    inputs: &[String],
    recursive: bool,
    pattern: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            if ImageIOService::is_supported_format(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, recursive, pattern)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Alphanumerical order keeps batch output stable
    files.sort();
    Ok(files)
}

fn prepare_output_dir(output: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };
    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }
    let output_path = PathBuf::from(output);
    if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    if !output_path.exists() {
        std::fs::create_dir_all(&output_path).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;
    }
    Ok(Some(output_path))
}

/// Run one job and return the bytes to write alongside the removal result
async fn run_job(image_bytes: Vec<u8>, settings: &JobSettings) -> Result<(Vec<u8>, ProcessingResult)> {
    let original = match &settings.background {
        Some(bg) if bg.kind == BackgroundKind::Blur && bg.image_data.is_none() => {
            Some(image_bytes.clone())
        },
        _ => None,
    };

    let result = remove_background_from_bytes(image_bytes, &settings.options)
        .await
        .context("Background removal failed")?;

    info!(
        "Removed background: confidence {:.2}, regions [{}]",
        result.confidence,
        result.objects_detected.join(", ")
    );

    let bytes = match &settings.background {
        Some(bg) if bg.kind != BackgroundKind::Transparent => {
            let bg = match original {
                Some(data) => bg.clone().with_image_data(data),
                None => bg.clone(),
            };
            let composed = compose_image(&result.image, &bg, &settings.compositing)
                .context("Background compositing failed")?;
            OutputFormatHandler::encode(
                &composed,
                settings.compositing.output_format,
                settings.compositing.quality,
            )?
        },
        _ => result.encoded.clone(),
    };

    Ok((bytes, result))
}

async fn process_single_file(input: &Path, output: &Path, settings: &JobSettings) -> Result<()> {
    let image_bytes = ImageIOService::load_file(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let (bytes, result) = run_job(image_bytes, settings).await?;

    if output.as_os_str() == "-" {
        return write_stdout(&bytes);
    }

    ImageIOService::save_bytes(&bytes, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Saved {}", output.display());

    if settings.save_mask {
        let mask_path = mask_output_path(output);
        result.save_mask(&mask_path)?;
        info!("Saved mask {}", mask_path.display());
    }
    Ok(())
}

async fn process_stdin(output: Option<&str>, settings: &JobSettings) -> Result<usize> {
    info!("Reading image from stdin");
    let image_bytes = read_stdin()?;
    let (bytes, result) = run_job(image_bytes, settings).await?;

    match output {
        None | Some("-") => {
            if settings.save_mask {
                warn!("--save-mask needs a file output; mask skipped");
            }
            write_stdout(&bytes)?;
        },
        Some(path) => {
            let path = Path::new(path);
            ImageIOService::save_bytes(&bytes, path)?;
            if settings.save_mask {
                result.save_mask(mask_output_path(path))?;
            }
        },
    }
    Ok(1)
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file()
                && ImageIOService::is_supported_format(path)
                && matches_pattern(path, pattern)
            {
                files.push(path.to_path_buf());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file()
                && ImageIOService::is_supported_format(&path)
                && matches_pattern(&path, pattern)
            {
                files.push(path);
            }
        }
    }

    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    glob::Pattern::new(pattern).is_ok_and(|p| p.matches(filename))
}

fn output_file_name(input_path: &Path, format: OutputFormat) -> String {
    let stem = input_path.file_stem().unwrap_or_default();
    format!(
        "{}_bg_removed.{}",
        stem.to_string_lossy(),
        OutputFormatHandler::get_extension(format)
    )
}

fn generate_output_path(input_path: &Path, format: OutputFormat) -> PathBuf {
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(output_file_name(input_path, format))
}

fn generate_output_path_with_dir(input_path: &Path, output_dir: &Path, format: OutputFormat) -> PathBuf {
    output_dir.join(output_file_name(input_path, format))
}

fn mask_output_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    output.with_file_name(format!("{stem}_mask.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_matches_pattern() {
        let path = Path::new("photos/cat.jpg");
        assert!(matches_pattern(path, None));
        assert!(matches_pattern(path, Some("*.jpg")));
        assert!(!matches_pattern(path, Some("*.png")));
        assert!(!matches_pattern(path, Some("[")));
    }

    #[test]
    fn test_generate_output_path() {
        assert_eq!(
            generate_output_path(Path::new("/tmp/in/cat.jpg"), OutputFormat::Png),
            PathBuf::from("/tmp/in/cat_bg_removed.png")
        );
        assert_eq!(
            generate_output_path_with_dir(Path::new("a/b/dog.png"), Path::new("out"), OutputFormat::WebP),
            PathBuf::from("out/dog_bg_removed.webp")
        );
        assert_eq!(
            mask_output_path(Path::new("out/dog_bg_removed.webp")),
            PathBuf::from("out/dog_bg_removed_mask.png")
        );
    }

    #[test]
    fn test_find_image_files_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(temp_dir.path().join("b.png"), b"").unwrap();
        fs::write(temp_dir.path().join("a.jpg"), b"").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();
        fs::write(nested.join("c.png"), b"").unwrap();

        let flat = find_image_files(temp_dir.path(), false, None).unwrap();
        assert_eq!(flat.len(), 2);

        let inputs = vec![temp_dir.path().to_string_lossy().to_string()];
        let all = collect_input_files(&inputs, true, None).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.png"]);

        let pngs = collect_input_files(&inputs, true, Some("*.png")).unwrap();
        assert_eq!(pngs.len(), 2);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let inputs = vec!["/definitely/not/here.png".to_string()];
        assert!(collect_input_files(&inputs, false, None).is_err());
    }

    #[test]
    fn test_prepare_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("out");
        let created = prepare_output_dir(target.to_str()).unwrap();
        assert_eq!(created.as_deref(), Some(target.as_path()));
        assert!(target.is_dir());

        assert!(prepare_output_dir(Some("-")).is_err());
        let file = temp_dir.path().join("file.png");
        fs::write(&file, b"x").unwrap();
        assert!(prepare_output_dir(file.to_str()).is_err());
        assert!(prepare_output_dir(None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_process_single_file_with_background_and_mask() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("square.png");
        let mut image = image::RgbaImage::from_pixel(40, 40, image::Rgba([250, 250, 250, 255]));
        for y in 12..28 {
            for x in 12..28 {
                image.put_pixel(x, y, image::Rgba([200, 20, 20, 255]));
            }
        }
        image.save(&input).unwrap();

        let settings = JobSettings {
            options: ProcessingOptions::default(),
            background: Some(BackgroundConfig::color("#0000ff")),
            compositing: CompositingOptions::default(),
            save_mask: true,
        };
        let output = temp_dir.path().join("square_bg_removed.png");
        process_single_file(&input, &output, &settings).await.unwrap();

        let composed = image::open(&output).unwrap().to_rgba8();
        assert_eq!(composed.dimensions(), (40, 40));
        assert!(composed.pixels().all(|p| p.0[3] == 255));

        let mask = image::open(temp_dir.path().join("square_bg_removed_mask.png")).unwrap();
        assert_eq!(mask.width(), 40);
    }
}
