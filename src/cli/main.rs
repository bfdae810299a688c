//! bg-blaster command-line driver
//!
//! Drives the UI controller: the spinner plays the loading overlay, and each
//! input goes through select -> process -> write artifacts.

use super::config::CliConfigBuilder;
use crate::cache::{format_size, ModelCache};
use crate::compositor::{artifact_names, COMPOSITE_SUFFIX, MASK_SUFFIX};
use crate::config::CACHE_DIR_ENV;
use crate::controller::{Controller, ModelStatus};
use crate::session::{MattingSession, ModelSession};
use crate::types::SourceImage;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff"];

/// Cut the background out of images with the RMBG-1.4 matting model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-blaster")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present_any = &["only_download", "list_models", "clear_cache", "show_cache_dir"])]
    pub input: Vec<String>,

    /// Directory for `<name>-mask.png` and `<name>-bg-blasted.png` [default: next to each input]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Model repository on the hub, or a local model directory with --allow-local-models
    #[arg(short, long)]
    pub model: Option<String>,

    /// Inference backend
    #[arg(short, long, value_enum, default_value_t = CliBackend::Tract)]
    pub backend: CliBackend,

    /// Execution provider for the onnx backend (auto, cpu, cuda, coreml)
    #[arg(long)]
    pub provider: Option<String>,

    /// Number of intra-op threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Use a custom cache root
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Model hub endpoint
    #[arg(long, value_name = "URL")]
    pub hub_endpoint: Option<String>,

    /// Allow --model to name a local directory
    #[arg(long)]
    pub allow_local_models: bool,

    /// Run inference on the calling task instead of the blocking worker pool
    #[arg(long)]
    pub no_proxy: bool,

    /// Download the model into the cache and exit
    #[arg(long)]
    pub only_download: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Clear cached models (combine with --model to clear one model)
    #[arg(long)]
    pub clear_cache: bool,

    /// Show the cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Emit logs as JSON (requires the `tracing-json` feature)
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Tract,
    Onnx,
}

/// Entry point of the `bg-blaster` binary
///
/// # Errors
/// - Invalid arguments or configuration
/// - Model unavailable
/// - Any input that failed to process
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    crate::tracing_config::init_cli_tracing(cli.verbose, cli.json_logs)
        .context("Failed to initialize tracing")?;

    if cli.show_cache_dir {
        return show_cache_dir(&cli);
    }
    if cli.list_models {
        return list_cached_models(&cli);
    }
    if cli.clear_cache {
        return clear_cache(&cli);
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli)?;

    if cli.only_download {
        let session = ModelSession::new(config)?.with_download_progress(true);
        let dir = session
            .resolve_model_dir()
            .await
            .context("Failed to download model")?;
        println!("✅ Model {} available at {}", session.model_id(), dir.display());
        return Ok(());
    }

    let files = collect_inputs(&cli)?;
    if files.is_empty() {
        anyhow::bail!("No image files found in the given inputs");
    }

    info!(
        model = %config.model_id,
        backend = %config.backend_type,
        inputs = files.len(),
        "Starting bg-blaster"
    );

    let mut controller = Controller::new(ModelSession::new(config)?);

    let overlay = loading_overlay();
    controller.mount().await;
    overlay.finish_and_clear();

    if let ModelStatus::Failed(reason) = &controller.state().model {
        anyhow::bail!("Model unavailable: {reason}");
    }

    let start_time = Instant::now();
    let mut failed = 0usize;
    let mut claimed = HashSet::new();
    for file in &files {
        let result = match claim_artifacts(&mut claimed, file, cli.output_dir.as_deref()) {
            Ok(out_dir) => process_file(&mut controller, file, &out_dir).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(file = %file.display(), "{e:#}");
            failed += 1;
        }
    }

    info!(
        "Processed {} of {} image(s) in {:.2}s",
        files.len() - failed,
        files.len(),
        start_time.elapsed().as_secs_f64()
    );

    if failed > 0 {
        anyhow::bail!("{failed} input(s) failed");
    }
    Ok(())
}

fn loading_overlay() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Loading model...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Output directory of an input's artifacts, or the default next to the input
fn artifact_dir(path: &Path, output_dir: Option<&Path>) -> PathBuf {
    output_dir
        .map(Path::to_path_buf)
        .or_else(|| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Reserve the artifact paths of an input for this batch.
/// Fails when an earlier input already produced artifacts with the same names.
fn claim_artifacts(
    claimed: &mut HashSet<PathBuf>,
    path: &Path,
    output_dir: Option<&Path>,
) -> Result<PathBuf> {
    let out_dir = artifact_dir(path, output_dir);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (mask_name, composite_name) = artifact_names(&name);
    let targets = [out_dir.join(mask_name), out_dir.join(composite_name)];

    if let Some(taken) = targets.iter().find(|t| claimed.contains(*t)) {
        anyhow::bail!(
            "Skipping {}: {} was already written by an earlier input",
            path.display(),
            taken.display()
        );
    }
    claimed.extend(targets);
    Ok(out_dir)
}

async fn process_file(
    controller: &mut Controller<ModelSession>,
    path: &Path,
    out_dir: &Path,
) -> Result<()> {
    let source = SourceImage::from_path(path)?;
    if !controller.select_file(source) {
        anyhow::bail!("Selection ignored in stage {:?}", controller.state().stage());
    }
    if !controller.process().await {
        anyhow::bail!("Failed to process {}", path.display());
    }

    let view = controller.view();
    let (Some(mask), Some(composite)) = (view.mask, view.composite) else {
        anyhow::bail!("No artifacts produced for {}", path.display());
    };

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mask_path = mask.write_to_dir(out_dir)?;
    let composite_path = composite.write_to_dir(out_dir)?;

    let record = controller.state().record.as_ref();
    if let Some(results) = record.and_then(|r| r.results()) {
        debug!(timings = %results.timings.summary(), "Timings");
        println!(
            "✅ {} -> {}, {} ({:.1}% foreground)",
            path.display(),
            mask_path.display(),
            composite_path.display(),
            results.statistics.foreground_ratio * 100.0
        );
    }
    Ok(())
}

fn collect_inputs(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in &cli.input {
        let path = PathBuf::from(input);
        if path.is_file() {
            if is_artifact(&path) {
                warn!("Skipping generated artifact: {}", path.display());
            } else if is_image_file(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --pattern")?;
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file()
            && is_image_file(path)
            && !is_artifact(path)
            && matches_pattern(path, pattern.as_ref())
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Output of an earlier run, recognized by its file name suffix
fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(MASK_SUFFIX) || name.ends_with(COMPOSITE_SUFFIX))
}

fn matches_pattern(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    match pattern {
        Some(pattern) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name)),
        None => true,
    }
}

fn cache_for(cli: &Cli) -> Result<ModelCache> {
    ModelCache::from_config_root(cli.cache_dir.as_deref()).context("Failed to open model cache")
}

fn show_cache_dir(cli: &Cli) -> Result<()> {
    let cache = cache_for(cli)?;
    println!("📁 Cache directory: {}", cache.cache_dir().display());
    let source = if cli.cache_dir.is_some() {
        "--cache-dir"
    } else if std::env::var_os(CACHE_DIR_ENV).is_some() {
        "environment variable"
    } else {
        "XDG cache directory"
    };
    println!("   Source: {source}");
    println!("   Override with --cache-dir or {CACHE_DIR_ENV}");
    Ok(())
}

fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = cache_for(cli)?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    if models.is_empty() {
        println!("No cached models found in {}", cache.cache_dir().display());
        println!("💡 Download the default model with: bg-blaster --only-download");
        return Ok(());
    }

    println!("📦 Cached models");
    for model in models {
        println!("📁 {}", model.model_id.replacen("--", "/", 1));
        println!("  └─ Location: {}", model.path.display());
        println!("  └─ Variants: {}", model.variants.join(", "));
        println!("  └─ Size: {}", format_size(model.size_bytes));
        if !model.has_preprocessor {
            println!("  └─ No preprocessor_config.json (fixed parameters are used anyway)");
        }
    }
    Ok(())
}

fn clear_cache(cli: &Cli) -> Result<()> {
    let cache = cache_for(cli)?;

    if let Some(model_id) = &cli.model {
        if cache
            .clear_model(model_id)
            .with_context(|| format!("Failed to clear model '{model_id}'"))?
        {
            println!("✅ Removed cached model: {model_id}");
        } else {
            println!("⚠️  Model '{model_id}' not found in cache");
        }
    } else {
        let removed = cache.clear_all().context("Failed to clear cache")?;
        if removed.is_empty() {
            println!("💡 Cache was already empty");
        } else {
            println!("✅ Removed {} model(s):", removed.len());
            for model_id in &removed {
                println!("   • {model_id}");
            }
        }
    }
    println!("   Cache location: {}", cache.cache_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/cat.PNG")));
        assert!(is_image_file(Path::new("dog.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("README")));
    }

    #[test]
    fn test_find_image_files_respects_depth_and_pattern() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        for file in ["a.png", "b.jpg", "c.txt", "nested/d.png"] {
            std::fs::write(dir.path().join(file), b"x").unwrap();
        }

        let mut flat = find_image_files(dir.path(), false, None).unwrap();
        flat.sort();
        assert_eq!(flat, vec![dir.path().join("a.png"), dir.path().join("b.jpg")]);

        let deep = find_image_files(dir.path(), true, Some("*.png")).unwrap();
        assert_eq!(deep.len(), 2);
        assert!(deep.iter().all(|p| p.extension().unwrap() == "png"));

        assert!(find_image_files(dir.path(), false, Some("[")).is_err());
    }

    #[test]
    fn test_previous_artifacts_are_not_inputs() {
        let dir = TempDir::new().unwrap();
        for file in ["cat.png", "cat-mask.png", "cat-bg-blasted.png", "dog.jpg"] {
            std::fs::write(dir.path().join(file), b"x").unwrap();
        }

        let files = find_image_files(dir.path(), false, None).unwrap();
        let mut names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["cat.png", "dog.jpg"]);

        let cli = Cli::parse_from([
            "bg-blaster",
            dir.path().join("cat-mask.png").to_str().unwrap(),
            dir.path().join("cat.png").to_str().unwrap(),
        ]);
        assert_eq!(collect_inputs(&cli).unwrap(), vec![dir.path().join("cat.png")]);
    }

    #[test]
    fn test_colliding_artifact_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut claimed = HashSet::new();

        let first = dir.path().join("shot.2024.png");
        let second = dir.path().join("shot.2025.png");
        assert_eq!(claim_artifacts(&mut claimed, &first, None).unwrap(), dir.path());
        let err = claim_artifacts(&mut claimed, &second, None).unwrap_err();
        assert!(err.to_string().contains("shot-mask.png"));

        // Same base name in another output directory does not collide
        let elsewhere = dir.path().join("other");
        assert_eq!(
            claim_artifacts(&mut claimed, &second, Some(&elsewhere)).unwrap(),
            elsewhere
        );
        assert!(claim_artifacts(&mut claimed, &dir.path().join("cat.jpg"), None).is_ok());
        assert!(claim_artifacts(&mut claimed, &dir.path().join("cat.png"), None).is_err());
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["bg-blaster"]).is_err());
        assert!(Cli::try_parse_from(["bg-blaster", "--list-models"]).is_ok());
        let cli = Cli::try_parse_from(["bg-blaster", "-vv", "x.png"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.backend, CliBackend::Tract);
    }
}
