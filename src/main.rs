mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cli::{Cli, Command, FeatureArgs};
use respiro::config::{self, Config, ResolutionMode};
use respiro::render::ColorMap;
use respiro::service::{
    AnalysisService, FileReportStore, HttpClassifier, LocalObjectStore, PatientInfo, ReportStore,
};
use respiro::FeaturePipeline;

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac"];

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(config::discover_config_path);
    let mut cfg = match config_path {
        Some(ref path) => {
            let cfg = config::load_config(path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    apply_overrides(&mut cfg, &cli.features)?;

    let pipeline = FeaturePipeline::new(cfg.features.clone(), cfg.render.clone())
        .context("Invalid feature extraction settings")?;

    match cli.command {
        Command::Spectrogram { input, output } => spectrogram(&pipeline, &input, &output),
        Command::Batch { input_dir, output_dir } => batch(&pipeline, &input_dir, &output_dir),
        Command::Analyze {
            input,
            patient_name,
            patient_age,
        } => analyze(
            pipeline,
            &cfg,
            &input,
            PatientInfo {
                name: patient_name,
                age: patient_age,
            },
        ),
        Command::History { limit } => history(&cfg, limit),
        Command::Delete {
            patient_name,
            report_id,
        } => {
            let reports = FileReportStore::new(cfg.storage.resolved_root()?);
            reports.delete(&patient_name, &report_id)?;
            println!("Deleted report {} for {}", report_id, patient_name);
            Ok(())
        }
    }
}

/// CLI flags win over config file values.
fn apply_overrides(cfg: &mut Config, args: &FeatureArgs) -> Result<()> {
    if let Some(v) = args.frame_length { cfg.features.frame_length = v; }
    if let Some(v) = args.hop_length { cfg.features.hop_length = v; }
    if let Some(v) = args.n_mels { cfg.features.n_mels = v; }
    if let Some(v) = args.f_max { cfg.features.f_max = Some(v); }
    if let Some(v) = args.floor_db { cfg.features.floor_db = v; }
    if let Some(v) = args.width { cfg.render.width = v; }
    if let Some(v) = args.height { cfg.render.height = v; }
    if args.native { cfg.render.mode = ResolutionMode::Native; }
    if let Some(ref name) = args.color_map {
        cfg.render.color_map = ColorMap::from_name(name)
            .with_context(|| format!("Unknown color map '{}'. Valid names: magma, gray", name))?;
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read audio file: {}", path.display()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn render_file(pipeline: &FeaturePipeline, input: &Path, output: &Path) -> Result<()> {
    let bytes = read_input(input)?;
    let image = pipeline
        .extract_with_hint(&bytes, extension_of(input).as_deref())
        .with_context(|| format!("Failed to extract spectrogram from {}", input.display()))?;
    let png = image.to_png()?;
    std::fs::write(output, png).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

fn spectrogram(pipeline: &FeaturePipeline, input: &Path, output: &Path) -> Result<()> {
    log::info!("Input: {}", input.display());
    render_file(pipeline, input, output)?;
    log::info!("Done! Output: {}", output.display());
    Ok(())
}

fn batch(pipeline: &FeaturePipeline, input_dir: &Path, output_dir: &Path) -> Result<()> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to list {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            extension_of(p).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        })
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        anyhow::bail!("No audio files found in {}", input_dir.display());
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    log::info!("Rendering {} files with {} workers", inputs.len(), rayon::current_num_threads());

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let failures = AtomicUsize::new(0);
    inputs.par_iter().for_each(|input| {
        let stem = input.file_stem().map_or_else(|| "output".into(), |s| s.to_string_lossy());
        let output = output_dir.join(format!("{stem}.png"));
        if let Err(err) = render_file(pipeline, input, &output) {
            log::warn!("{:#}", err);
            failures.fetch_add(1, Ordering::Relaxed);
        }
        pb.inc(1);
    });
    pb.finish_with_message("Rendering complete");

    let failed = failures.into_inner();
    log::info!(
        "Rendered {} of {} files into {}",
        inputs.len() - failed,
        inputs.len(),
        output_dir.display()
    );
    if failed > 0 {
        anyhow::bail!("{} file(s) failed", failed);
    }
    Ok(())
}

fn analyze(
    pipeline: FeaturePipeline,
    cfg: &Config,
    input: &Path,
    patient: PatientInfo,
) -> Result<()> {
    let endpoint = cfg
        .inference
        .endpoint
        .clone()
        .context("inference.endpoint must be set in the config file to run an analysis")?;
    let token = std::env::var(&cfg.inference.token_env).ok();
    let timeout = Duration::from_secs(cfg.inference.timeout_secs);
    let classifier = HttpClassifier::new(endpoint, token, timeout)?;

    let root = cfg.storage.resolved_root()?;
    let service = AnalysisService::new(
        pipeline,
        classifier,
        LocalObjectStore::new(root.join("objects"), cfg.storage.public_base_url.clone()),
        FileReportStore::new(&root),
    );

    let bytes = read_input(input)?;
    let report = service
        .analyze(&bytes, extension_of(input).as_deref(), &patient)
        .with_context(|| format!("Analysis of {} failed", input.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn history(cfg: &Config, limit: Option<usize>) -> Result<()> {
    let reports = FileReportStore::new(cfg.storage.resolved_root()?);
    let limit = limit.unwrap_or(cfg.storage.history_limit);
    for report in reports.recent(limit)? {
        println!(
            "{}  {:<20} {:>4}  {:<16} {:>6.2}%  {}",
            report.timestamp,
            report.patient_name,
            report.patient_age,
            report.diagnosis,
            report.confidence,
            report.id
        );
    }
    Ok(())
}
