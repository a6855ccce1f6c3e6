use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use starmap_core::config::{load_pipeline_config, ArtifactPaths, PipelineConfig, PipelineSettings};
use starmap_core::services::pipeline::{Deobfuscator, RunReport};

use crate::resolve_path_arg;

pub const RUN_METADATA_FILE: &str = "run_metadata.json";

/// Command-line inputs of `deobfuscate`.
#[derive(Debug, Clone, Default)]
pub struct DeobfuscateOptions {
    pub input: String,
    pub config: Option<String>,
    pub output_dir: String,
    pub output_jar: Option<String>,
    pub intermediary_mappings: Option<String>,
    pub named_mappings: Option<String>,
    pub no_normalization: bool,
    pub no_remap: bool,
    pub no_inference: bool,
    pub engine_version: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub path: String,
    pub sha256: String,
}

/// Contents of `run_metadata.json`, written only after a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub tool_version: String,
    pub input: String,
    pub input_hash: String,
    pub config: PipelineConfig,
    pub report: RunReport,
    pub outputs: Vec<OutputRecord>,
    pub started_at: String,
    pub finished_at: String,
}

/// Merge the optional config file with the command-line overrides.
pub fn resolve_pipeline_config(options: &DeobfuscateOptions) -> Result<PipelineConfig> {
    let mut settings = match &options.config {
        Some(path) => {
            let path = resolve_path_arg(path)?;
            load_pipeline_config(&path)?
        }
        None => PipelineSettings::default(),
    };
    if options.no_normalization {
        settings.with_normalization = Some(false);
    }
    if options.no_remap {
        settings.with_intermediary_remap = Some(false);
    }
    if options.no_inference {
        settings.with_inference = Some(false);
    }
    if let Some(version) = &options.engine_version {
        settings.engine_version = Some(version.clone());
    }
    Ok(settings.resolve())
}

fn artifact_paths(options: &DeobfuscateOptions) -> Result<ArtifactPaths> {
    let input = resolve_path_arg(&options.input)?;
    let out_dir = resolve_path_arg(&options.output_dir)?;
    let mut paths = ArtifactPaths::in_dir(input, &out_dir);
    if let Some(path) = &options.output_jar {
        paths.output_jar = resolve_path_arg(path)?;
    }
    if let Some(path) = &options.intermediary_mappings {
        paths.intermediary_mappings = resolve_path_arg(path)?;
    }
    if let Some(path) = &options.named_mappings {
        paths.named_mappings = resolve_path_arg(path)?;
    }
    Ok(paths)
}

/// Where `run_metadata.json` goes: next to the output jar.
pub fn run_metadata_path(paths: &ArtifactPaths) -> PathBuf {
    paths.output_jar.parent().map(Path::to_path_buf).unwrap_or_default().join(RUN_METADATA_FILE)
}

/// Hex SHA-256 of a run artifact.
pub fn artifact_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// One record per file the run wrote: the jar, then the intermediary and
/// named mappings when those phases ran.
pub fn hash_outputs(report: &RunReport) -> Result<Vec<OutputRecord>> {
    std::iter::once(&report.output_jar)
        .chain(report.intermediary_mappings.iter())
        .chain(report.named_mappings.iter())
        .map(|path| Ok(OutputRecord { path: path.display().to_string(), sha256: artifact_sha256(path)? }))
        .collect()
}

/// Run the deobfuscation pipeline and record the run.
pub fn deobfuscate_command(options: &DeobfuscateOptions) -> Result<()> {
    let config = resolve_pipeline_config(options)?;
    let paths = artifact_paths(options)?;
    let metadata_path = run_metadata_path(&paths);

    // A leftover record would vouch for outputs this run is about to replace.
    if metadata_path.exists() {
        fs::remove_file(&metadata_path)
            .with_context(|| format!("Failed to remove stale {}", metadata_path.display()))?;
    }

    let started_at = Utc::now().to_rfc3339();
    let report = Deobfuscator::new(config.clone())
        .run(&paths)
        .with_context(|| format!("Deobfuscation of {} failed", paths.input_jar.display()))?;
    let finished_at = Utc::now().to_rfc3339();

    let outputs = hash_outputs(&report)?;
    let metadata = RunMetadata {
        tool_version: starmap_core::version().to_string(),
        input: paths.input_jar.display().to_string(),
        input_hash: artifact_sha256(&paths.input_jar)?,
        config,
        report,
        outputs,
        started_at,
        finished_at,
    };
    let json = serde_json::to_string_pretty(&metadata)?;
    fs::write(&metadata_path, &json)
        .with_context(|| format!("Failed to write {}", metadata_path.display()))?;

    if options.json {
        println!("{json}");
        return Ok(());
    }

    let report = &metadata.report;
    println!("Deobfuscated {}", metadata.input);
    if report.passthrough {
        println!("  Mode: passthrough (no transformation enabled)");
    } else {
        println!("  Classes: {}", report.classes);
        println!("  Stages: {}", report.stages.join(", "));
    }
    for warning in &report.warnings {
        println!("  Warning: {warning}");
    }
    for output in &metadata.outputs {
        println!("  Wrote {} (sha256 {})", output.path, output.sha256);
    }
    println!("  Metadata: {}", metadata_path.display());
    Ok(())
}
