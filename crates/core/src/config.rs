//! Pipeline configuration and default artifact locations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Inference engine version used when none is configured.
pub const DEFAULT_ENGINE_VERSION: &str = "5.0.2";

pub const DEFAULT_OUTPUT_JAR: &str = "game-transformed.jar";
pub const DEFAULT_INTERMEDIARY_MAPPINGS: &str = "slintermediary.tiny";
pub const DEFAULT_NAMED_MAPPINGS: &str = "spstarmap.tiny";

/// Configuration file contents. Every field is optional; see
/// [`PipelineSettings::resolve`] for the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Apply structural normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_normalization: Option<bool>,
    /// Remap to intermediary names. Defaults to `with_normalization`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_intermediary_remap: Option<bool>,
    /// Run semantic name inference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_inference: Option<bool>,
    /// Inference engine version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
}

impl PipelineSettings {
    /// Take the immutable snapshot a run works from.
    pub fn resolve(&self) -> PipelineConfig {
        let with_normalization = self.with_normalization.unwrap_or(true);
        PipelineConfig {
            with_normalization,
            with_intermediary_remap: self.with_intermediary_remap.unwrap_or(with_normalization),
            with_inference: self.with_inference.unwrap_or(true),
            engine_version: self
                .engine_version
                .clone()
                .unwrap_or_else(|| DEFAULT_ENGINE_VERSION.to_string()),
        }
    }
}

/// Snapshot of the pipeline switches taken at run start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub with_normalization: bool,
    pub with_intermediary_remap: bool,
    pub with_inference: bool,
    pub engine_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineSettings::default().resolve()
    }
}

/// Load pipeline settings from a `.yaml`/`.yml` or `.json` file.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline config at {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let settings = match ext.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse YAML pipeline config {}", path.display()))?,
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse JSON pipeline config {}", path.display()))?,
        _ => bail!("Unsupported pipeline config extension (use .yaml, .yml or .json): {}", path.display()),
    };
    Ok(settings)
}

/// Input and output locations of one deobfuscation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub input_jar: PathBuf,
    pub output_jar: PathBuf,
    pub intermediary_mappings: PathBuf,
    pub named_mappings: PathBuf,
}

impl ArtifactPaths {
    /// Default artifact names inside `out_dir`.
    pub fn in_dir(input_jar: impl Into<PathBuf>, out_dir: &Path) -> Self {
        Self {
            input_jar: input_jar.into(),
            output_jar: out_dir.join(DEFAULT_OUTPUT_JAR),
            intermediary_mappings: out_dir.join(DEFAULT_INTERMEDIARY_MAPPINGS),
            named_mappings: out_dir.join(DEFAULT_NAMED_MAPPINGS),
        }
    }

    pub fn outputs(&self) -> [&Path; 3] {
        [&self.output_jar, &self.intermediary_mappings, &self.named_mappings]
    }
}
