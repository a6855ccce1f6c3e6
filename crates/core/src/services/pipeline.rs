//! The deobfuscation pipeline driver.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::archive::{self, ArchiveError};
use crate::backends::normalize::FIX_SWITCH_MAPS;
use crate::backends::{
    default_engine_registry, DefaultIntermediaryGenerator, EngineRegistry, InferenceEngine,
    IntermediaryGenerator, NormalizationStage, NormalizationStages, StageError, StructuralNormalizer,
};
use crate::classfile::ACC_SUPER;
use crate::config::{ArtifactPaths, PipelineConfig};
use crate::mapping::{self, MappingError, MappingFormat, MappingStore};
use crate::model::{ClassGraph, GraphError, MemberRef, RenameSet};

/// Namespaces of the intermediary mapping file.
pub const OFFICIAL_NAMESPACE: &str = "official";
pub const INTERMEDIARY_NAMESPACE: &str = "intermediary";

/// First line of every named mapping file.
pub const NAMED_MAPPINGS_HEADER: &str = "v1\tintermediary\tnamed\n";

pub const INTERMEDIARY_STAGE: &str = "intermediary";
pub const INFERENCE_STAGE: &str = "inference";

/// Warning emitted when remapping is requested without normalization.
pub const REMAP_WITHOUT_NORMALIZATION: &str =
    "Intermediary remapping is enabled but structural normalization is not; remapping will be skipped";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input binary not found at {0}")]
    MissingInput(PathBuf),
    #[error("Unknown inference engine version '{version}' (available: {available})")]
    UnknownEngineVersion { version: String, available: String },
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Stage(#[from] StageError),
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io { path: path.to_path_buf(), source }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Stages executed, in order.
    pub stages: Vec<String>,
    pub warnings: Vec<String>,
    /// Number of classes in the graph (0 for a passthrough run).
    pub classes: usize,
    /// The input was copied unchanged.
    pub passthrough: bool,
    pub output_jar: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediary_mappings: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_mappings: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
}

/// Runs the configured stages over one input jar.
pub struct Deobfuscator {
    config: PipelineConfig,
    normalizer: Box<dyn NormalizationStages>,
    generator: Box<dyn IntermediaryGenerator>,
    engines: EngineRegistry,
}

impl Deobfuscator {
    /// Pipeline using the built-in capabilities.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            normalizer: Box::new(StructuralNormalizer),
            generator: Box::new(DefaultIntermediaryGenerator),
            engines: default_engine_registry(),
        }
    }

    pub fn with_normalizer<N: NormalizationStages + 'static>(mut self, normalizer: N) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn with_generator<G: IntermediaryGenerator + 'static>(mut self, generator: G) -> Self {
        self.generator = Box::new(generator);
        self
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, paths: &ArtifactPaths) -> Result<RunReport, PipelineError> {
        let config = &self.config;
        if !paths.input_jar.is_file() {
            return Err(PipelineError::MissingInput(paths.input_jar.clone()));
        }
        let engine = if config.with_inference {
            let engine = self.engines.create(&config.engine_version).ok_or_else(|| {
                PipelineError::UnknownEngineVersion {
                    version: config.engine_version.clone(),
                    available: self.engines.versions().join(", "),
                }
            })?;
            Some(engine)
        } else {
            None
        };

        let mut report = RunReport { output_jar: paths.output_jar.clone(), ..RunReport::default() };
        if !config.with_normalization && config.with_intermediary_remap {
            warn!("{REMAP_WITHOUT_NORMALIZATION}");
            report.warnings.push(REMAP_WITHOUT_NORMALIZATION.to_string());
        }

        ensure_parent(&paths.output_jar)?;
        if !config.with_normalization && engine.is_none() {
            fs::copy(&paths.input_jar, &paths.output_jar).map_err(io_at(&paths.output_jar))?;
            report.passthrough = true;
            info!("No transformation enabled; copied {} unchanged", paths.input_jar.display());
            return Ok(report);
        }

        let started = Instant::now();
        let contents = archive::read_jar(&paths.input_jar)?;
        let mut graph = archive::build_graph(&contents)?;
        report.classes = graph.len();
        info!("Indexed {} classes in {} ms", graph.len(), started.elapsed().as_millis());

        if config.with_normalization {
            let started = Instant::now();
            self.normalize(&mut graph, &mut report)?;
            info!("Normalization finished in {} ms", started.elapsed().as_millis());
        }

        let remapped = config.with_normalization && config.with_intermediary_remap;
        if remapped {
            let started = Instant::now();
            self.remap_intermediary(&mut graph, &paths.intermediary_mappings)?;
            report.stages.push(INTERMEDIARY_STAGE.to_string());
            report.stages.push(FIX_SWITCH_MAPS.to_string());
            report.intermediary_mappings = Some(paths.intermediary_mappings.clone());
            info!("Intermediary remapping finished in {} ms", started.elapsed().as_millis());
        }

        if !remapped && engine.is_none() {
            refresh(&mut graph)?;
        }

        if let Some(engine) = engine {
            let started = Instant::now();
            ensure_parent(&paths.named_mappings)?;
            let file = File::create(&paths.named_mappings).map_err(io_at(&paths.named_mappings))?;
            let mut out = BufWriter::new(file);
            let renames = stream_named_mappings(&graph, engine.as_ref(), &mut out)
                .map_err(io_at(&paths.named_mappings))?;
            drop(out);
            let renamed = graph.apply_renames(&renames)?;
            debug!("Committed {} named renames ({renamed} classes renamed)", renames.len());
            if remapped {
                refresh(&mut graph)?;
            }
            report.stages.push(INFERENCE_STAGE.to_string());
            report.named_mappings = Some(paths.named_mappings.clone());
            report.engine_version = Some(engine.version().to_string());
            info!("Inference finished in {} ms", started.elapsed().as_millis());
        }

        archive::write_jar(&paths.output_jar, &graph, &contents.resources)?;
        info!("Wrote {}", paths.output_jar.display());
        Ok(report)
    }

    fn normalize(&self, graph: &mut ClassGraph, report: &mut RunReport) -> Result<(), PipelineError> {
        let normalizer = self.normalizer.as_ref();
        for stage in NormalizationStage::iter() {
            let started = Instant::now();
            match stage {
                NormalizationStage::FixInnerClasses => normalizer.fix_inner_classes(graph)?,
                NormalizationStage::FixParameterLvt => normalizer.fix_parameter_lvt(graph)?,
                NormalizationStage::GuessFieldGenerics => normalizer.guess_field_generics(graph)?,
                NormalizationStage::GuessCollectionGenerics => {
                    let guesses = normalizer.guess_collection_return_generics(graph)?;
                    let added = graph.add_signatures(&guesses);
                    debug!("Added {added} collection return signatures");
                }
                NormalizationStage::GuessLambdaStreamGenerics => {
                    let mut guesses: HashMap<MemberRef, String> = HashMap::new();
                    normalizer.guess_lambda_stream_generics(graph, &mut guesses)?;
                    let added = graph.add_signatures(&guesses);
                    debug!("Added {added} lambda and stream signatures");
                }
                NormalizationStage::InferMethodGenerics => normalizer.infer_method_generics(graph)?,
                NormalizationStage::InferConstructorGenerics => normalizer.infer_constructor_generics(graph)?,
                NormalizationStage::FixForeachOnArray => normalizer.fix_foreach_on_array(graph)?,
                NormalizationStage::FixComparators => normalizer.fix_comparators(graph)?,
                NormalizationStage::GuessAnonymousInnerClasses => {
                    normalizer.guess_anonymous_inner_classes(graph)?;
                    graph.clear_inner_class_flag(ACC_SUPER);
                }
            }
            debug!("Stage {} finished in {} ms", stage.name(), started.elapsed().as_millis());
            report.stages.push(stage.name().to_string());
        }
        Ok(())
    }

    fn remap_intermediary(&self, graph: &mut ClassGraph, mappings: &Path) -> Result<(), PipelineError> {
        let renames = self.generator.generate(graph)?;
        debug!("Generator '{}' proposed {} renames", self.generator.name(), renames.len());

        ensure_parent(mappings)?;
        let store = MappingStore::from_renames(&renames, OFFICIAL_NAMESPACE, INTERMEDIARY_NAMESPACE);
        let mut file = File::create(mappings).map_err(io_at(mappings))?;
        mapping::write_store(&store, MappingFormat::TinyFile, &mut file)?;

        let renamed = graph.apply_renames(&renames)?;
        debug!("Remapped {renamed} classes to intermediary names");
        self.normalizer.fix_switch_maps(graph)?;
        Ok(())
    }
}

/// Write the named mappings for `graph` to `out` and return the renames to
/// commit afterwards.
///
/// Writes the header, the engine's proposals and then one `CLASS` line per
/// inner class name correction, and flushes `out`. The graph is only read;
/// the caller applies the returned renames once this succeeds.
pub fn stream_named_mappings(
    graph: &ClassGraph,
    engine: &dyn InferenceEngine,
    out: &mut dyn Write,
) -> io::Result<RenameSet> {
    let mut renames = RenameSet::new();
    out.write_all(NAMED_MAPPINGS_HEADER.as_bytes())?;
    engine.run_all(graph, &mut renames, out)?;
    let fixes = renames.fix_inner_class_names(graph);
    for (from, to) in &fixes {
        writeln!(out, "CLASS\t{from}\t{to}")?;
    }
    out.flush()?;
    debug!("Engine {} proposed {} renames ({} inner class fixes)", engine.version(), renames.len(), fixes.len());
    Ok(renames)
}

/// Rebuild the name index and re-apply inner-class metadata.
fn refresh(graph: &mut ClassGraph) -> Result<(), PipelineError> {
    graph.invalidate_name_caches()?;
    graph.apply_inner_classes();
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), PipelineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_at(parent))
        }
        _ => Ok(()),
    }
}
