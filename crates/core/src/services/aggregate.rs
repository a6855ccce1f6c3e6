//! Merging several mapping files into one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};
use thiserror::Error;

use crate::mapping::{self, enigma, MappingError, MappingFormat, MappingStore};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Failed to read mappings from {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: MappingError,
    },
    #[error("Failed to write {format} mappings to {path}: {source}")]
    Output {
        path: PathBuf,
        format: MappingFormat,
        #[source]
        source: MappingError,
    },
    #[error("Failed to stage output next to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What to merge and where to put the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub input_format: MappingFormat,
    pub output_format: MappingFormat,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub merged: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub classes: usize,
    pub output: PathBuf,
}

/// Read every non-directory input into one store, in order. On conflicting
/// names the later file wins. Returns the store and the skipped inputs.
pub fn merge_inputs(
    format: MappingFormat,
    inputs: &[PathBuf],
) -> Result<(MappingStore, Vec<PathBuf>), AggregateError> {
    let mut store = MappingStore::new();
    let mut skipped = Vec::new();
    for input in inputs {
        if input.is_dir() {
            warn!("Skipping directory {} among mapping inputs", input.display());
            skipped.push(input.clone());
            continue;
        }
        mapping::read_mappings(input, format, &mut store)
            .map_err(|source| AggregateError::Input { path: input.clone(), source })?;
        debug!("Merged {} ({} classes so far)", input.display(), store.class_count());
    }
    Ok((store, skipped))
}

/// Merge `request.inputs` and export the result to `request.output`.
///
/// The output only appears once it has been written completely; on any
/// failure nothing is left at the destination.
pub fn aggregate_mappings(request: &AggregateRequest) -> Result<AggregateSummary, AggregateError> {
    let (store, skipped) = merge_inputs(request.input_format, &request.inputs)?;
    let output = &request.output;
    let output_err = |source| AggregateError::Output {
        path: output.clone(),
        format: request.output_format,
        source,
    };
    let staging_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&staging_dir).map_err(io_at(output))?;

    if request.output_format.is_directory() {
        let staged = Builder::new().prefix(".starmap-").tempdir_in(&staging_dir).map_err(io_at(output))?;
        enigma::write_dir(&store, staged.path()).map_err(output_err)?;
        if output.is_dir() {
            fs::remove_dir_all(output).map_err(io_at(output))?;
        }
        let staged = staged.keep();
        if let Err(source) = fs::rename(&staged, output) {
            let _ = fs::remove_dir_all(&staged);
            return Err(AggregateError::Io { path: output.clone(), source });
        }
    } else {
        let mut staged = NamedTempFile::new_in(&staging_dir).map_err(io_at(output))?;
        mapping::write_store(&store, request.output_format, staged.as_file_mut()).map_err(output_err)?;
        staged
            .persist(output)
            .map_err(|e| AggregateError::Io { path: output.clone(), source: e.error })?;
    }

    let merged: Vec<PathBuf> =
        request.inputs.iter().filter(|input| !skipped.contains(input)).cloned().collect();
    info!(
        "Aggregated {} mapping files ({} classes) into {}",
        merged.len(),
        store.class_count(),
        output.display()
    );
    Ok(AggregateSummary { merged, skipped, classes: store.class_count(), output: output.clone() })
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> AggregateError + '_ {
    move |source| AggregateError::Io { path: path.to_path_buf(), source }
}
