//! Jar (zip) reading and writing.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::classfile::{ClassFormatError, ClassRecord};
use crate::model::{ClassGraph, GraphError};

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_SIZE_HINT: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to access archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid zip archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Invalid class file {entry}: {source}")]
    Class {
        entry: String,
        #[source]
        source: ClassFormatError,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A non-class entry carried through unchanged.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub last_modified: DateTime,
    pub is_dir: bool,
}

/// Contents of a jar split into class files and everything else.
#[derive(Debug, Clone, Default)]
pub struct JarContents {
    /// `(entry name, bytes)` of every class file, in archive order.
    pub classes: Vec<(String, Vec<u8>)>,
    /// Resources and directories in archive order.
    pub resources: Vec<ArchiveEntry>,
}

/// Whether a jar entry is a class the pipeline should index.
///
/// Module descriptors and anything under `META-INF/` (including
/// multi-release variants) are treated as resources.
pub fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
        && !name.starts_with("META-INF/")
        && name != "module-info.class"
        && !name.ends_with("/module-info.class")
}

pub fn read_jar(path: &Path) -> Result<JarContents, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::Io { path: path.to_path_buf(), source })?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|source| ArchiveError::Zip { path: path.to_path_buf(), source })?;
    let mut contents = JarContents::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|source| ArchiveError::Zip { path: path.to_path_buf(), source })?;
        let name = entry.name().to_string();
        let is_dir = entry.is_dir();
        let last_modified = entry.last_modified();
        // The declared size is untrusted header data.
        let mut data = Vec::with_capacity(entry.size().min(MAX_SIZE_HINT) as usize);
        if !is_dir {
            entry
                .read_to_end(&mut data)
                .map_err(|source| ArchiveError::Io { path: path.to_path_buf(), source })?;
        }
        if !is_dir && is_class_entry(&name) {
            contents.classes.push((name, data));
        } else {
            contents.resources.push(ArchiveEntry { name, data, last_modified, is_dir });
        }
    }
    debug!(
        "Read {} classes and {} resources from {}",
        contents.classes.len(),
        contents.resources.len(),
        path.display()
    );
    Ok(contents)
}

/// Decode every class entry into a graph.
pub fn build_graph(contents: &JarContents) -> Result<ClassGraph, ArchiveError> {
    let mut graph = ClassGraph::new();
    for (entry, data) in &contents.classes {
        let record = ClassRecord::parse(data)
            .map_err(|source| ArchiveError::Class { entry: entry.clone(), source })?;
        graph.insert(record)?;
    }
    Ok(graph)
}

/// Write the graph plus `resources` as a jar.
///
/// Resources keep their original order and timestamps; classes follow,
/// sorted by name with a fixed timestamp, so identical graphs produce
/// identical archives.
pub fn write_jar(path: &Path, graph: &ClassGraph, resources: &[ArchiveEntry]) -> Result<(), ArchiveError> {
    let io_err = |source| ArchiveError::Io { path: path.to_path_buf(), source };
    let zip_err = |source| ArchiveError::Zip { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    for resource in resources {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(resource.last_modified);
        if resource.is_dir {
            writer.add_directory(resource.name.trim_end_matches('/'), options).map_err(zip_err)?;
        } else {
            writer.start_file(resource.name.as_str(), options).map_err(zip_err)?;
            writer.write_all(&resource.data).map_err(io_err)?;
        }
    }

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut classes: Vec<&ClassRecord> = graph.iter().collect();
    classes.sort_by(|a, b| a.name.cmp(&b.name));
    for class in classes {
        let entry = format!("{}.class", class.name);
        let bytes = class
            .to_bytes()
            .map_err(|source| ArchiveError::Class { entry: entry.clone(), source })?;
        writer.start_file(entry, options).map_err(zip_err)?;
        writer.write_all(&bytes).map_err(io_err)?;
    }

    let mut inner = writer.finish().map_err(zip_err)?;
    inner.flush().map_err(io_err)?;
    Ok(())
}
