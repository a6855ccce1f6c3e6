//! Name mappings: the in-memory store, the on-disk formats and the visitor
//! protocol connecting them.
//!
//! Readers drive a [`MappingVisitor`]; the [`MappingStore`] and every writer
//! implement it. A visit is a flat event stream: namespaces first, then for
//! each class its destination names and comment followed by its fields and
//! methods (each method followed by its arguments), and finally
//! [`MappingVisitor::visit_end`]. Members always belong to the most recently
//! visited class, arguments to the most recently visited method.

pub mod enigma;
pub mod format;
pub mod proguard;
pub mod store;
pub mod tiny;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use format::{resolve_format, MappingFormat};
pub use store::MappingStore;

/// Kind of element a destination name or comment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Class,
    Field,
    Method,
    MethodArg,
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("No mappings format known under the following name: '{0}'")]
    UnknownFormat(String),

    #[error("Failed to access mappings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}:{line}: {message}")]
    Parse { origin: String, line: usize, message: String },

    #[error("{format} cannot be {operation}")]
    Unsupported { format: MappingFormat, operation: &'static str },

    #[error("Namespace mismatch: {0}")]
    NamespaceMismatch(String),

    #[error("Invalid visit sequence: {0}")]
    Visitor(String),

    #[error(transparent)]
    Write(#[from] std::io::Error),
}

impl MappingError {
    pub(crate) fn parse(origin: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Parse { origin: origin.to_string(), line, message: message.into() }
    }
}

/// Receiver of a mapping visit.
///
/// `visit_class`, `visit_field`, `visit_method` and `visit_method_arg`
/// return whether the visitor wants the element's content (names, comment,
/// children); returning `false` lets the source skip ahead.
pub trait MappingVisitor {
    fn visit_namespaces(&mut self, src: &str, dst: &[String]) -> Result<(), MappingError>;

    fn visit_class(&mut self, src_name: &str) -> Result<bool, MappingError>;

    fn visit_field(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError>;

    fn visit_method(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError>;

    fn visit_method_arg(&mut self, lv_index: u16, src_name: Option<&str>) -> Result<bool, MappingError> {
        let _ = (lv_index, src_name);
        Ok(false)
    }

    /// Destination name of the current element in destination namespace `namespace`.
    fn visit_dst_name(&mut self, kind: ElementKind, namespace: usize, name: &str) -> Result<(), MappingError>;

    fn visit_comment(&mut self, kind: ElementKind, comment: &str) -> Result<(), MappingError> {
        let _ = (kind, comment);
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), MappingError>;
}

/// Parse the mappings at `path` in `format` into `visitor`.
pub fn read_mappings(
    path: &Path,
    format: MappingFormat,
    visitor: &mut dyn MappingVisitor,
) -> Result<(), MappingError> {
    if format.is_directory() {
        return enigma::read_dir(path, visitor);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|source| MappingError::Io { path: path.to_path_buf(), source })?;
    let origin = path.display().to_string();
    match format {
        MappingFormat::TinyFile | MappingFormat::Tiny2File => tiny::read(&content, &origin, visitor),
        MappingFormat::EnigmaFile => enigma::read(&content, &origin, visitor),
        MappingFormat::ProguardFile => proguard::read(&content, &origin, visitor),
        MappingFormat::EnigmaDir => Err(MappingError::Unsupported { format, operation: "read from a single file" }),
    }
}

/// Export `store` to `path` in `format`, creating the file or directory.
pub fn write_mappings(store: &MappingStore, path: &Path, format: MappingFormat) -> Result<(), MappingError> {
    if format.is_directory() {
        return enigma::write_dir(store, path);
    }
    let mut file =
        File::create(path).map_err(|source| MappingError::Io { path: path.to_path_buf(), source })?;
    write_store(store, format, &mut file)
}

/// Serialize `store` in a single-file `format` to `out` and flush it.
pub fn write_store(store: &MappingStore, format: MappingFormat, out: &mut dyn Write) -> Result<(), MappingError> {
    let mut out = BufWriter::new(out);
    match format {
        MappingFormat::TinyFile => store.accept(&mut tiny::TinyV1Writer::new(&mut out))?,
        MappingFormat::Tiny2File => store.accept(&mut tiny::TinyV2Writer::new(&mut out))?,
        MappingFormat::EnigmaFile => store.accept(&mut enigma::EnigmaWriter::new(&mut out))?,
        MappingFormat::ProguardFile => store.accept(&mut proguard::ProguardWriter::new(&mut out))?,
        MappingFormat::EnigmaDir => {
            return Err(MappingError::Unsupported { format, operation: "written to a single file" })
        }
    }
    out.flush()?;
    Ok(())
}
