//! starmap-core
//!
//! Core library for deobfuscating obfuscated Java game jars.
//!
//! This crate defines the class file codec, the in-memory class graph, the
//! mapping store and its on-disk formats, the deobfuscation pipeline and the
//! pluggable capabilities (normalization stages, intermediary naming, semantic
//! name inference) it drives.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends; the `starmap` CLI is a thin wrapper.

pub mod archive;
pub mod backends;
pub mod classfile;
pub mod config;
pub mod mapping;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
