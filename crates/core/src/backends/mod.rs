//! External capabilities driven by the deobfuscation pipeline.
//!
//! Each capability is a trait so real implementations can be swapped in; the
//! built-in implementations are small structural heuristics that keep the
//! pipeline usable end to end:
//! - [`normalize`]: bytecode normalization stages
//! - [`intermediary`]: deterministic structural ("intermediary") names
//! - [`autodeobf`]: semantic name inference engines, selected by version

pub mod autodeobf;
pub mod intermediary;
pub mod normalize;

use thiserror::Error;

pub use autodeobf::{default_engine_registry, EngineRegistry, InferenceEngine, SourceHintEngine};
pub use intermediary::{DefaultIntermediaryGenerator, IntermediaryGenerator};
pub use normalize::{NormalizationStage, NormalizationStages, StructuralNormalizer};

/// Failure inside a capability implementation.
#[derive(Debug, Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self { stage: stage.into(), message: message.into() }
    }
}

/// Whether `name` looks like an obfuscator-assigned identifier: one or two
/// ASCII letters.
pub fn looks_obfuscated(name: &str) -> bool {
    !name.is_empty() && name.len() <= 2 && name.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Whether `name` carries no meaning of its own: obfuscated, or a generated
/// `class_<n>` intermediary name.
pub fn is_placeholder_name(name: &str) -> bool {
    looks_obfuscated(name)
        || name
            .strip_prefix("class_")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether `name` is usable as a Java identifier.
pub fn is_java_identifier(name: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
        "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
        "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long", "native",
        "new", "package", "private", "protected", "public", "return", "short", "static", "strictfp",
        "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try", "void",
        "volatile", "while", "true", "false", "null",
    ];
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !KEYWORDS.contains(&name)
}
