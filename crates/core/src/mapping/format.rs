use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::mapping::MappingError;

/// On-disk mapping encodings, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum MappingFormat {
    #[serde(rename = "TINY_FILE")]
    TinyFile,
    #[serde(rename = "TINY_2_FILE")]
    Tiny2File,
    #[serde(rename = "ENIGMA_FILE")]
    EnigmaFile,
    #[serde(rename = "ENIGMA_DIR")]
    EnigmaDir,
    #[serde(rename = "PROGUARD_FILE")]
    ProguardFile,
}

impl MappingFormat {
    /// Canonical identifier, e.g. `TINY_2_FILE`.
    pub fn id(self) -> &'static str {
        match self {
            MappingFormat::TinyFile => "TINY_FILE",
            MappingFormat::Tiny2File => "TINY_2_FILE",
            MappingFormat::EnigmaFile => "ENIGMA_FILE",
            MappingFormat::EnigmaDir => "ENIGMA_DIR",
            MappingFormat::ProguardFile => "PROGUARD_FILE",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MappingFormat::TinyFile => "Tiny file",
            MappingFormat::Tiny2File => "Tiny v2 file",
            MappingFormat::EnigmaFile => "Enigma file",
            MappingFormat::EnigmaDir => "Enigma directory",
            MappingFormat::ProguardFile => "ProGuard file",
        }
    }

    /// File extension without the dot; `None` for directory formats.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            MappingFormat::TinyFile | MappingFormat::Tiny2File => Some("tiny"),
            MappingFormat::EnigmaFile => Some("mapping"),
            MappingFormat::EnigmaDir => None,
            MappingFormat::ProguardFile => Some("txt"),
        }
    }

    pub fn is_directory(self) -> bool {
        matches!(self, MappingFormat::EnigmaDir)
    }

    /// Whether the format names its namespaces (and can hold more than one target).
    pub fn has_namespaces(self) -> bool {
        matches!(self, MappingFormat::TinyFile | MappingFormat::Tiny2File)
    }

    pub fn supports_args(self) -> bool {
        matches!(self, MappingFormat::Tiny2File | MappingFormat::EnigmaFile | MappingFormat::EnigmaDir)
    }

    pub fn supports_comments(self) -> bool {
        matches!(self, MappingFormat::Tiny2File | MappingFormat::EnigmaFile | MappingFormat::EnigmaDir)
    }

    pub fn all() -> impl Iterator<Item = MappingFormat> {
        MappingFormat::iter()
    }
}

impl fmt::Display for MappingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for MappingFormat {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve_format(s, false)
    }
}

/// Resolve a user supplied format name.
///
/// Tries, in order: the canonical identifier after upper-casing and turning
/// `-` and spaces into `_`; the aliases `tiny2`/`tinyv2`/`tiny_v2` and
/// `enigma` (a directory when `directory_expected`); a display name; a file
/// extension. Names and extensions match case-insensitively and the first
/// format in declaration order wins.
pub fn resolve_format(name: &str, directory_expected: bool) -> Result<MappingFormat, MappingError> {
    let clean = name.to_uppercase().replace(['-', ' '], "_");
    if let Some(format) = MappingFormat::iter().find(|f| f.id() == clean) {
        return Ok(format);
    }

    if ["TINY2", "TINYV2", "TINY_V2"].contains(&clean.as_str()) {
        return Ok(MappingFormat::Tiny2File);
    }
    if name.eq_ignore_ascii_case("enigma") {
        return Ok(if directory_expected { MappingFormat::EnigmaDir } else { MappingFormat::EnigmaFile });
    }

    if let Some(format) = MappingFormat::iter().find(|f| f.display_name().eq_ignore_ascii_case(name)) {
        return Ok(format);
    }
    if let Some(format) = MappingFormat::iter()
        .find(|f| f.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(name)))
    {
        return Ok(format);
    }

    Err(MappingError::UnknownFormat(name.to_string()))
}
