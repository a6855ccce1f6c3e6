use anyhow::Result;
use serde::Serialize;

use starmap_core::backends::default_engine_registry;
use starmap_core::config::DEFAULT_ENGINE_VERSION;
use starmap_core::mapping::MappingFormat;

#[derive(Debug, Serialize)]
pub struct FormatInfo {
    pub id: String,
    pub name: String,
    pub extension: Option<String>,
    pub directory: bool,
    pub namespaces: bool,
    pub args: bool,
    pub comments: bool,
}

#[derive(Debug, Serialize)]
pub struct EngineInfo {
    pub version: String,
    pub default: bool,
}

/// List the mapping formats this binary can read and write.
pub fn list_formats_command(json: bool) -> Result<()> {
    let entries: Vec<FormatInfo> = MappingFormat::all()
        .map(|format| FormatInfo {
            id: format.id().to_string(),
            name: format.display_name().to_string(),
            extension: format.extension().map(str::to_string),
            directory: format.is_directory(),
            namespaces: format.has_namespaces(),
            args: format.supports_args(),
            comments: format.supports_comments(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Mapping formats:");
    for entry in entries {
        let ext = entry.extension.as_deref().map(|e| format!(" (.{e})")).unwrap_or_default();
        let kind = if entry.directory { "directory" } else { "file" };
        println!("- {}: {}{} [{}]", entry.id, entry.name, ext, kind);
    }
    Ok(())
}

/// List the registered inference engine versions.
pub fn list_engines_command(json: bool) -> Result<()> {
    let entries: Vec<EngineInfo> = default_engine_registry()
        .versions()
        .into_iter()
        .map(|version| EngineInfo { default: version == DEFAULT_ENGINE_VERSION, version })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Inference engines: (none)");
        return Ok(());
    }

    println!("Inference engines:");
    for entry in entries {
        let marker = if entry.default { " (default)" } else { "" };
        println!("- {}{}", entry.version, marker);
    }
    Ok(())
}
