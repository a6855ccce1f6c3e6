use std::path::PathBuf;

use anyhow::{Context, Result};

use starmap_core::mapping::resolve_format;
use starmap_core::services::aggregate::{aggregate_mappings, AggregateRequest};

use crate::resolve_path_arg;

/// Merge mapping files into one.
///
/// `directory` selects the directory flavour of an ambiguous output format
/// name (`enigma` becomes `ENIGMA_DIR`).
pub fn aggregate_command(
    input_format: &str,
    output_format: &str,
    output: &str,
    directory: bool,
    inputs: &[String],
    json: bool,
) -> Result<()> {
    let input_format = resolve_format(input_format, false)?;
    let output_format = resolve_format(output_format, directory)?;
    let inputs = inputs
        .iter()
        .map(|input| resolve_path_arg(input))
        .collect::<Result<Vec<PathBuf>>>()?;
    let request = AggregateRequest {
        input_format,
        output_format,
        inputs,
        output: resolve_path_arg(output)?,
    };
    let summary = aggregate_mappings(&request)
        .with_context(|| format!("Failed to aggregate mappings into {}", request.output.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Aggregated {} mapping files as {}", summary.merged.len(), output_format);
    for skipped in &summary.skipped {
        println!("  Skipped directory: {}", skipped.display());
    }
    println!("  Classes: {}", summary.classes);
    println!("  Output: {}", summary.output.display());
    Ok(())
}
