use anyhow::Result;
use clap::{Parser, Subcommand};

use starmap::commands::{
    aggregate_command, deobfuscate_command, fetch_command, list_engines_command, list_formats_command,
    DeobfuscateOptions, FetchOptions,
};

/// Deobfuscation pipeline and mapping tooling for obfuscated Java game jars.
///
/// This CLI is a thin wrapper around `starmap-core` (exposed in code as
/// `starmap_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "starmap",
    version,
    about = "Deobfuscation pipeline and mapping tooling for Java game jars",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the deobfuscation pipeline over a jar.
    ///
    /// Writes the transformed jar, the intermediary and named mapping files
    /// of the enabled phases, and `run_metadata.json` once everything
    /// succeeded.
    Deobfuscate {
        /// Input jar.
        #[arg(long)]
        input: String,

        /// Pipeline config file (.yaml, .yml or .json).
        #[arg(long)]
        config: Option<String>,

        /// Directory receiving the default-named outputs.
        #[arg(long, default_value = "starmap-out")]
        output_dir: String,

        /// Transformed jar path. Defaults to `<output-dir>/game-transformed.jar`.
        #[arg(long)]
        output_jar: Option<String>,

        /// Intermediary mappings path. Defaults to `<output-dir>/slintermediary.tiny`.
        #[arg(long)]
        intermediary_mappings: Option<String>,

        /// Named mappings path. Defaults to `<output-dir>/spstarmap.tiny`.
        #[arg(long)]
        named_mappings: Option<String>,

        /// Skip structural normalization (also disables intermediary remapping).
        #[arg(long, default_value_t = false)]
        no_normalization: bool,

        /// Skip intermediary remapping.
        #[arg(long, default_value_t = false)]
        no_remap: bool,

        /// Skip semantic name inference.
        #[arg(long, default_value_t = false)]
        no_inference: bool,

        /// Inference engine version.
        #[arg(long)]
        engine_version: Option<String>,

        /// Print the run metadata as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Merge several mapping files into one.
    Aggregate {
        /// Format of every input (name, alias or file extension).
        #[arg(long)]
        input_format: String,

        /// Format of the merged output.
        #[arg(long)]
        output_format: String,

        /// Output file or directory.
        #[arg(long)]
        output: String,

        /// Prefer the directory flavour of an ambiguous output format.
        #[arg(long, default_value_t = false)]
        directory: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Mapping files, merged in order; later files win on conflicts.
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Locate the game jar and copy it to the output location.
    Fetch {
        /// Cached output jar.
        #[arg(long, default_value = "galimulator-clean.jar")]
        output: String,

        /// Jar to use before searching the Steam installation.
        #[arg(long)]
        primary: Option<String>,

        /// Ignore an existing output jar.
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Directory `STARMAP_GAME_JAR` is resolved against.
        #[arg(long, default_value = ".")]
        project_dir: String,

        /// Steam application directory name.
        #[arg(long)]
        app_name: Option<String>,

        /// Jar path relative to the application directory.
        #[arg(long)]
        jar_path: Option<String>,
    },

    /// List supported mapping formats.
    Formats {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List registered inference engine versions.
    Engines {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new()
        .filter_module("starmap_core", level)
        .filter_module("starmap", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_target(false)
        .init();

    match cli.command {
        Command::Deobfuscate {
            input,
            config,
            output_dir,
            output_jar,
            intermediary_mappings,
            named_mappings,
            no_normalization,
            no_remap,
            no_inference,
            engine_version,
            json,
        } => deobfuscate_command(&DeobfuscateOptions {
            input,
            config,
            output_dir,
            output_jar,
            intermediary_mappings,
            named_mappings,
            no_normalization,
            no_remap,
            no_inference,
            engine_version,
            json,
        })?,
        Command::Aggregate { input_format, output_format, output, directory, json, inputs } => {
            aggregate_command(&input_format, &output_format, &output, directory, &inputs, json)?
        }
        Command::Fetch { output, primary, no_cache, project_dir, app_name, jar_path } => {
            fetch_command(&FetchOptions { output, primary, no_cache, project_dir, app_name, jar_path })?
        }
        Command::Formats { json } => list_formats_command(json)?,
        Command::Engines { json } => list_engines_command(json)?,
    }

    Ok(())
}
