use anyhow::{Context, Result};

use starmap_core::services::acquire::{fetch_game_jar, AcquireConfig, SteamResolver};

use crate::resolve_path_arg;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub output: String,
    pub primary: Option<String>,
    pub no_cache: bool,
    pub project_dir: String,
    pub app_name: Option<String>,
    pub jar_path: Option<String>,
}

/// Build the acquisition settings, including the environment override.
pub fn acquire_config(options: &FetchOptions) -> Result<AcquireConfig> {
    let output = resolve_path_arg(&options.output)?;
    let project_dir = resolve_path_arg(&options.project_dir)?;
    let mut config = AcquireConfig::new(output, project_dir);
    config.use_cache = !options.no_cache;
    if let Some(primary) = &options.primary {
        config.primary = Some(resolve_path_arg(primary)?);
    }
    if let Some(app_name) = &options.app_name {
        config.app_name = app_name.clone();
    }
    if let Some(jar_path) = &options.jar_path {
        config.jar_path = jar_path.clone();
    }
    Ok(config.apply_env_override())
}

/// Locate the game jar and copy it to the output location.
pub fn fetch_command(options: &FetchOptions) -> Result<()> {
    let config = acquire_config(options)?;
    let output = config.output.clone();
    let resolver = SteamResolver::new(config);
    let resolution = fetch_game_jar(&resolver, &output)
        .with_context(|| format!("Failed to fetch the game jar into {}", output.display()))?;

    if resolution.cached() {
        println!("Reusing cached game jar at {}", output.display());
    } else {
        println!("Fetched game jar from {}", resolution.path.display());
        println!("  Output: {}", output.display());
    }
    Ok(())
}
