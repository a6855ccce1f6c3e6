//! Locating a local copy of the game jar.
//!
//! Candidates are tried in a fixed order: the cached previous output, the
//! configured primary jar, the `STARMAP_GAME_JAR` override and finally the
//! Steam installation found by an [`InstallLocator`]. Platform probing stays
//! behind the locator so callers never branch on the host platform.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the game jar location, resolved against
/// the project directory.
pub const GAME_JAR_ENV: &str = "STARMAP_GAME_JAR";

pub const DEFAULT_APP_NAME: &str = "Galimulator";
pub const DEFAULT_JAR_PATH: &str = "jar/galimulator-desktop.jar";
pub const DEFAULT_CACHED_JAR: &str = "galimulator-clean.jar";

const STEAM_REGISTRY_KEY: &str = r"HKEY_LOCAL_MACHINE\SOFTWARE\Wow6432Node\Valve\Steam";
const STEAM_REGISTRY_VALUE: &str = "InstallPath";

const WINDOWS_STEAM_DIRS: &[&str] = &[
    r"C:\Steam\",
    r"C:\Program Files (x86)\Steam\",
    r"C:\Program Files\Steam\",
    r"D:\Steam\",
    r"C:\Programmes\Steam\",
    r"D:\Programmes\Steam\",
    r"D:\SteamLibrary\",
    r"E:\SteamLibrary\",
    r"F:\SteamLibrary\",
    r"C:\SteamLibrary\",
];

const UNIX_STEAM_DIRS: &[&str] = &[".steam/debian-installation", ".steam/steam", ".local/share/Steam"];

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Cannot resolve the game jar; tried: {}", format_tried(.tried))]
    ResolutionExhausted { tried: Vec<PathBuf> },
    #[error("Steam directory is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_tried(tried: &[PathBuf]) -> String {
    if tried.is_empty() {
        return "nothing".to_string();
    }
    tried.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// Where a resolved jar came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Primary,
    Override,
    Steam,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub path: PathBuf,
    pub source: ResolutionSource,
}

impl Resolution {
    pub fn cached(&self) -> bool {
        self.source == ResolutionSource::Cache
    }
}

/// Resolves the location of the input binary.
pub trait BinaryResolver {
    fn resolve(&self) -> Result<Resolution, AcquireError>;
}

/// Finds Steam installation roots.
pub trait InstallLocator: Send + Sync {
    /// Candidate Steam roots, most specific first.
    fn steam_roots(&self) -> Vec<PathBuf>;
}

/// Probes the host platform: the registry and well-known directories on
/// Windows, home-relative directories elsewhere.
#[derive(Debug, Clone, Default)]
pub struct PlatformLocator {
    home: Option<PathBuf>,
}

impl PlatformLocator {
    pub fn new() -> Self {
        let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")).map(PathBuf::from);
        Self { home }
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: Some(home.into()) }
    }
}

impl InstallLocator for PlatformLocator {
    fn steam_roots(&self) -> Vec<PathBuf> {
        if cfg!(windows) {
            let mut roots: Vec<PathBuf> = query_registry(STEAM_REGISTRY_KEY, STEAM_REGISTRY_VALUE)
                .map(PathBuf::from)
                .into_iter()
                .collect();
            roots.extend(WINDOWS_STEAM_DIRS.iter().map(PathBuf::from));
            roots
        } else {
            match &self.home {
                Some(home) => UNIX_STEAM_DIRS.iter().map(|dir| home.join(dir)).collect(),
                None => Vec::new(),
            }
        }
    }
}

/// Run `reg query` and return the last token of its output.
fn query_registry(key: &str, value: &str) -> Option<String> {
    let output = Command::new("reg").args(["query", key, "/v", value]).output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_registry_output(&text, key, value)
}

/// Extract the value from `reg query` output, e.g.
/// `HKEY_LOCAL_MACHINE\...\Steam  InstallPath  REG_SZ  D:\Programmes\Steam`.
pub fn parse_registry_output(text: &str, key: &str, value: &str) -> Option<String> {
    if !text.contains(key) || !text.contains(value) {
        return None;
    }
    let line = text.lines().find(|line| line.contains("REG_SZ") && line.contains(value))?;
    let (_, data) = line.split_once("REG_SZ")?;
    let data = data.trim();
    (!data.is_empty()).then(|| data.to_string())
}

/// Acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Cached output location; the resolved jar is copied here.
    pub output: PathBuf,
    /// Reuse `output` when it already exists.
    pub use_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_path: Option<PathBuf>,
    pub project_dir: PathBuf,
    pub app_name: String,
    pub jar_path: String,
}

impl AcquireConfig {
    pub fn new(output: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            use_cache: true,
            primary: None,
            override_path: None,
            project_dir: project_dir.into(),
            app_name: DEFAULT_APP_NAME.to_string(),
            jar_path: DEFAULT_JAR_PATH.to_string(),
        }
    }

    /// Take the override from [`GAME_JAR_ENV`], relative to the project directory.
    pub fn apply_env_override(mut self) -> Self {
        match env::var_os(GAME_JAR_ENV) {
            Some(value) if !value.is_empty() => {
                self.override_path = Some(self.project_dir.join(value));
            }
            _ => debug!("{GAME_JAR_ENV} not set"),
        }
        self
    }
}

/// Resolver following the cache, primary, override, Steam order.
pub struct SteamResolver<L: InstallLocator = PlatformLocator> {
    config: AcquireConfig,
    locator: L,
}

impl SteamResolver<PlatformLocator> {
    pub fn new(config: AcquireConfig) -> Self {
        Self { config, locator: PlatformLocator::new() }
    }
}

impl<L: InstallLocator> SteamResolver<L> {
    pub fn with_locator(config: AcquireConfig, locator: L) -> Self {
        Self { config, locator }
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    fn game_jar(&self, steam_root: &Path) -> PathBuf {
        steam_root.join("steamapps").join("common").join(&self.config.app_name).join(&self.config.jar_path)
    }
}

impl<L: InstallLocator> BinaryResolver for SteamResolver<L> {
    fn resolve(&self) -> Result<Resolution, AcquireError> {
        let config = &self.config;
        let mut tried = Vec::new();

        if config.use_cache && config.output.is_file() {
            info!("Reusing cached game jar {}", config.output.display());
            return Ok(Resolution { path: config.output.clone(), source: ResolutionSource::Cache });
        }

        if let Some(primary) = &config.primary {
            if primary.is_file() {
                return Ok(Resolution { path: primary.clone(), source: ResolutionSource::Primary });
            }
            warn!("Primary game jar not found at {}", primary.display());
            tried.push(primary.clone());
        }

        if let Some(path) = &config.override_path {
            if path.is_file() {
                return Ok(Resolution { path: path.clone(), source: ResolutionSource::Override });
            }
            warn!("Game jar from {GAME_JAR_ENV} not found at {}", path.display());
            tried.push(path.clone());
        }

        for root in self.locator.steam_roots() {
            if !root.exists() {
                debug!("No Steam installation at {}", root.display());
                tried.push(root);
                continue;
            }
            if !root.is_dir() {
                return Err(AcquireError::NotADirectory(root));
            }
            let candidate = self.game_jar(&root);
            if candidate.is_file() {
                return Ok(Resolution { path: candidate, source: ResolutionSource::Steam });
            }
            warn!("Found Steam at {} but no game jar at {}", root.display(), candidate.display());
            tried.push(candidate);
        }

        Err(AcquireError::ResolutionExhausted { tried })
    }
}

/// Resolve the game jar and copy it to `output` unless it came from there.
pub fn fetch_game_jar(resolver: &dyn BinaryResolver, output: &Path) -> Result<Resolution, AcquireError> {
    let resolution = resolver.resolve()?;
    if resolution.cached() {
        return Ok(resolution);
    }
    let copy_err = |source| AcquireError::Copy {
        from: resolution.path.clone(),
        to: output.to_path_buf(),
        source,
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(copy_err)?;
    }
    fs::copy(&resolution.path, output).map_err(copy_err)?;
    info!("Copied {} to {}", resolution.path.display(), output.display());
    Ok(resolution)
}
