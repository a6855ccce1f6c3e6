use std::fs;
use std::path::{Path, PathBuf};

use starmap_core::services::acquire::{
    fetch_game_jar, parse_registry_output, AcquireConfig, AcquireError, BinaryResolver, InstallLocator,
    PlatformLocator, ResolutionSource, SteamResolver, DEFAULT_CACHED_JAR, GAME_JAR_ENV,
};
use tempfile::tempdir;

struct FixedRoots(Vec<PathBuf>);

impl InstallLocator for FixedRoots {
    fn steam_roots(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

fn touch(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write");
}

fn steam_jar(root: &Path) -> PathBuf {
    root.join("steamapps/common/Galimulator/jar/galimulator-desktop.jar")
}

#[test]
fn cache_wins_over_every_other_source() {
    let dir = tempdir().expect("tempdir");
    let output = dir.path().join(DEFAULT_CACHED_JAR);
    touch(&output, "cached");
    let primary = dir.path().join("primary.jar");
    touch(&primary, "primary");

    let mut config = AcquireConfig::new(&output, dir.path());
    config.primary = Some(primary.clone());
    let resolver = SteamResolver::with_locator(config.clone(), FixedRoots(Vec::new()));
    let resolution = resolver.resolve().expect("resolve");
    assert_eq!(resolution.source, ResolutionSource::Cache);
    assert!(resolution.cached());

    config.use_cache = false;
    let resolver = SteamResolver::with_locator(config, FixedRoots(Vec::new()));
    let resolution = resolver.resolve().expect("resolve");
    assert_eq!(resolution.source, ResolutionSource::Primary);
    assert_eq!(resolution.path, primary);
}

#[test]
fn missing_primary_and_override_fall_through_to_steam() {
    let dir = tempdir().expect("tempdir");
    let empty_root = dir.path().join("empty-steam");
    fs::create_dir_all(&empty_root).expect("mkdir");
    let root = dir.path().join("steam");
    touch(&steam_jar(&root), "game");

    let mut config = AcquireConfig::new(dir.path().join("out.jar"), dir.path());
    config.primary = Some(dir.path().join("missing.jar"));
    config.override_path = Some(dir.path().join("also-missing.jar"));
    let locator = FixedRoots(vec![dir.path().join("absent"), empty_root, root.clone()]);

    let resolution = SteamResolver::with_locator(config, locator).resolve().expect("resolve");
    assert_eq!(resolution.source, ResolutionSource::Steam);
    assert_eq!(resolution.path, steam_jar(&root));
}

#[test]
fn exhausted_resolution_lists_every_candidate() {
    let dir = tempdir().expect("tempdir");
    let empty_root = dir.path().join("steam");
    fs::create_dir_all(&empty_root).expect("mkdir");
    let mut config = AcquireConfig::new(dir.path().join("out.jar"), dir.path());
    config.primary = Some(dir.path().join("missing.jar"));
    let locator = FixedRoots(vec![dir.path().join("absent"), empty_root.clone()]);

    let err = SteamResolver::with_locator(config, locator).resolve().expect_err("nothing found");
    let AcquireError::ResolutionExhausted { tried } = &err else { panic!("unexpected error {err:?}") };
    assert_eq!(tried, &vec![dir.path().join("missing.jar"), dir.path().join("absent"), steam_jar(&empty_root)]);
    let message = err.to_string();
    assert!(message.starts_with("Cannot resolve the game jar; tried: "), "{message}");
    assert!(message.contains("missing.jar"), "{message}");
}

#[test]
fn a_steam_root_that_is_a_file_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let bogus = dir.path().join("steam");
    touch(&bogus, "not a directory");
    let config = AcquireConfig::new(dir.path().join("out.jar"), dir.path());

    let err = SteamResolver::with_locator(config, FixedRoots(vec![bogus.clone()])).resolve().expect_err("file root");
    assert!(matches!(err, AcquireError::NotADirectory(path) if path == bogus));
}

#[test]
fn env_override_is_relative_to_the_project_directory() {
    let dir = tempdir().expect("tempdir");
    std::env::set_var(GAME_JAR_ENV, "jars/game.jar");
    let config = AcquireConfig::new(dir.path().join("out.jar"), dir.path()).apply_env_override();
    std::env::remove_var(GAME_JAR_ENV);
    assert_eq!(config.override_path, Some(dir.path().join("jars/game.jar")));
}

#[test]
fn fetch_copies_unless_cached() {
    let dir = tempdir().expect("tempdir");
    let primary = dir.path().join("primary.jar");
    touch(&primary, "game bytes");
    let output = dir.path().join("cache/galimulator-clean.jar");

    let mut config = AcquireConfig::new(&output, dir.path());
    config.primary = Some(primary);
    let resolver = SteamResolver::with_locator(config, FixedRoots(Vec::new()));

    let first = fetch_game_jar(&resolver, &output).expect("fetch");
    assert_eq!(first.source, ResolutionSource::Primary);
    assert_eq!(fs::read_to_string(&output).expect("copied"), "game bytes");

    let second = fetch_game_jar(&resolver, &output).expect("fetch again");
    assert!(second.cached());
}

#[test]
fn registry_output_yields_the_install_path() {
    let key = r"HKEY_LOCAL_MACHINE\SOFTWARE\Wow6432Node\Valve\Steam";
    let text = format!("\r\n{key}\r\n    InstallPath    REG_SZ    D:\\Programmes\\Steam\r\n\r\n");
    assert_eq!(parse_registry_output(&text, key, "InstallPath").as_deref(), Some(r"D:\Programmes\Steam"));
    assert_eq!(parse_registry_output("ERROR: not found", key, "InstallPath"), None);
}

#[test]
fn unix_roots_live_under_home() {
    if cfg!(windows) {
        return;
    }
    let roots = PlatformLocator::with_home("/home/player").steam_roots();
    assert!(roots.contains(&PathBuf::from("/home/player/.local/share/Steam")));
    assert!(roots.iter().all(|root| root.starts_with("/home/player")));
}
