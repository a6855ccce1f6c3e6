use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use starmap::commands::{artifact_sha256, hash_outputs, run_metadata_path, RUN_METADATA_FILE};
use starmap::resolve_path_arg;
use starmap_core::config::ArtifactPaths;
use starmap_core::services::RunReport;
use tempfile::tempdir;

#[test]
fn path_args_become_absolute() {
    let tmp = tempdir().expect("tempdir");
    let jar = tmp.path().join("game.jar");
    fs::write(&jar, "jar").expect("write jar");

    let existing = resolve_path_arg(jar.to_str().expect("utf8 path")).expect("existing");
    assert_eq!(existing, jar.canonicalize().expect("canon"));

    let absent = tmp.path().join("out/new.jar");
    let resolved = resolve_path_arg(absent.to_str().expect("utf8 path")).expect("absolute output");
    assert_eq!(resolved, absent);

    let relative = resolve_path_arg("starmap-out/not-there.jar").expect("relative output");
    assert!(relative.is_absolute());
    assert!(relative.ends_with("starmap-out/not-there.jar"), "{}", relative.display());
}

#[test]
fn outputs_are_hashed_in_artifact_order() {
    let tmp = tempdir().expect("tempdir");
    let jar = tmp.path().join("game-transformed.jar");
    let named = tmp.path().join("spstarmap.tiny");
    fs::write(&jar, b"jar bytes").expect("jar");
    fs::write(&named, b"v1\tintermediary\tnamed\n").expect("named");

    let report = RunReport { output_jar: jar.clone(), named_mappings: Some(named.clone()), ..RunReport::default() };
    let outputs = hash_outputs(&report).expect("hash outputs");

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].path, jar.display().to_string());
    assert_eq!(outputs[0].sha256, format!("{:x}", Sha256::digest(b"jar bytes")));
    assert_eq!(outputs[1].path, named.display().to_string());
    assert_eq!(outputs[1].sha256.len(), 64);
}

#[test]
fn missing_artifacts_cannot_be_hashed() {
    let tmp = tempdir().expect("tempdir");
    let err = artifact_sha256(&tmp.path().join("absent.jar")).expect_err("missing");
    assert!(err.to_string().contains("Failed to open"), "{err}");

    let report = RunReport { output_jar: tmp.path().join("absent.jar"), ..RunReport::default() };
    assert!(hash_outputs(&report).is_err());
}

#[test]
fn run_metadata_sits_next_to_the_output_jar() {
    let mut paths = ArtifactPaths::in_dir("game.jar", Path::new("/work/out"));
    assert_eq!(run_metadata_path(&paths), Path::new("/work/out").join(RUN_METADATA_FILE));

    paths.output_jar = Path::new("/work/jars/game.jar").to_path_buf();
    assert_eq!(run_metadata_path(&paths), Path::new("/work/jars").join(RUN_METADATA_FILE));
}
