use std::fs;
use std::path::{Path, PathBuf};

use starmap_core::mapping::{read_mappings, MappingFormat, MappingStore};
use starmap_core::services::aggregate::merge_inputs;
use starmap_core::services::{aggregate_mappings, AggregateError, AggregateRequest};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write mapping");
    path
}

fn read(path: &Path, format: MappingFormat) -> MappingStore {
    let mut store = MappingStore::new();
    read_mappings(path, format, &mut store).expect("read output");
    store
}

#[test]
fn inputs_merge_in_order_with_later_files_winning() {
    let dir = tempdir().expect("tempdir");
    let first = write(dir.path(), "first.tiny", "v1\tofficial\tnamed\nCLASS\ta\tgame/Old\nCLASS\tb\tgame/Star\n");
    let second = write(dir.path(), "second.tiny", "v1\tofficial\tnamed\nCLASS\ta\tgame/Galaxy\n");
    let output = dir.path().join("out/merged.tiny");

    let summary = aggregate_mappings(&AggregateRequest {
        input_format: MappingFormat::TinyFile,
        output_format: MappingFormat::Tiny2File,
        inputs: vec![first.clone(), second.clone()],
        output: output.clone(),
    })
    .expect("aggregate");

    assert_eq!(summary.merged, vec![first, second]);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.classes, 2);
    assert_eq!(summary.output, output);

    let text = fs::read_to_string(&output).expect("output");
    assert!(text.starts_with("tiny\t2\t0\tofficial\tnamed\n"), "{text}");
    let merged = read(&output, MappingFormat::Tiny2File);
    assert_eq!(merged.class_dst("a", 0), Some("game/Galaxy"));
    assert_eq!(merged.class_dst("b", 0), Some("game/Star"));
}

#[test]
fn merge_order_only_matters_for_conflicting_names() {
    let dir = tempdir().expect("tempdir");
    let first = write(
        dir.path(),
        "first.tiny",
        "v1\tofficial\tnamed\nCLASS\ta\tgame/Old\nCLASS\tb\tgame/Star\nFIELD\tb\tI\ta\tsize\n",
    );
    let second = write(
        dir.path(),
        "second.tiny",
        "v1\tofficial\tnamed\nCLASS\ta\tgame/Galaxy\nCLASS\tc\tgame/Planet\nMETHOD\tc\t()V\ta\ttick\n",
    );

    let (forward, _) = merge_inputs(MappingFormat::TinyFile, &[first.clone(), second.clone()]).expect("forward");
    let (backward, _) = merge_inputs(MappingFormat::TinyFile, &[second, first]).expect("backward");

    assert_eq!(forward.class_dst("a", 0), Some("game/Galaxy"));
    assert_eq!(backward.class_dst("a", 0), Some("game/Old"));

    for store in [&forward, &backward] {
        assert_eq!(store.class_count(), 3);
        assert_eq!(store.class_dst("b", 0), Some("game/Star"));
        assert_eq!(store.class_dst("c", 0), Some("game/Planet"));
        assert_eq!(store.field_dst("b", "a", Some("I"), 0), Some("size"));
        assert_eq!(store.method_dst("c", "a", "()V", 0), Some("tick"));
    }
    let names = |store: &MappingStore| store.classes().keys().cloned().collect::<Vec<_>>();
    assert_eq!(names(&forward), names(&backward));
}

#[test]
fn directory_inputs_are_skipped() {
    let dir = tempdir().expect("tempdir");
    let nested = dir.path().join("nested");
    fs::create_dir(&nested).expect("mkdir");
    let file = write(dir.path(), "one.mapping", "CLASS a game/Galaxy\n");
    let output = dir.path().join("merged.txt");

    let summary = aggregate_mappings(&AggregateRequest {
        input_format: MappingFormat::EnigmaFile,
        output_format: MappingFormat::ProguardFile,
        inputs: vec![nested.clone(), file.clone()],
        output: output.clone(),
    })
    .expect("aggregate");

    assert_eq!(summary.skipped, vec![nested]);
    assert_eq!(summary.merged, vec![file]);
    assert_eq!(fs::read_to_string(&output).expect("output"), "a -> game.Galaxy:\n");
}

#[test]
fn a_broken_input_leaves_no_output() {
    let dir = tempdir().expect("tempdir");
    let good = write(dir.path(), "good.tiny", "v1\tofficial\tnamed\nCLASS\ta\tGalaxy\n");
    let bad = write(dir.path(), "bad.tiny", "v1\tofficial\tnamed\nGARBAGE\n");
    let output = dir.path().join("merged.tiny");

    let err = aggregate_mappings(&AggregateRequest {
        input_format: MappingFormat::TinyFile,
        output_format: MappingFormat::TinyFile,
        inputs: vec![good, bad.clone()],
        output: output.clone(),
    })
    .expect_err("bad input");

    assert!(matches!(&err, AggregateError::Input { path, .. } if *path == bad), "got {err:?}");
    assert!(!output.exists());
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .expect("list")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers.len(), 2, "{leftovers:?}");
}

#[test]
fn enigma_directory_output_replaces_the_previous_tree() {
    let dir = tempdir().expect("tempdir");
    let input = write(dir.path(), "in.tiny", "v1\tofficial\tnamed\nCLASS\ta\tgame/Galaxy\nCLASS\ta$b\tgame/Galaxy$Sector\n");
    let output = dir.path().join("mappings");
    fs::create_dir_all(output.join("stale")).expect("mkdir");
    fs::write(output.join("stale/Old.mapping"), "CLASS x y\n").expect("stale file");

    aggregate_mappings(&AggregateRequest {
        input_format: MappingFormat::TinyFile,
        output_format: MappingFormat::EnigmaDir,
        inputs: vec![input],
        output: output.clone(),
    })
    .expect("aggregate");

    assert!(!output.join("stale").exists());
    let galaxy = fs::read_to_string(output.join("game/Galaxy.mapping")).expect("class file");
    assert_eq!(galaxy, "CLASS a game/Galaxy\n\tCLASS b Sector\n");
    let reread = read(&output, MappingFormat::EnigmaDir);
    assert_eq!(reread.class_dst("a$b", 0), Some("game/Galaxy$Sector"));
}
