mod common;

use std::fs;

use starmap_core::archive::{is_class_entry, read_jar};
use tempfile::tempdir;

use common::{class, write_jar};

/// Offset of the uncompressed size inside a central directory header.
const CENTRAL_UNCOMPRESSED_SIZE: usize = 24;

#[test]
fn class_entries_exclude_metadata_and_modules() {
    assert!(is_class_entry("game/Galaxy.class"));
    assert!(!is_class_entry("META-INF/versions/9/game/Galaxy.class"));
    assert!(!is_class_entry("module-info.class"));
    assert!(!is_class_entry("assets/logo.txt"));
}

#[test]
fn oversized_declared_entry_sizes_are_not_trusted() {
    let dir = tempdir().expect("tempdir");
    let jar = dir.path().join("game.jar");
    write_jar(&jar, &[class("a")], &[("assets/logo.txt", b"logo")]);

    let mut bytes = fs::read(&jar).expect("read jar");
    let mut patched = 0;
    let mut at = 0;
    while let Some(offset) = bytes[at..].windows(4).position(|w| w == b"PK\x01\x02") {
        let field = at + offset + CENTRAL_UNCOMPRESSED_SIZE;
        bytes[field..field + 4].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());
        patched += 1;
        at = field;
    }
    assert_eq!(patched, 2);
    fs::write(&jar, &bytes).expect("write patched jar");

    let contents = read_jar(&jar).expect("read patched jar");
    assert_eq!(contents.classes.len(), 1);
    assert_eq!(contents.classes[0].0, "a.class");
    assert_eq!(contents.resources.len(), 1);
    assert_eq!(contents.resources[0].data, b"logo");
}
