//! Jar fixtures for the CLI tests.
#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use starmap_core::classfile::code::{opcodes, CodeAttribute};
use starmap_core::classfile::{ClassRecord, FieldRecord, MethodRecord, ACC_PRIVATE, ACC_PUBLIC};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

fn class(name: &str) -> ClassRecord {
    ClassRecord::new(name, Some("java/lang/Object"))
}

/// Two obfuscated classes: `a` (source `Galaxy.java`) holding a `b` field,
/// and a plain `b`.
pub fn write_game_jar(path: &Path) {
    let mut galaxy = class("a");
    galaxy.source_file = Some("Galaxy.java".to_string());
    galaxy.fields.push(FieldRecord {
        access: ACC_PRIVATE,
        name: "a".to_string(),
        desc: "Lb;".to_string(),
        signature: None,
        attributes: Vec::new(),
    });
    galaxy.methods.push(MethodRecord {
        access: ACC_PUBLIC,
        name: "<init>".to_string(),
        desc: "()V".to_string(),
        signature: None,
        attributes: vec![CodeAttribute::new(0, 1, vec![opcodes::RETURN]).into_attribute()],
    });
    let star = class("b");

    let file = File::create(path).expect("create jar");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();
    zip.start_file("META-INF/MANIFEST.MF", options).expect("start manifest");
    zip.write_all(b"Manifest-Version: 1.0\n").expect("write manifest");
    for record in [galaxy, star] {
        zip.start_file(format!("{}.class", record.name), options).expect("start class");
        zip.write_all(&record.to_bytes().expect("encode class")).expect("write class");
    }
    zip.finish().expect("finish jar");
}

pub fn jar_entry_names(path: &Path) -> Vec<String> {
    let file = File::open(path).expect("open jar");
    let mut archive = ZipArchive::new(file).expect("read jar");
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("entry");
        let mut sink = Vec::new();
        entry.read_to_end(&mut sink).expect("read entry");
        names.push(entry.name().to_string());
    }
    names
}
