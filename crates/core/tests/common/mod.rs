//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use starmap_core::classfile::code::{opcodes, CodeAttribute};
use starmap_core::classfile::{
    ClassRecord, FieldRecord, MethodRecord, RefKind, ACC_ENUM, ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC,
    ACC_STATIC, ACC_SUPER, ACC_SYNTHETIC,
};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

pub fn class(name: &str) -> ClassRecord {
    ClassRecord::new(name, Some("java/lang/Object"))
}

pub fn add_field(class: &mut ClassRecord, access: u16, name: &str, desc: &str) {
    class.fields.push(FieldRecord {
        access,
        name: name.to_string(),
        desc: desc.to_string(),
        signature: None,
        attributes: Vec::new(),
    });
}

pub fn add_method(class: &mut ClassRecord, access: u16, name: &str, desc: &str, code: Option<CodeAttribute>) {
    class.methods.push(MethodRecord {
        access,
        name: name.to_string(),
        desc: desc.to_string(),
        signature: None,
        attributes: code.map(|c| vec![c.into_attribute()]).unwrap_or_default(),
    });
}

fn push_u2(code: &mut Vec<u8>, value: u16) {
    code.extend_from_slice(&value.to_be_bytes());
}

/// `aload_0; getfield owner.field; <ret>`
pub fn getter(class: &mut ClassRecord, field: &str, desc: &str, ret: u8) -> CodeAttribute {
    let owner = class.name.clone();
    let index = class.pool_mut().intern_member_ref(RefKind::Field, &owner, field, desc).expect("intern field");
    let mut code = vec![opcodes::ALOAD_0, opcodes::GETFIELD];
    push_u2(&mut code, index);
    code.push(ret);
    CodeAttribute::new(1, 1, code)
}

/// `return`
pub fn empty_body() -> CodeAttribute {
    CodeAttribute::new(0, 1, vec![opcodes::RETURN])
}

/// An enum whose static initializer creates one constant per `(field, literal)`.
pub fn enum_class(name: &str, constants: &[(&str, &str)]) -> ClassRecord {
    let mut record = ClassRecord::new(name, Some("java/lang/Enum"));
    record.access = ACC_PUBLIC | ACC_FINAL | ACC_SUPER | ACC_ENUM;
    let own_desc = format!("L{name};");
    let mut code = Vec::new();
    for (ordinal, (field, literal)) in constants.iter().enumerate() {
        add_field(&mut record, ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM, field, &own_desc);
        let pool = record.pool_mut();
        let class_index = pool.intern_class(name).expect("intern class");
        let string_index = pool.intern_string(literal).expect("intern string");
        let init = pool
            .intern_member_ref(RefKind::Method, name, "<init>", "(Ljava/lang/String;I)V")
            .expect("intern init");
        let put = pool.intern_member_ref(RefKind::Field, name, field, &own_desc).expect("intern field");
        code.push(opcodes::NEW);
        push_u2(&mut code, class_index);
        code.push(opcodes::DUP);
        code.push(opcodes::LDC_W);
        push_u2(&mut code, string_index);
        code.push(opcodes::BIPUSH);
        code.push(ordinal as u8);
        code.push(opcodes::INVOKESPECIAL);
        push_u2(&mut code, init);
        code.push(opcodes::PUTSTATIC);
        push_u2(&mut code, put);
    }
    code.push(opcodes::RETURN);
    add_method(&mut record, ACC_STATIC, "<clinit>", "()V", Some(CodeAttribute::new(4, 0, code)));
    add_method(&mut record, ACC_PRIVATE, "<init>", "(Ljava/lang/String;I)V", Some(empty_body()));
    record
}

/// A class whose static initializer fills `field` from `enum_name.values()`
/// the way javac compiles a switch over an enum.
pub fn switch_map_holder(name: &str, field: &str, enum_name: &str) -> ClassRecord {
    let mut record = class(name);
    record.access = ACC_SYNTHETIC | ACC_SUPER;
    add_field(&mut record, ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC, field, "[I");
    let pool = record.pool_mut();
    let values = pool
        .intern_member_ref(RefKind::Method, enum_name, "values", &format!("()[L{enum_name};"))
        .expect("intern values");
    let put = pool.intern_member_ref(RefKind::Field, name, field, "[I").expect("intern field");
    let mut code = vec![opcodes::INVOKESTATIC];
    push_u2(&mut code, values);
    code.push(opcodes::ARRAYLENGTH);
    code.extend_from_slice(&[opcodes::NEWARRAY, 10]);
    code.push(opcodes::PUTSTATIC);
    push_u2(&mut code, put);
    code.push(opcodes::RETURN);
    add_method(&mut record, ACC_STATIC, "<clinit>", "()V", Some(CodeAttribute::new(2, 0, code)));
    record
}

/// A small obfuscated game:
/// - `a` (source `Galaxy.java`) with a field of enum type `b`, a member
///   class `a$b` and an anonymous class `a$1`
/// - `b` (source `Color.java`), an enum with constants `RED` and `GREEN`
/// - `c`, holding a named field `name` behind the obfuscated getter `a()`
pub fn sample_game() -> Vec<ClassRecord> {
    let mut galaxy = class("a");
    galaxy.source_file = Some("Galaxy.java".to_string());
    add_field(&mut galaxy, ACC_PRIVATE, "a", "Lb;");
    add_method(&mut galaxy, ACC_PUBLIC, "<init>", "()V", Some(empty_body()));

    let mut member = class("a$b");
    add_field(&mut member, ACC_FINAL | ACC_SYNTHETIC, "this$0", "La;");

    let mut anonymous = class("a$1");
    anonymous.interfaces.push("java/lang/Runnable".to_string());
    add_method(&mut anonymous, ACC_PUBLIC, "run", "()V", Some(empty_body()));

    let mut color = enum_class("b", &[("a", "RED"), ("b", "GREEN")]);
    color.source_file = Some("Color.java".to_string());

    let mut holder = class("c");
    add_field(&mut holder, ACC_PRIVATE, "name", "Ljava/lang/String;");
    let body = getter(&mut holder, "name", "Ljava/lang/String;", opcodes::ARETURN);
    add_method(&mut holder, ACC_PUBLIC, "a", "()Ljava/lang/String;", Some(body));

    vec![galaxy, member, anonymous, color, holder]
}

/// Write `classes` and `resources` into a jar at `path`.
pub fn write_jar(path: &Path, classes: &[ClassRecord], resources: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create jar");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();
    for (name, data) in resources {
        zip.start_file(*name, options).expect("start resource");
        zip.write_all(data).expect("write resource");
    }
    for class in classes {
        zip.start_file(format!("{}.class", class.name), options).expect("start class");
        zip.write_all(&class.to_bytes().expect("encode class")).expect("write class");
    }
    zip.finish().expect("finish jar");
}

pub fn write_sample_jar(path: &Path) {
    write_jar(path, &sample_game(), &[("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"), ("assets/logo.txt", b"logo")]);
}

/// `(name, bytes)` of every entry in the jar at `path`.
pub fn jar_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = File::open(path).expect("open jar");
    let mut archive = ZipArchive::new(file).expect("read jar");
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("entry");
        let mut data = Vec::new();
        entry.read_to_end(&mut data).expect("read entry");
        entries.push((entry.name().to_string(), data));
    }
    entries
}

pub fn jar_class(path: &Path, name: &str) -> Option<ClassRecord> {
    let entry = format!("{name}.class");
    jar_entries(path)
        .into_iter()
        .find(|(n, _)| *n == entry)
        .map(|(_, data)| ClassRecord::parse(&data).expect("parse class"))
}
