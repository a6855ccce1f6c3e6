mod common;

use starmap_core::classfile::code::{opcodes, CodeAttribute};
use starmap_core::classfile::descriptor::{
    descriptor_to_java, java_to_descriptor, method_params, remap_descriptor, remap_signature, return_type,
};
use starmap_core::classfile::{ClassFormatError, ClassRecord, InnerClassRecord, RawAttribute, RefKind, ACC_STATIC};

use common::{add_field, add_method, class, getter};

fn rename_a(name: &str) -> Option<String> {
    match name {
        "a" => Some("pkg/Alpha".to_string()),
        "b" => Some("pkg/Beta".to_string()),
        _ => None,
    }
}

#[test]
fn encoded_class_decodes_to_the_same_structure() {
    let mut record = class("pkg/Thing");
    record.interfaces.push("java/lang/Runnable".to_string());
    record.source_file = Some("Thing.java".to_string());
    record.signature = Some("Ljava/lang/Object;Ljava/lang/Runnable;".to_string());
    add_field(&mut record, ACC_STATIC, "count", "I");
    let body = getter(&mut record, "count", "I", opcodes::IRETURN);
    add_method(&mut record, 0, "count", "()I", Some(body));
    record.inner_classes.push(InnerClassRecord {
        name: "pkg/Thing$Part".to_string(),
        outer_name: Some("pkg/Thing".to_string()),
        inner_name: Some("Part".to_string()),
        access: ACC_STATIC,
    });

    let bytes = record.to_bytes().expect("encode");
    let decoded = ClassRecord::parse(&bytes).expect("decode");

    assert_eq!(decoded.name, "pkg/Thing");
    assert_eq!(decoded.super_name.as_deref(), Some("java/lang/Object"));
    assert_eq!(decoded.interfaces, vec!["java/lang/Runnable".to_string()]);
    assert_eq!(decoded.source_file.as_deref(), Some("Thing.java"));
    assert_eq!(decoded.signature, record.signature);
    assert_eq!(decoded.fields, record.fields);
    assert_eq!(decoded.methods, record.methods);
    assert_eq!(decoded.inner_classes, record.inner_classes);
    assert_eq!(decoded.to_bytes().expect("re-encode"), bytes);
}

#[test]
fn unknown_attributes_and_bytecode_survive_unchanged() {
    let mut record = class("pkg/Keep");
    record.attributes.push(RawAttribute { name: "SourceDebugExtension".to_string(), info: vec![1, 2, 3, 4] });
    let code = CodeAttribute::new(3, 2, vec![opcodes::ICONST_0, opcodes::POP, opcodes::RETURN]);
    add_method(&mut record, 0, "run", "()V", Some(code.clone()));

    let decoded = ClassRecord::parse(&record.to_bytes().expect("encode")).expect("decode");
    assert_eq!(decoded.attributes, record.attributes);

    let method = decoded.method("run", "()V").expect("method");
    let parsed = CodeAttribute::parse(method.code().expect("code")).expect("parse code");
    assert_eq!(parsed.max_stack, 3);
    assert_eq!(parsed.max_locals, 2);
    assert_eq!(parsed.code, code.code);
    let opcodes: Vec<u8> = parsed.instructions().map(|i| i.opcode).collect();
    assert_eq!(opcodes, vec![opcodes::ICONST_0, opcodes::POP, opcodes::RETURN]);
}

#[test]
fn parse_rejects_bad_magic_and_truncation() {
    let err = ClassRecord::parse(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 52]).expect_err("bad magic");
    assert!(matches!(err, ClassFormatError::BadMagic(0xdeadbeef)));

    let bytes = class("pkg/Short").to_bytes().expect("encode");
    let err = ClassRecord::parse(&bytes[..bytes.len() - 3]).expect_err("truncated");
    assert!(matches!(err, ClassFormatError::UnexpectedEof { .. }), "got {err:?}");

    let mut padded = bytes.clone();
    padded.push(0);
    let err = ClassRecord::parse(&padded).expect_err("trailing");
    assert!(matches!(err, ClassFormatError::TrailingBytes(1)));
}

#[test]
fn interning_reuses_existing_entries() {
    let mut record = class("pkg/Pool");
    let pool = record.pool_mut();
    let first = pool.intern_member_ref(RefKind::Method, "pkg/Pool", "go", "()V").expect("intern");
    let second = pool.intern_member_ref(RefKind::Method, "pkg/Pool", "go", "()V").expect("intern");
    assert_eq!(first, second);
    let class_index = pool.intern_class("pkg/Pool").expect("intern class");
    assert_eq!(pool.class_name(class_index).expect("class"), "pkg/Pool");
    let (kind, owner, name, desc) = pool.member_ref(first).expect("member");
    assert_eq!((kind, owner.as_str(), name.as_str(), desc.as_str()), (RefKind::Method, "pkg/Pool", "go", "()V"));
}

#[test]
fn descriptors_and_signatures_are_remapped() {
    assert_eq!(remap_descriptor("(La;[Lb;I)Lc;", &rename_a), "(Lpkg/Alpha;[Lpkg/Beta;I)Lc;");
    assert_eq!(remap_descriptor("[[La;", &rename_a), "[[Lpkg/Alpha;");
    assert_eq!(
        remap_signature("Ljava/util/Map<La;Ljava/util/List<+Lb;>;>;", &rename_a),
        "Ljava/util/Map<Lpkg/Alpha;Ljava/util/List<+Lpkg/Beta;>;>;"
    );
    assert_eq!(
        remap_signature("<T:La;>(TT;Ljava/util/List<TT;>;)Lb;", &rename_a),
        "<T:Lpkg/Alpha;>(TT;Ljava/util/List<TT;>;)Lpkg/Beta;"
    );
    assert_eq!(remap_signature("not a signature<", &rename_a), "not a signature<");
}

#[test]
fn descriptor_helpers_convert_between_forms() {
    assert_eq!(
        method_params("(I[Ljava/lang/String;J)V").expect("params"),
        vec!["I".to_string(), "[Ljava/lang/String;".to_string(), "J".to_string()]
    );
    assert_eq!(return_type("(I)Ljava/util/List;"), Some("Ljava/util/List;"));
    assert_eq!(descriptor_to_java("[[I").as_deref(), Some("int[][]"));
    assert_eq!(descriptor_to_java("Lfoo/Bar;").as_deref(), Some("foo.Bar"));
    assert_eq!(java_to_descriptor("foo.Bar[]"), "[Lfoo/Bar;");
    assert_eq!(java_to_descriptor("boolean"), "Z");
}
