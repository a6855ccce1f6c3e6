mod common;

use std::collections::HashMap;

use starmap_core::classfile::code::{opcodes, CodeAttribute};
use starmap_core::classfile::{ClassRecord, InnerClassRecord, RefKind, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use starmap_core::model::{ClassGraph, GraphError, MemberRef, RenameSet};

use common::{add_field, add_method, class, empty_body};

fn member_refs(record: &ClassRecord) -> Vec<(RefKind, String, String, String)> {
    record.pool().iter().filter_map(|(index, _)| record.pool().member_ref(index).ok()).collect()
}

fn caller(name: &str, target: &str) -> ClassRecord {
    let mut record = class(name);
    let pool = record.pool_mut();
    let field = pool.intern_member_ref(RefKind::Field, target, "a", "I").expect("intern");
    let method = pool.intern_member_ref(RefKind::Method, target, "b", "(La;)La;").expect("intern");
    let [f1, f2] = field.to_be_bytes();
    let [m1, m2] = method.to_be_bytes();
    let code = vec![
        opcodes::ALOAD_0,
        opcodes::GETFIELD,
        f1,
        f2,
        opcodes::POP,
        opcodes::ALOAD_0,
        opcodes::ACONST_NULL,
        opcodes::INVOKEVIRTUAL,
        m1,
        m2,
        opcodes::POP,
        opcodes::RETURN,
    ];
    add_method(&mut record, ACC_PUBLIC, "call", "()V", Some(CodeAttribute::new(2, 1, code)));
    record
}

fn base_graph() -> ClassGraph {
    let mut target = class("a");
    add_field(&mut target, 0, "a", "I");
    add_method(&mut target, ACC_PUBLIC, "b", "(La;)La;", Some(empty_body()));
    target.signature = Some("Ljava/lang/Object;Ljava/lang/Comparable<La;>;".to_string());

    let mut child = ClassRecord::new("c", Some("a"));
    add_method(&mut child, ACC_PUBLIC, "b", "(La;)La;", Some(empty_body()));

    ClassGraph::from_records(vec![target, child, caller("d", "c")]).expect("graph")
}

#[test]
fn duplicate_classes_are_rejected() {
    let err = ClassGraph::from_records(vec![class("a"), class("a")]).expect_err("duplicate");
    assert!(matches!(err, GraphError::DuplicateClass(name) if name == "a"));
}

#[test]
fn renames_reach_pool_references_descriptors_and_signatures() {
    let mut graph = base_graph();
    let mut renames = RenameSet::new();
    renames.rename_class("a", "game/Star");
    renames.rename_field("a", "a", "I", "mass");
    renames.rename_method("a", "b", "(La;)La;", "merge");

    let renamed = graph.apply_renames(&renames).expect("apply");
    assert_eq!(renamed, 1);
    assert!(graph.get("a").is_none());

    let star = graph.get("game/Star").expect("renamed class");
    assert!(star.field("mass", "I").is_some());
    assert!(star.method("merge", "(Lgame/Star;)Lgame/Star;").is_some());
    assert_eq!(
        star.signature.as_deref(),
        Some("Ljava/lang/Object;Ljava/lang/Comparable<Lgame/Star;>;")
    );

    let child = graph.get("c").expect("child");
    assert_eq!(child.super_name.as_deref(), Some("game/Star"));
    // The override follows the renamed declaration.
    assert!(child.method("merge", "(Lgame/Star;)Lgame/Star;").is_some());

    // References through the subclass resolve against the hierarchy.
    let refs = member_refs(graph.get("d").expect("caller"));
    assert!(refs.contains(&(RefKind::Field, "c".to_string(), "mass".to_string(), "I".to_string())));
    assert!(refs.contains(&(
        RefKind::Method,
        "c".to_string(),
        "merge".to_string(),
        "(Lgame/Star;)Lgame/Star;".to_string()
    )));
}

#[test]
fn renamed_graph_still_encodes() {
    let mut graph = base_graph();
    let mut renames = RenameSet::new();
    renames.rename_class("a", "game/Star");
    graph.apply_renames(&renames).expect("apply");
    for record in graph.iter() {
        let bytes = record.to_bytes().expect("encode");
        let decoded = ClassRecord::parse(&bytes).expect("decode");
        assert_eq!(decoded.name, record.name);
    }
}

#[test]
fn nested_classes_follow_their_enclosing_class() {
    let mut renames = RenameSet::new();
    renames.rename_class("a", "game/Galaxy");
    assert_eq!(renames.map_class("a$1").as_deref(), Some("game/Galaxy$1"));
    assert_eq!(renames.map_class("a$b$c").as_deref(), Some("game/Galaxy$b$c"));
    assert_eq!(renames.map_class("b"), None);

    renames.rename_class("a$b", "game/Galaxy$Part");
    assert_eq!(renames.map_class("a$b$c").as_deref(), Some("game/Galaxy$Part$c"));
}

#[test]
fn inner_class_names_keep_the_enclosing_prefix() {
    let mut outer = class("a");
    outer.inner_classes.push(InnerClassRecord {
        name: "a$b".to_string(),
        outer_name: Some("a".to_string()),
        inner_name: Some("b".to_string()),
        access: ACC_STATIC,
    });
    let graph = ClassGraph::from_records(vec![outer, class("a$b"), class("a$1")]).expect("graph");

    let mut renames = RenameSet::new();
    renames.rename_class("a", "Galaxy");
    renames.rename_class("a$b", "Sector");
    let fixes = renames.fix_inner_class_names(&graph);

    assert_eq!(fixes.get("a$b").map(String::as_str), Some("Galaxy$Sector"));
    assert_eq!(renames.class("a$b"), Some("Galaxy$Sector"));
    // Moves with its outer class and still gets its own record.
    assert_eq!(fixes.get("a$1").map(String::as_str), Some("Galaxy$1"));
    assert_eq!(renames.class("a$1"), Some("Galaxy$1"));
    assert_eq!(fixes.len(), 2);
}

#[test]
fn untouched_classes_get_no_correction() {
    let graph = ClassGraph::from_records(vec![class("a"), class("a$1"), class("b$1")]).expect("graph");
    let mut renames = RenameSet::new();
    renames.rename_class("a", "Galaxy");
    let fixes = renames.fix_inner_class_names(&graph);

    assert_eq!(fixes.keys().map(String::as_str).collect::<Vec<_>>(), vec!["a$1"]);
    assert_eq!(renames.class("b$1"), None);
}

#[test]
fn inner_class_records_are_shared_and_renamed() {
    let outer = class("a");
    let mut inner = class("a$b");
    inner.inner_classes.push(InnerClassRecord {
        name: "a$b".to_string(),
        outer_name: Some("a".to_string()),
        inner_name: Some("b".to_string()),
        access: ACC_PUBLIC | ACC_STATIC | ACC_SUPER,
    });
    let mut graph = ClassGraph::from_records(vec![outer, inner]).expect("graph");

    graph.apply_inner_classes();
    let outer_records = &graph.get("a").expect("outer").inner_classes;
    assert_eq!(outer_records.len(), 1);
    assert_eq!(outer_records[0].name, "a$b");

    graph.clear_inner_class_flag(ACC_SUPER);
    assert!(graph.iter().flat_map(|c| c.inner_classes.iter()).all(|icn| icn.access & ACC_SUPER == 0));

    let mut renames = RenameSet::new();
    renames.rename_class("a", "Galaxy");
    graph.apply_renames(&renames).expect("apply");
    let icn = &graph.get("Galaxy$b").expect("inner").inner_classes[0];
    assert_eq!(icn.name, "Galaxy$b");
    assert_eq!(icn.outer_name.as_deref(), Some("Galaxy"));
}

#[test]
fn signatures_are_added_only_for_class_return_types() {
    let mut holder = class("a");
    add_method(&mut holder, ACC_PUBLIC, "items", "()Ljava/util/List;", None);
    add_method(&mut holder, ACC_PUBLIC, "count", "()I", None);
    add_method(&mut holder, ACC_PUBLIC, "typed", "()Ljava/util/List;", None);
    holder.methods[2].signature = Some("()Ljava/util/List<Ljava/lang/String;>;".to_string());
    let mut graph = ClassGraph::from_records(vec![holder]).expect("graph");

    let guesses = HashMap::from([
        (MemberRef::new("a", "items", "()Ljava/util/List;"), "game/Star".to_string()),
        (MemberRef::new("a", "count", "()I"), "game/Star".to_string()),
        (MemberRef::new("a", "typed", "()Ljava/util/List;"), "game/Star".to_string()),
    ]);
    assert_eq!(graph.add_signatures(&guesses), 1);

    let holder = graph.get("a").expect("class");
    assert_eq!(
        holder.method("items", "()Ljava/util/List;").and_then(|m| m.signature.as_deref()),
        Some("()Ljava/util/List<Lgame/Star;>;")
    );
    assert!(holder.method("count", "()I").and_then(|m| m.signature.as_deref()).is_none());
    assert_eq!(
        holder.method("typed", "()Ljava/util/List;").and_then(|m| m.signature.as_deref()),
        Some("()Ljava/util/List<Ljava/lang/String;>;")
    );
}

#[test]
fn stale_index_is_rebuilt_on_demand() {
    let mut graph = ClassGraph::from_records(vec![class("a")]).expect("graph");
    graph.get_mut("a").expect("class").name = "b".to_string();
    assert!(graph.get("a").is_none());
    assert!(graph.get("b").is_none());
    graph.invalidate_name_caches().expect("rebuild");
    assert!(graph.get("b").is_some());
}
