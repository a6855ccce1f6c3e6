mod common;

use starmap_core::backends::{
    default_engine_registry, is_java_identifier, is_placeholder_name, looks_obfuscated,
    DefaultIntermediaryGenerator, EngineRegistry, InferenceEngine, IntermediaryGenerator, NormalizationStages,
    SourceHintEngine, StructuralNormalizer,
};
use starmap_core::classfile::code::opcodes;
use starmap_core::classfile::{ACC_PUBLIC, ACC_STATIC, ACC_SUPER, ACC_SYNTHETIC};
use starmap_core::model::{ClassGraph, RenameSet};

use common::{add_field, add_method, class, enum_class, getter, sample_game, switch_map_holder};

fn graph(records: Vec<starmap_core::classfile::ClassRecord>) -> ClassGraph {
    ClassGraph::from_records(records).expect("graph")
}

#[test]
fn name_predicates() {
    assert!(looks_obfuscated("a"));
    assert!(looks_obfuscated("Ab"));
    assert!(!looks_obfuscated("abc"));
    assert!(!looks_obfuscated("a1"));
    assert!(is_placeholder_name("class_12"));
    assert!(!is_placeholder_name("class_"));
    assert!(!is_placeholder_name("Galaxy"));
    assert!(is_java_identifier("RED"));
    assert!(!is_java_identifier("dark red"));
    assert!(!is_java_identifier("class"));
    assert!(!is_java_identifier("1st"));
}

#[test]
fn generator_numbers_classes_in_name_order() {
    let renames = DefaultIntermediaryGenerator.generate(&graph(sample_game())).expect("generate");
    assert_eq!(renames.class("a"), Some("class_1"));
    assert_eq!(renames.class("a$1"), Some("class_1$1"));
    assert_eq!(renames.class("a$b"), Some("class_1$class_2"));
    assert_eq!(renames.class("b"), Some("class_3"));
    assert_eq!(renames.class("c"), Some("class_4"));
    assert_eq!(renames.field("b", "a", "Lb;"), Some("RED"));
    assert_eq!(renames.field("b", "b", "Lb;"), Some("GREEN"));
    assert_eq!(renames.method("c", "a", "()Ljava/lang/String;"), Some("getName"));
}

#[test]
fn generator_keeps_packages_and_skips_taken_names() {
    let records = vec![class("game/a"), class("game/class_1"), class("Game"), class("Game$a"), class("game/a$Inner")];
    let mut renames = RenameSet::new();
    DefaultIntermediaryGenerator.remap_classes(&graph(records), &mut renames).expect("classes");

    // Sorted order: Game, Game$a, game/a, game/a$Inner, game/class_1.
    assert_eq!(renames.class("Game"), None);
    assert_eq!(renames.class("Game$a"), Some("Game$class_1"));
    assert_eq!(renames.class("game/a"), Some("game/class_2"));
    assert_eq!(renames.class("game/a$Inner"), Some("game/class_2$Inner"));
    assert_eq!(renames.class("game/class_1"), None);

    let mut renames = RenameSet::new();
    DefaultIntermediaryGenerator
        .remap_classes(&graph(vec![class("a"), class("class_1")]), &mut renames)
        .expect("classes");
    assert_eq!(renames.class("a"), Some("class_2"));
}

#[test]
fn enum_constants_need_a_free_valid_identifier() {
    let records = vec![enum_class("e", &[("a", "b"), ("b", "RED"), ("c", "dark red"), ("DONE", "DONE")])];
    let mut renames = RenameSet::new();
    DefaultIntermediaryGenerator.propose_enum_fields(&graph(records), &mut renames).expect("enums");

    assert_eq!(renames.field("e", "a", "Le;"), None);
    assert_eq!(renames.field("e", "b", "Le;"), Some("RED"));
    assert_eq!(renames.field("e", "c", "Le;"), None);
    assert_eq!(renames.field("e", "DONE", "Le;"), None);
}

#[test]
fn getters_follow_their_field_names() {
    let mut holder = class("h");
    add_field(&mut holder, 0, "active", "Z");
    add_field(&mut holder, 0, "x", "I");
    let body = getter(&mut holder, "active", "Z", opcodes::IRETURN);
    add_method(&mut holder, ACC_PUBLIC, "a", "()Z", Some(body));
    let body = getter(&mut holder, "x", "I", opcodes::IRETURN);
    add_method(&mut holder, ACC_PUBLIC, "b", "()I", Some(body));
    let body = getter(&mut holder, "active", "Z", opcodes::IRETURN);
    add_method(&mut holder, ACC_PUBLIC | ACC_STATIC, "c", "()Z", Some(body));

    let mut renames = RenameSet::new();
    DefaultIntermediaryGenerator.remap_getters(&graph(vec![holder]), &mut renames).expect("getters");
    assert_eq!(renames.method("h", "a", "()Z"), Some("isActive"));
    assert_eq!(renames.method("h", "b", "()I"), None);
    assert_eq!(renames.method("h", "c", "()Z"), None);
}

#[test]
fn getters_declared_in_several_classes_are_left_alone() {
    let mut first = class("p");
    add_field(&mut first, 0, "name", "Ljava/lang/String;");
    let body = getter(&mut first, "name", "Ljava/lang/String;", opcodes::ARETURN);
    add_method(&mut first, ACC_PUBLIC, "a", "()Ljava/lang/String;", Some(body));
    let mut second = class("q");
    add_field(&mut second, 0, "name", "Ljava/lang/String;");
    let body = getter(&mut second, "name", "Ljava/lang/String;", opcodes::ARETURN);
    add_method(&mut second, ACC_PUBLIC, "a", "()Ljava/lang/String;", Some(body));

    let mut renames = RenameSet::new();
    DefaultIntermediaryGenerator.remap_getters(&graph(vec![first, second]), &mut renames).expect("getters");
    assert!(renames.methods().is_empty());
}

#[test]
fn switch_map_fields_are_named_after_their_enum() {
    let records = vec![enum_class("game/Color", &[("a", "RED")]), switch_map_holder("game/a$1", "a", "game/Color")];
    let mut graph = graph(records);
    StructuralNormalizer.fix_switch_maps(&mut graph).expect("switch maps");

    let holder = graph.get("game/a$1").expect("holder");
    assert!(holder.field("$SwitchMap$game$Color", "[I").is_some());
    assert!(holder.field("a", "[I").is_none());
}

#[test]
fn inner_class_records_are_restored_from_names() {
    let mut graph = graph(sample_game());
    StructuralNormalizer.fix_inner_classes(&mut graph).expect("member classes");
    StructuralNormalizer.guess_anonymous_inner_classes(&mut graph).expect("anonymous classes");

    let member = graph.get("a$b").expect("member").inner_classes.first().cloned().expect("record");
    assert_eq!(member.outer_name.as_deref(), Some("a"));
    assert_eq!(member.inner_name.as_deref(), Some("b"));
    // Captures `this$0`, so it is not static.
    assert_eq!(member.access & ACC_STATIC, 0);

    let anonymous = graph.get("a$1").expect("anonymous").inner_classes.first().cloned().expect("record");
    assert_eq!(anonymous.outer_name, None);
    assert_eq!(anonymous.inner_name, None);
    assert_ne!(anonymous.access & ACC_SUPER, 0);

    let outer: Vec<String> = graph.get("a").expect("outer").inner_classes.iter().map(|i| i.name.clone()).collect();
    assert!(outer.contains(&"a$b".to_string()), "{outer:?}");
}

#[test]
fn static_member_classes_are_marked_static() {
    let mut graph = graph(vec![class("a"), class("a$b")]);
    StructuralNormalizer.fix_inner_classes(&mut graph).expect("member classes");
    let record = &graph.get("a$b").expect("member").inner_classes[0];
    assert_ne!(record.access & ACC_STATIC, 0);
    assert_eq!(record.access & ACC_SYNTHETIC, 0);
}

#[test]
fn default_registry_builds_the_default_engine() {
    let registry = default_engine_registry();
    assert_eq!(registry.versions(), vec!["5.0.2".to_string()]);
    assert!(registry.contains("5.0.2"));
    assert!(registry.create("9.9.9").is_none());
    let engine = registry.create("5.0.2").expect("engine");
    assert_eq!(engine.version(), "5.0.2");
}

#[test]
fn registered_factories_build_a_fresh_engine_per_request() {
    let mut registry = EngineRegistry::new();
    registry
        .register("2.0", || Box::new(SourceHintEngine::new("2.0")))
        .register("1.0", || Box::new(SourceHintEngine::new("1.0")));
    assert_eq!(registry.versions(), vec!["1.0".to_string(), "2.0".to_string()]);
    assert_eq!(registry.create("1.0").expect("engine").version(), "1.0");
}

#[test]
fn source_hints_need_a_unique_claim() {
    let mut first = class("a");
    first.source_file = Some("Util.java".to_string());
    let mut second = class("b");
    second.source_file = Some("Util.java".to_string());
    let mut third = class("game/c");
    third.source_file = Some("Planet.java".to_string());
    let mut taken = class("d");
    taken.source_file = Some("Existing.java".to_string());
    let graph = graph(vec![first, second, third, taken, class("Existing")]);

    let mut renames = RenameSet::new();
    let mut out = Vec::new();
    SourceHintEngine::new("5.0.2").run_all(&graph, &mut renames, &mut out).expect("run");

    assert_eq!(renames.classes().len(), 1);
    assert_eq!(renames.class("game/c"), Some("game/Planet"));
    assert_eq!(String::from_utf8(out).expect("utf8"), "CLASS\tgame/c\tgame/Planet\n");
}
