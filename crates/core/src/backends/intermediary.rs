//! Intermediary name generation.

use std::collections::{BTreeSet, HashSet};

use log::debug;

use crate::backends::{is_java_identifier, looks_obfuscated, StageError};
use crate::classfile::code::{opcodes, CodeAttribute};
use crate::classfile::{ClassRecord, ACC_ENUM, ACC_STATIC};
use crate::model::{ClassGraph, RenameSet};

/// Assigns deterministic structural names.
///
/// The pipeline calls the three passes in order (class renaming, enum
/// constant naming, getter naming) against the unmodified graph, each pass
/// seeing the renames proposed by the previous ones.
pub trait IntermediaryGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn remap_classes(&self, graph: &ClassGraph, renames: &mut RenameSet) -> Result<(), StageError>;

    fn propose_enum_fields(&self, graph: &ClassGraph, renames: &mut RenameSet) -> Result<(), StageError>;

    fn remap_getters(&self, graph: &ClassGraph, renames: &mut RenameSet) -> Result<(), StageError>;

    /// Run every pass in order and return the collected renames.
    fn generate(&self, graph: &ClassGraph) -> Result<RenameSet, StageError> {
        let mut renames = RenameSet::new();
        self.remap_classes(graph, &mut renames)?;
        self.propose_enum_fields(graph, &mut renames)?;
        self.remap_getters(graph, &mut renames)?;
        Ok(renames)
    }
}

/// Built-in generator.
///
/// - Classes whose simple name looks obfuscated become `class_<n>` in their
///   package, numbered in name order. Nested classes follow their outer
///   class; numeric (anonymous) suffixes are kept.
/// - Enum constants are named after the string passed to their constructor
///   in the static initializer.
/// - Trivial getters (`aload_0; getfield; return`) of a named field become
///   `get<Field>` (`is<Field>` for booleans).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultIntermediaryGenerator;

impl DefaultIntermediaryGenerator {
    fn enum_constants(class: &ClassRecord) -> Vec<(String, String)> {
        let Some(info) = class.method("<clinit>", "()V").and_then(|m| m.code()) else {
            return Vec::new();
        };
        let Ok(code) = CodeAttribute::parse(info) else { return Vec::new() };
        let pool = class.pool();
        let own_desc = format!("L{};", class.name);
        let mut pending_new = false;
        let mut literal: Option<String> = None;
        let mut found = Vec::new();
        for insn in code.instructions() {
            match insn.opcode {
                opcodes::NEW => {
                    pending_new = insn
                        .pool_index()
                        .and_then(|idx| pool.class_name(idx).ok())
                        .is_some_and(|name| name == class.name);
                    literal = None;
                }
                opcodes::LDC | opcodes::LDC_W if pending_new && literal.is_none() => {
                    literal = insn.pool_index().and_then(|idx| pool.string_literal(idx));
                }
                opcodes::PUTSTATIC => {
                    let target = insn.pool_index().and_then(|idx| pool.member_ref(idx).ok());
                    if let (Some((_, owner, field, desc)), Some(name)) = (target, literal.take()) {
                        if owner == class.name && desc == own_desc {
                            found.push((field, name));
                        }
                    }
                    pending_new = false;
                }
                _ => {}
            }
        }
        found
    }

    fn trivial_getter_field(class: &ClassRecord, desc: &str, info: &[u8]) -> Option<String> {
        let code = CodeAttribute::parse(info).ok()?;
        let insns: Vec<_> = code.instructions().collect();
        let [load, get, ret] = insns.as_slice() else { return None };
        if load.opcode != opcodes::ALOAD_0 || get.opcode != opcodes::GETFIELD {
            return None;
        }
        if !(opcodes::IRETURN..=opcodes::ARETURN).contains(&ret.opcode) {
            return None;
        }
        let (_, owner, field, field_desc) = class.pool().member_ref(get.pool_index()?).ok()?;
        (owner == class.name && format!("(){field_desc}") == desc).then_some(field)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntermediaryGenerator for DefaultIntermediaryGenerator {
    fn name(&self) -> &str {
        "default"
    }

    fn remap_classes(&self, graph: &ClassGraph, renames: &mut RenameSet) -> Result<(), StageError> {
        let existing: HashSet<String> = graph.iter().map(|c| c.name.clone()).collect();
        let mut taken: HashSet<String> = existing.clone();
        let mut counter = 0usize;

        // Sorted order puts every outer class before its nested classes.
        for name in graph.sorted_names() {
            if let Some(idx) = name.rfind('$').filter(|idx| existing.contains(&name[..*idx])) {
                let (outer, suffix) = (&name[..idx], &name[idx + 1..]);
                let outer_target = renames.map_class(outer);
                if suffix.bytes().all(|b| b.is_ascii_digit()) || !looks_obfuscated(suffix) {
                    if let Some(outer_target) = outer_target {
                        let target = format!("{outer_target}${suffix}");
                        taken.insert(target.clone());
                        renames.rename_class(name.as_str(), target);
                    }
                    continue;
                }
                let prefix = outer_target.unwrap_or_else(|| outer.to_string());
                let target = loop {
                    counter += 1;
                    let candidate = format!("{prefix}$class_{counter}");
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                };
                taken.insert(target.clone());
                renames.rename_class(name.as_str(), target);
                continue;
            }

            let (package, simple) = match name.rfind('/') {
                Some(idx) => (&name[..=idx], &name[idx + 1..]),
                None => ("", name.as_str()),
            };
            if !looks_obfuscated(simple) {
                continue;
            }
            let target = loop {
                counter += 1;
                let candidate = format!("{package}class_{counter}");
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(target.clone());
            renames.rename_class(name.as_str(), target);
        }
        debug!("Proposed {} intermediary class names", renames.classes().len());
        Ok(())
    }

    fn propose_enum_fields(&self, graph: &ClassGraph, renames: &mut RenameSet) -> Result<(), StageError> {
        let mut proposed = 0;
        for class in graph.iter() {
            if !class.is_enum() || class.super_name.as_deref() != Some("java/lang/Enum") {
                continue;
            }
            let own_desc = format!("L{};", class.name);
            let mut used: BTreeSet<String> = class.fields.iter().map(|f| f.name.clone()).collect();
            for (field, constant) in Self::enum_constants(class) {
                let Some(record) = class.field(&field, &own_desc) else { continue };
                if record.access & ACC_ENUM == 0 || field == constant || !is_java_identifier(&constant) {
                    continue;
                }
                if used.contains(&constant) {
                    continue;
                }
                used.insert(constant.clone());
                renames.rename_field(&class.name, &field, &own_desc, constant);
                proposed += 1;
            }
        }
        debug!("Proposed {proposed} enum constant names");
        Ok(())
    }

    fn remap_getters(&self, graph: &ClassGraph, renames: &mut RenameSet) -> Result<(), StageError> {
        // Methods declared more than once may override each other; leave those alone.
        let mut declared: HashSet<(String, String)> = HashSet::new();
        let mut repeated: HashSet<(String, String)> = HashSet::new();
        for class in graph.iter() {
            for method in &class.methods {
                let key = (method.name.clone(), method.desc.clone());
                if !declared.insert(key.clone()) {
                    repeated.insert(key);
                }
            }
        }

        let mut proposed = 0;
        for class in graph.iter() {
            let mut names: HashSet<(String, String)> =
                class.methods.iter().map(|m| (m.name.clone(), m.desc.clone())).collect();
            for method in &class.methods {
                if method.access & ACC_STATIC != 0 || !looks_obfuscated(&method.name) {
                    continue;
                }
                if repeated.contains(&(method.name.clone(), method.desc.clone())) {
                    continue;
                }
                let Some(info) = method.code() else { continue };
                let Some(field) = Self::trivial_getter_field(class, &method.desc, info) else { continue };
                let field_desc = &method.desc[2..];
                let field_name = renames.field(&class.name, &field, field_desc).unwrap_or(&field).to_string();
                if looks_obfuscated(&field_name) {
                    continue;
                }
                let prefix = if field_desc == "Z" { "is" } else { "get" };
                let target = format!("{prefix}{}", capitalize(&field_name));
                if !names.insert((target.clone(), method.desc.clone())) {
                    continue;
                }
                renames.rename_method(&class.name, &method.name, &method.desc, target);
                proposed += 1;
            }
        }
        debug!("Proposed {proposed} getter names");
        Ok(())
    }
}
