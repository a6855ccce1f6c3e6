//! Normalization stages applied to the freshly indexed graph.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use strum::EnumIter;

use crate::backends::StageError;
use crate::classfile::code::{opcodes, CodeAttribute};
use crate::classfile::{
    InnerClassRecord, ACC_ABSTRACT, ACC_ENUM, ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE, ACC_PROTECTED,
    ACC_PUBLIC, ACC_STATIC, ACC_SUPER, ACC_SYNTHETIC,
};
use crate::model::{ClassGraph, MemberRef, RenameSet};

/// The ordered normalization stages. Iterating the enum yields the order
/// the pipeline runs them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum NormalizationStage {
    FixInnerClasses,
    FixParameterLvt,
    GuessFieldGenerics,
    GuessCollectionGenerics,
    GuessLambdaStreamGenerics,
    InferMethodGenerics,
    InferConstructorGenerics,
    FixForeachOnArray,
    FixComparators,
    GuessAnonymousInnerClasses,
}

impl NormalizationStage {
    pub fn name(self) -> &'static str {
        match self {
            NormalizationStage::FixInnerClasses => "fix-inner-classes",
            NormalizationStage::FixParameterLvt => "fix-parameter-lvt",
            NormalizationStage::GuessFieldGenerics => "guess-field-generics",
            NormalizationStage::GuessCollectionGenerics => "guess-collection-generics",
            NormalizationStage::GuessLambdaStreamGenerics => "guess-lambda-stream-generics",
            NormalizationStage::InferMethodGenerics => "infer-method-generics",
            NormalizationStage::InferConstructorGenerics => "infer-constructor-generics",
            NormalizationStage::FixForeachOnArray => "fix-foreach-on-array",
            NormalizationStage::FixComparators => "fix-comparators",
            NormalizationStage::GuessAnonymousInnerClasses => "guess-anonymous-inner-classes",
        }
    }
}

/// Name of the switch map correction applied after intermediary remapping.
pub const FIX_SWITCH_MAPS: &str = "fix-switch-maps";

/// In-place bytecode normalization operations.
///
/// Every operation defaults to doing nothing so implementations only
/// override what they support. The signature guessing operations return
/// method references mapped to the inferred generic element class; the
/// caller folds them into method signatures.
pub trait NormalizationStages: Send + Sync {
    fn name(&self) -> &str;

    fn fix_inner_classes(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn fix_parameter_lvt(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn guess_field_generics(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn guess_collection_return_generics(
        &self,
        _graph: &ClassGraph,
    ) -> Result<HashMap<MemberRef, String>, StageError> {
        Ok(HashMap::new())
    }

    fn guess_lambda_stream_generics(
        &self,
        _graph: &ClassGraph,
        _guesses: &mut HashMap<MemberRef, String>,
    ) -> Result<(), StageError> {
        Ok(())
    }

    fn infer_method_generics(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn infer_constructor_generics(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn fix_foreach_on_array(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn fix_comparators(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn guess_anonymous_inner_classes(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }

    fn fix_switch_maps(&self, _graph: &mut ClassGraph) -> Result<(), StageError> {
        Ok(())
    }
}

const INNER_ACCESS_MASK: u16 = ACC_PUBLIC
    | ACC_PRIVATE
    | ACC_PROTECTED
    | ACC_FINAL
    | ACC_INTERFACE
    | ACC_ABSTRACT
    | ACC_SYNTHETIC
    | ACC_ENUM;

/// Built-in normalizer restoring inner class metadata from `$` names and
/// naming enum switch map fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralNormalizer;

impl StructuralNormalizer {
    /// `(outer, suffix)` for `Outer$suffix` when `Outer` is in the graph.
    fn split_nested<'a>(graph: &ClassGraph, name: &'a str) -> Option<(&'a str, &'a str)> {
        let idx = name.rfind('$')?;
        let (outer, suffix) = (&name[..idx], &name[idx + 1..]);
        (!suffix.is_empty() && graph.contains(outer)).then_some((outer, suffix))
    }

    fn add_records(graph: &mut ClassGraph, records: Vec<InnerClassRecord>) {
        let count = records.len();
        for record in records {
            if let Some(class) = graph.get_mut(&record.name) {
                class.inner_classes.push(record);
            }
        }
        if count > 0 {
            graph.apply_inner_classes();
        }
    }
}

impl NormalizationStages for StructuralNormalizer {
    fn name(&self) -> &str {
        "structural"
    }

    fn fix_inner_classes(&self, graph: &mut ClassGraph) -> Result<(), StageError> {
        let mut records = Vec::new();
        for class in graph.iter() {
            let Some((outer, suffix)) = Self::split_nested(graph, &class.name) else { continue };
            if suffix.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if class.inner_classes.iter().any(|icn| icn.name == class.name) {
                continue;
            }
            let outer_ref = format!("L{outer};");
            let captures_outer =
                class.fields.iter().any(|f| f.access & ACC_SYNTHETIC != 0 && f.desc == outer_ref);
            let mut access = class.access & INNER_ACCESS_MASK;
            if !captures_outer {
                access |= ACC_STATIC;
            }
            records.push(InnerClassRecord {
                name: class.name.clone(),
                outer_name: Some(outer.to_string()),
                inner_name: Some(suffix.to_string()),
                access,
            });
        }
        debug!("Restored {} member inner class records", records.len());
        Self::add_records(graph, records);
        Ok(())
    }

    fn guess_anonymous_inner_classes(&self, graph: &mut ClassGraph) -> Result<(), StageError> {
        let mut records = Vec::new();
        for class in graph.iter() {
            let Some((_, suffix)) = Self::split_nested(graph, &class.name) else { continue };
            if !suffix.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if class.inner_classes.iter().any(|icn| icn.name == class.name) {
                continue;
            }
            records.push(InnerClassRecord {
                name: class.name.clone(),
                outer_name: None,
                inner_name: None,
                access: (class.access & INNER_ACCESS_MASK) | ACC_SUPER,
            });
        }
        debug!("Marked {} anonymous inner classes", records.len());
        Self::add_records(graph, records);
        Ok(())
    }

    /// Name `int[]` fields filled from `X.values()` in a static initializer
    /// `$SwitchMap$` followed by `X` with `/` replaced by `$`.
    fn fix_switch_maps(&self, graph: &mut ClassGraph) -> Result<(), StageError> {
        let mut renames = RenameSet::new();
        let mut claimed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for class in graph.iter() {
            let Some(clinit) = class.method("<clinit>", "()V") else { continue };
            let Some(info) = clinit.code() else { continue };
            let code = CodeAttribute::parse(info)
                .map_err(|e| StageError::new(FIX_SWITCH_MAPS, format!("{}: {e}", class.name)))?;
            let pool = class.pool();
            let mut values_of: Option<String> = None;
            for insn in code.instructions() {
                match insn.opcode {
                    opcodes::INVOKESTATIC => {
                        values_of = insn
                            .pool_index()
                            .and_then(|idx| pool.member_ref(idx).ok())
                            .filter(|(_, owner, name, desc)| {
                                name == "values" && *desc == format!("()[L{owner};")
                            })
                            .map(|(_, owner, _, _)| owner);
                    }
                    opcodes::PUTSTATIC => {
                        let Some(enum_name) = values_of.take() else { continue };
                        let Some((_, owner, name, desc)) =
                            insn.pool_index().and_then(|idx| pool.member_ref(idx).ok())
                        else {
                            continue;
                        };
                        if owner != class.name || desc != "[I" {
                            continue;
                        }
                        let target = format!("$SwitchMap${}", enum_name.replace('/', "$"));
                        if name == target || class.field(&target, "[I").is_some() {
                            continue;
                        }
                        let taken = claimed.entry(owner.clone()).or_default();
                        if taken.contains(&target) {
                            continue;
                        }
                        taken.push(target.clone());
                        renames.rename_field(&owner, &name, &desc, target);
                    }
                    opcodes::ARRAYLENGTH | opcodes::NEWARRAY => {}
                    _ if values_of.is_some() => values_of = None,
                    _ => {}
                }
            }
        }
        let count = renames.len();
        graph
            .apply_renames(&renames)
            .map_err(|e| StageError::new(FIX_SWITCH_MAPS, e.to_string()))?;
        debug!("Named {count} switch map fields");
        Ok(())
    }
}
