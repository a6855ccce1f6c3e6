//! Semantic name inference engines, selected by version.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

use log::debug;

use crate::backends::{is_java_identifier, is_placeholder_name, looks_obfuscated};
use crate::classfile::descriptor::object_type;
use crate::config::DEFAULT_ENGINE_VERSION;
use crate::model::{ClassGraph, RenameSet};

/// A name inference engine.
///
/// `run_all` proposes names for the classes and members of `graph` by
/// adding them to `renames`, and writes every proposal to `out` as Tiny v1
/// body lines (`CLASS`, `FIELD` and `METHOD` with the graph's current name
/// followed by the proposed name). The caller writes the header and applies
/// `renames` afterwards; the graph itself is never modified here.
pub trait InferenceEngine: Send + Sync {
    fn version(&self) -> &str;

    fn run_all(&self, graph: &ClassGraph, renames: &mut RenameSet, out: &mut dyn Write) -> io::Result<()>;
}

type EngineFactory = Box<dyn Fn() -> Box<dyn InferenceEngine> + Send + Sync>;

/// Registry mapping a declared engine version to its constructor.
#[derive(Default)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self { factories: BTreeMap::new() }
    }

    pub fn register<F>(&mut self, version: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn InferenceEngine> + Send + Sync + 'static,
    {
        self.factories.insert(version.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, version: &str) -> bool {
        self.factories.contains_key(version)
    }

    /// Construct the engine registered under `version`.
    pub fn create(&self, version: &str) -> Option<Box<dyn InferenceEngine>> {
        self.factories.get(version).map(|factory| factory())
    }

    /// Sorted list of registered versions for error messages and listings.
    pub fn versions(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

/// Registry populated with the built-in engine.
pub fn default_engine_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register(DEFAULT_ENGINE_VERSION, || Box::new(SourceHintEngine::new(DEFAULT_ENGINE_VERSION)));
    registry
}

/// Engine using the naming hints left in the binary.
///
/// - A top-level class whose simple name is a placeholder (obfuscated or
///   `class_<n>`) takes the stem of its `SourceFile` attribute, unless
///   another class claims the same name or it already exists in the package.
/// - A field whose name looks obfuscated takes the lower camel case simple
///   name of its type when that type is a named class of the graph and the
///   field is the only one of that type in its class.
#[derive(Debug, Clone)]
pub struct SourceHintEngine {
    version: String,
}

impl SourceHintEngine {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into() }
    }

    fn propose_classes(graph: &ClassGraph) -> BTreeMap<String, String> {
        let mut claims: HashMap<String, Vec<String>> = HashMap::new();
        for class in graph.iter() {
            if class.name.contains('$') || !is_placeholder_name(class.simple_name()) {
                continue;
            }
            let Some(source) = class.source_file.as_deref() else { continue };
            let stem = source.strip_suffix(".java").unwrap_or(source);
            if stem == class.simple_name() || !is_java_identifier(stem) {
                continue;
            }
            let target = format!("{}{stem}", class.package());
            if graph.contains(&target) {
                continue;
            }
            claims.entry(target).or_default().push(class.name.clone());
        }
        claims
            .into_iter()
            .filter_map(|(target, claimants)| match claimants.as_slice() {
                [only] => Some((only.clone(), target)),
                _ => None,
            })
            .collect()
    }
}

fn lower_camel(simple: &str) -> String {
    let mut chars = simple.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl InferenceEngine for SourceHintEngine {
    fn version(&self) -> &str {
        &self.version
    }

    fn run_all(&self, graph: &ClassGraph, renames: &mut RenameSet, out: &mut dyn Write) -> io::Result<()> {
        let classes = Self::propose_classes(graph);
        for (from, to) in &classes {
            writeln!(out, "CLASS\t{from}\t{to}")?;
            renames.rename_class(from.as_str(), to.as_str());
        }

        let mut fields: Vec<(String, String, String, String)> = Vec::new();
        for class in graph.iter() {
            let mut by_type: HashMap<&str, usize> = HashMap::new();
            for field in &class.fields {
                *by_type.entry(field.desc.as_str()).or_default() += 1;
            }
            let existing: Vec<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
            for field in &class.fields {
                if !looks_obfuscated(&field.name) || by_type.get(field.desc.as_str()) != Some(&1) {
                    continue;
                }
                let Some(ty) = object_type(&field.desc) else { continue };
                if !graph.contains(ty) {
                    continue;
                }
                let ty_name = renames.map_class(ty).unwrap_or_else(|| ty.to_string());
                let simple = ty_name.rsplit(['/', '$']).next().unwrap_or_default();
                let target = lower_camel(simple);
                if is_placeholder_name(simple)
                    || !is_java_identifier(&target)
                    || existing.contains(&target.as_str())
                {
                    continue;
                }
                fields.push((class.name.clone(), field.desc.clone(), field.name.clone(), target));
            }
        }
        fields.sort();
        for (owner, desc, from, to) in &fields {
            writeln!(out, "FIELD\t{owner}\t{desc}\t{from}\t{to}")?;
            renames.rename_field(owner, from, desc, to.as_str());
        }
        debug!(
            "Engine {} proposed {} class and {} field names",
            self.version,
            classes.len(),
            fields.len()
        );
        Ok(())
    }
}
