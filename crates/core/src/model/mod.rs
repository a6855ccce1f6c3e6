//! In-memory class graph shared by every pipeline stage.
//!
//! The graph is an arena of [`ClassRecord`]s addressed by internal name. The
//! name index is a cache: a stage that renames a record in place leaves it
//! stale until [`ClassGraph::invalidate_name_caches`] is called, and lookups
//! through a stale entry return `None` rather than the wrong class.

mod remap;

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classfile::{descriptor, ClassRecord, InnerClassRecord};

pub use remap::RenameSet;

/// Reference to a field or method by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MemberRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into(), desc: desc.into() }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.desc)
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Duplicate class in graph: {0}")]
    DuplicateClass(String),
    #[error("Class not found in graph: {0}")]
    MissingClass(String),
    #[error("Failed to rewrite class {class}: {source}")]
    Rewrite {
        class: String,
        #[source]
        source: crate::classfile::ClassFormatError,
    },
}

/// All classes of one binary, owned by a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct ClassGraph {
    classes: Vec<ClassRecord>,
    index: HashMap<String, usize>,
}

impl ClassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph, rejecting duplicate names.
    pub fn from_records(records: impl IntoIterator<Item = ClassRecord>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for record in records {
            graph.insert(record)?;
        }
        Ok(graph)
    }

    pub fn insert(&mut self, record: ClassRecord) -> Result<(), GraphError> {
        if self.index.contains_key(&record.name) {
            return Err(GraphError::DuplicateClass(record.name));
        }
        self.index.insert(record.name.clone(), self.classes.len());
        self.classes.push(record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassRecord> {
        let slot = *self.index.get(name)?;
        self.classes.get(slot).filter(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassRecord> {
        let slot = *self.index.get(name)?;
        self.classes.get_mut(slot).filter(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Records in arena (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassRecord> {
        self.classes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClassRecord> {
        self.classes.iter_mut()
    }

    /// Current record names in lexicographic order.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    /// Consume the graph, yielding records in arena order.
    pub fn into_records(self) -> Vec<ClassRecord> {
        self.classes
    }

    /// Rebuild the name index from the records' current names.
    pub fn invalidate_name_caches(&mut self) -> Result<(), GraphError> {
        let mut index = HashMap::with_capacity(self.classes.len());
        for (slot, class) in self.classes.iter().enumerate() {
            if index.insert(class.name.clone(), slot).is_some() {
                return Err(GraphError::DuplicateClass(class.name.clone()));
            }
        }
        self.index = index;
        Ok(())
    }

    /// Direct supertypes (superclass first, then interfaces) of `name`.
    pub fn supertypes(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(class) => class.super_name.iter().chain(class.interfaces.iter()).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Make inner-class records consistent across the graph: every nested
    /// class and its declaring class both carry the record describing the
    /// nesting, taken from the nested class when it declares one.
    pub fn apply_inner_classes(&mut self) {
        let mut canonical: HashMap<String, InnerClassRecord> = HashMap::new();
        for class in &self.classes {
            for icn in &class.inner_classes {
                if icn.name == class.name || !canonical.contains_key(&icn.name) {
                    canonical.insert(icn.name.clone(), icn.clone());
                }
            }
        }

        let mut wanted: HashMap<String, Vec<InnerClassRecord>> = HashMap::new();
        let mut names: Vec<&String> = canonical.keys().collect();
        names.sort();
        for name in names {
            let icn = &canonical[name];
            if !self.contains(&icn.name) {
                continue;
            }
            wanted.entry(icn.name.clone()).or_default().push(icn.clone());
            if let Some(outer) = &icn.outer_name {
                if self.contains(outer) {
                    wanted.entry(outer.clone()).or_default().push(icn.clone());
                }
            }
        }

        let mut added = 0usize;
        for class in &mut self.classes {
            for icn in &mut class.inner_classes {
                if let Some(fixed) = canonical.get(&icn.name) {
                    if icn != fixed {
                        *icn = fixed.clone();
                    }
                }
            }
            let Some(records) = wanted.get(&class.name) else { continue };
            let present: HashSet<String> =
                class.inner_classes.iter().map(|icn| icn.name.clone()).collect();
            for record in records {
                if !present.contains(&record.name) {
                    class.inner_classes.push(record.clone());
                    added += 1;
                }
            }
        }
        debug!("Applied inner class metadata ({added} records added)");
    }

    /// Clear `flag` from the access bits of every inner-class record.
    pub fn clear_inner_class_flag(&mut self, flag: u16) {
        for class in &mut self.classes {
            for icn in &mut class.inner_classes {
                icn.access &= !flag;
            }
        }
    }

    /// Fold inferred generic return types into methods lacking a signature.
    ///
    /// A method `m()Ljava/util/List;` with the guess `foo/Bar` receives the
    /// signature `()Ljava/util/List<Lfoo/Bar;>;`. Methods that already carry a
    /// signature, or whose return type is not a class type, are left alone.
    /// Returns how many signatures were added.
    pub fn add_signatures(&mut self, guesses: &HashMap<MemberRef, String>) -> usize {
        if guesses.is_empty() {
            return 0;
        }
        let mut added = 0;
        for class in &mut self.classes {
            for method in &mut class.methods {
                if method.signature.is_some() {
                    continue;
                }
                let key = MemberRef::new(class.name.as_str(), method.name.as_str(), method.desc.as_str());
                let Some(element) = guesses.get(&key) else { continue };
                if descriptor::return_type(&method.desc).and_then(descriptor::object_type).is_none() {
                    debug!("Skipping signature guess for {key}: return type is not a class");
                    continue;
                }
                let desc = &method.desc;
                method.signature = Some(format!("{}<L{};>;", &desc[..desc.len() - 1], element));
                added += 1;
            }
        }
        added
    }
}
