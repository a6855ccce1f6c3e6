//! Mutable, visitable mapping tree.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::classfile::descriptor::remap_descriptor;
use crate::mapping::{ElementKind, MappingError, MappingVisitor};
use crate::model::RenameSet;

/// Member key in the source namespace. Descriptors are optional because
/// some formats (Enigma fields, older Tiny variants) may omit them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberKey {
    pub name: String,
    pub desc: Option<String>,
}

impl MemberKey {
    pub fn new(name: impl Into<String>, desc: Option<&str>) -> Self {
        Self { name: name.into(), desc: desc.map(str::to_string) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgEntry {
    pub src_name: Option<String>,
    pub dst_names: Vec<Option<String>>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberEntry {
    pub dst_names: Vec<Option<String>>,
    pub comment: Option<String>,
    pub args: BTreeMap<u16, ArgEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassEntry {
    pub dst_names: Vec<Option<String>>,
    pub comment: Option<String>,
    pub fields: BTreeMap<MemberKey, MemberEntry>,
    pub methods: BTreeMap<MemberKey, MemberEntry>,
}

fn set_dst(names: &mut Vec<Option<String>>, namespace: usize, name: &str) {
    if names.len() <= namespace {
        names.resize(namespace + 1, None);
    }
    names[namespace] = Some(name.to_string());
}

fn dst(names: &[Option<String>], namespace: usize) -> Option<&str> {
    names.get(namespace).and_then(|n| n.as_deref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Field,
    Method,
}

/// Per-visit translation state, reset by `visit_end`.
#[derive(Debug, Default)]
struct VisitState {
    /// Incoming destination namespace index to store destination index.
    ns_map: Vec<Option<usize>>,
    /// Store destination namespace the incoming source names live in.
    chain: Option<usize>,
    /// Chain namespace class name to store source name.
    chain_classes: HashMap<String, String>,
    class: Option<String>,
    member: Option<(MemberKind, MemberKey)>,
    arg: Option<u16>,
}

/// Namespace-to-identifier mappings for classes, fields, methods and
/// method arguments.
///
/// Visiting merges into the store: namespaces are additive and for a given
/// element and namespace the last name visited wins. Exporting through
/// [`MappingStore::accept`] visits classes and members in lexicographic
/// order.
#[derive(Debug, Default)]
pub struct MappingStore {
    src_namespace: Option<String>,
    dst_namespaces: Vec<String>,
    classes: BTreeMap<String, ClassEntry>,
    visit: VisitState,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `renames` as `src` to `dst` mappings.
    pub fn from_renames(renames: &RenameSet, src: &str, dst: &str) -> Self {
        let mut store = Self {
            src_namespace: Some(src.to_string()),
            dst_namespaces: vec![dst.to_string()],
            ..Self::default()
        };
        for (from, to) in renames.classes() {
            set_dst(&mut store.classes.entry(from.clone()).or_default().dst_names, 0, to);
        }
        for (member, to) in renames.fields() {
            let class = store.classes.entry(member.owner.clone()).or_default();
            let entry = class.fields.entry(MemberKey::new(member.name.as_str(), Some(&member.desc))).or_default();
            set_dst(&mut entry.dst_names, 0, to);
        }
        for (member, to) in renames.methods() {
            let class = store.classes.entry(member.owner.clone()).or_default();
            let entry = class.methods.entry(MemberKey::new(member.name.as_str(), Some(&member.desc))).or_default();
            set_dst(&mut entry.dst_names, 0, to);
        }
        store
    }

    pub fn src_namespace(&self) -> Option<&str> {
        self.src_namespace.as_deref()
    }

    pub fn dst_namespaces(&self) -> &[String] {
        &self.dst_namespaces
    }

    pub fn namespace_index(&self, namespace: &str) -> Option<usize> {
        self.dst_namespaces.iter().position(|n| n == namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &BTreeMap<String, ClassEntry> {
        &self.classes
    }

    pub fn class(&self, src_name: &str) -> Option<&ClassEntry> {
        self.classes.get(src_name)
    }

    pub fn class_dst(&self, src_name: &str, namespace: usize) -> Option<&str> {
        dst(&self.classes.get(src_name)?.dst_names, namespace)
    }

    pub fn field_dst(&self, owner: &str, name: &str, desc: Option<&str>, namespace: usize) -> Option<&str> {
        let entry = self.classes.get(owner)?.fields.get(&MemberKey::new(name, desc))?;
        dst(&entry.dst_names, namespace)
    }

    pub fn method_dst(&self, owner: &str, name: &str, desc: &str, namespace: usize) -> Option<&str> {
        let entry = self.classes.get(owner)?.methods.get(&MemberKey::new(name, Some(desc)))?;
        dst(&entry.dst_names, namespace)
    }

    /// Export the whole store to `visitor` in canonical order.
    pub fn accept(&self, visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
        let src = self.src_namespace.as_deref().unwrap_or("source");
        visitor.visit_namespaces(src, &self.dst_namespaces)?;
        for (name, class) in &self.classes {
            if !visitor.visit_class(name)? {
                continue;
            }
            emit_names(visitor, ElementKind::Class, &class.dst_names, class.comment.as_deref())?;
            for (key, field) in &class.fields {
                if visitor.visit_field(&key.name, key.desc.as_deref())? {
                    emit_names(visitor, ElementKind::Field, &field.dst_names, field.comment.as_deref())?;
                }
            }
            for (key, method) in &class.methods {
                if !visitor.visit_method(&key.name, key.desc.as_deref())? {
                    continue;
                }
                emit_names(visitor, ElementKind::Method, &method.dst_names, method.comment.as_deref())?;
                for (index, arg) in &method.args {
                    if visitor.visit_method_arg(*index, arg.src_name.as_deref())? {
                        emit_names(visitor, ElementKind::MethodArg, &arg.dst_names, arg.comment.as_deref())?;
                    }
                }
            }
        }
        visitor.visit_end()
    }

    fn current_class(&mut self) -> Result<&mut ClassEntry, MappingError> {
        let name = self
            .visit
            .class
            .as_ref()
            .ok_or_else(|| MappingError::Visitor("member visited before any class".to_string()))?;
        Ok(self.classes.entry(name.clone()).or_default())
    }

    fn current_member(&mut self) -> Result<&mut MemberEntry, MappingError> {
        let (kind, key) = self
            .visit
            .member
            .clone()
            .ok_or_else(|| MappingError::Visitor("member content outside a member".to_string()))?;
        let class = self.current_class()?;
        let members = match kind {
            MemberKind::Field => &mut class.fields,
            MemberKind::Method => &mut class.methods,
        };
        Ok(members.entry(key).or_default())
    }

    fn current_arg(&mut self) -> Result<&mut ArgEntry, MappingError> {
        let index = self
            .visit
            .arg
            .ok_or_else(|| MappingError::Visitor("argument content outside an argument".to_string()))?;
        Ok(self.current_member()?.args.entry(index).or_default())
    }

    /// Translate a chain namespace class name back into the source namespace.
    fn chain_class(&self, name: &str) -> String {
        self.visit.chain_classes.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    /// Resolve a member visited in the chain namespace to its source key.
    fn chain_member(&self, kind: MemberKind, name: &str, desc: Option<&str>, chain: usize) -> MemberKey {
        let src_desc = desc.map(|d| remap_descriptor(d, &|c| self.visit.chain_classes.get(c).cloned()));
        let Some(class) = self.visit.class.as_ref().and_then(|c| self.classes.get(c)) else {
            return MemberKey { name: name.to_string(), desc: src_desc };
        };
        let members = match kind {
            MemberKind::Field => &class.fields,
            MemberKind::Method => &class.methods,
        };
        let found = members.iter().find(|(key, entry)| {
            let chain_name = dst(&entry.dst_names, chain).unwrap_or(&key.name);
            chain_name == name && (src_desc.is_none() || key.desc.is_none() || key.desc == src_desc)
        });
        match found {
            Some((key, _)) => key.clone(),
            None => MemberKey { name: name.to_string(), desc: src_desc },
        }
    }

    fn enter_member(&mut self, kind: MemberKind, name: &str, desc: Option<&str>) -> Result<bool, MappingError> {
        if self.visit.class.is_none() {
            return Err(MappingError::Visitor(format!("member {name} visited before any class")));
        }
        let key = match self.visit.chain {
            Some(chain) => self.chain_member(kind, name, desc, chain),
            None => MemberKey::new(name, desc),
        };
        let class = self.current_class()?;
        let members = match kind {
            MemberKind::Field => &mut class.fields,
            MemberKind::Method => &mut class.methods,
        };
        members.entry(key.clone()).or_default();
        self.visit.member = Some((kind, key));
        self.visit.arg = None;
        Ok(true)
    }
}

fn emit_names(
    visitor: &mut dyn MappingVisitor,
    kind: ElementKind,
    names: &[Option<String>],
    comment: Option<&str>,
) -> Result<(), MappingError> {
    for (namespace, name) in names.iter().enumerate() {
        if let Some(name) = name {
            visitor.visit_dst_name(kind, namespace, name)?;
        }
    }
    if let Some(comment) = comment {
        visitor.visit_comment(kind, comment)?;
    }
    Ok(())
}

impl MappingVisitor for MappingStore {
    fn visit_namespaces(&mut self, src: &str, dst_namespaces: &[String]) -> Result<(), MappingError> {
        self.visit = VisitState::default();
        let store_src = match &self.src_namespace {
            Some(existing) => existing.clone(),
            None => {
                self.src_namespace = Some(src.to_string());
                src.to_string()
            }
        };

        if src != store_src {
            let Some(chain) = self.namespace_index(src) else {
                return Err(MappingError::NamespaceMismatch(format!(
                    "incoming source namespace '{src}' is neither '{store_src}' nor one of {:?}",
                    self.dst_namespaces
                )));
            };
            debug!("Following rename chain {store_src} -> {src}");
            self.visit.chain = Some(chain);
            for (name, class) in &self.classes {
                let chain_name = dst(&class.dst_names, chain).unwrap_or(name);
                self.visit.chain_classes.insert(chain_name.to_string(), name.clone());
            }
        }

        for namespace in dst_namespaces {
            if *namespace == store_src {
                self.visit.ns_map.push(None);
                continue;
            }
            let index = match self.namespace_index(namespace) {
                Some(index) => index,
                None => {
                    self.dst_namespaces.push(namespace.clone());
                    self.dst_namespaces.len() - 1
                }
            };
            self.visit.ns_map.push(Some(index));
        }
        Ok(())
    }

    fn visit_class(&mut self, src_name: &str) -> Result<bool, MappingError> {
        let name = match self.visit.chain {
            Some(_) => self.chain_class(src_name),
            None => src_name.to_string(),
        };
        self.classes.entry(name.clone()).or_default();
        self.visit.class = Some(name);
        self.visit.member = None;
        self.visit.arg = None;
        Ok(true)
    }

    fn visit_field(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.enter_member(MemberKind::Field, src_name, src_desc)
    }

    fn visit_method(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.enter_member(MemberKind::Method, src_name, src_desc)
    }

    fn visit_method_arg(&mut self, lv_index: u16, src_name: Option<&str>) -> Result<bool, MappingError> {
        if !matches!(self.visit.member, Some((MemberKind::Method, _))) {
            return Err(MappingError::Visitor(format!("argument {lv_index} visited outside a method")));
        }
        self.visit.arg = Some(lv_index);
        let chained = self.visit.chain.is_some();
        let arg = self.current_arg()?;
        if let Some(name) = src_name {
            if !chained || arg.src_name.is_none() {
                arg.src_name = Some(name.to_string());
            }
        }
        Ok(true)
    }

    fn visit_dst_name(&mut self, kind: ElementKind, namespace: usize, name: &str) -> Result<(), MappingError> {
        let Some(Some(target)) = self.visit.ns_map.get(namespace).copied() else {
            return Ok(());
        };
        let names = match kind {
            ElementKind::Class => &mut self.current_class()?.dst_names,
            ElementKind::Field | ElementKind::Method => &mut self.current_member()?.dst_names,
            ElementKind::MethodArg => &mut self.current_arg()?.dst_names,
        };
        set_dst(names, target, name);
        Ok(())
    }

    fn visit_comment(&mut self, kind: ElementKind, comment: &str) -> Result<(), MappingError> {
        let slot = match kind {
            ElementKind::Class => &mut self.current_class()?.comment,
            ElementKind::Field | ElementKind::Method => &mut self.current_member()?.comment,
            ElementKind::MethodArg => &mut self.current_arg()?.comment,
        };
        *slot = Some(comment.to_string());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), MappingError> {
        self.visit = VisitState::default();
        Ok(())
    }
}
