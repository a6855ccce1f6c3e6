use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use log::debug;

use crate::classfile::descriptor::{remap_class_ref, remap_descriptor, remap_signature};
use crate::classfile::{Constant, ConstantPool, RefKind};
use crate::model::{ClassGraph, GraphError, MemberRef};

/// Class, field and method renames collected before being applied to a graph.
///
/// Keys use the names the graph has *before* the renames are applied. Member
/// keys name the declaring class; references through subclasses are resolved
/// against the hierarchy when applying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameSet {
    classes: BTreeMap<String, String>,
    fields: BTreeMap<MemberRef, String>,
    methods: BTreeMap<MemberRef, String>,
}

impl RenameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename_class(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.classes.insert(from.into(), to.into());
    }

    pub fn rename_field(&mut self, owner: &str, name: &str, desc: &str, to: impl Into<String>) {
        self.fields.insert(MemberRef::new(owner, name, desc), to.into());
    }

    pub fn rename_method(&mut self, owner: &str, name: &str, desc: &str, to: impl Into<String>) {
        self.methods.insert(MemberRef::new(owner, name, desc), to.into());
    }

    pub fn class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }

    pub fn field(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.fields.get(&MemberRef::new(owner, name, desc)).map(String::as_str)
    }

    pub fn method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.methods.get(&MemberRef::new(owner, name, desc)).map(String::as_str)
    }

    pub fn classes(&self) -> &BTreeMap<String, String> {
        &self.classes
    }

    pub fn fields(&self) -> &BTreeMap<MemberRef, String> {
        &self.fields
    }

    pub fn methods(&self) -> &BTreeMap<MemberRef, String> {
        &self.methods
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len() + self.fields.len() + self.methods.len()
    }

    /// Target name of a class. A nested class without its own entry follows
    /// its closest renamed enclosing class (`a$1` becomes `Foo$1` when `a`
    /// becomes `Foo`).
    pub fn map_class(&self, name: &str) -> Option<String> {
        if let Some(to) = self.classes.get(name) {
            return Some(to.clone());
        }
        let mut end = name.len();
        while let Some(idx) = name[..end].rfind('$') {
            if let Some(outer) = self.classes.get(&name[..idx]) {
                return Some(format!("{outer}{}", &name[idx..]));
            }
            end = idx;
        }
        None
    }

    /// Make renamed nested classes keep their enclosing class as name prefix.
    ///
    /// For every nested class whose own or enclosing class' name changes, the
    /// target is forced to `<target of enclosing>$<simple name>`. The added
    /// or corrected entries are recorded in this set and returned, keyed by
    /// the graph's current name.
    pub fn fix_inner_class_names(&mut self, graph: &ClassGraph) -> BTreeMap<String, String> {
        let mut nesting: BTreeMap<String, (String, Option<String>)> = BTreeMap::new();
        for class in graph.iter() {
            for icn in &class.inner_classes {
                if let Some(outer) = &icn.outer_name {
                    nesting
                        .entry(icn.name.clone())
                        .or_insert_with(|| (outer.clone(), icn.inner_name.clone()));
                }
            }
        }
        for name in graph.sorted_names() {
            if nesting.contains_key(&name) {
                continue;
            }
            if let Some(idx) = name.rfind('$') {
                let outer = &name[..idx];
                if graph.contains(outer) && idx + 1 < name.len() {
                    nesting.insert(name.clone(), (outer.to_string(), None));
                }
            }
        }

        let mut fixes = BTreeMap::new();
        for name in graph.sorted_names() {
            let Some((outer, inner_name)) = nesting.get(&name) else { continue };
            let own = self.classes.get(&name).cloned();
            let outer_target = self.map_class(outer);
            if own.is_none() && outer_target.is_none() {
                continue;
            }
            let outer_target = outer_target.unwrap_or_else(|| outer.clone());
            let target = self.map_class(&name).unwrap_or_else(|| name.clone());
            let prefix = format!("{outer_target}$");
            if target.starts_with(&prefix) && target.len() > prefix.len() {
                continue;
            }
            let simple = match own {
                Some(explicit) => explicit.rsplit(['/', '$']).next().unwrap_or_default().to_string(),
                None => inner_name
                    .clone()
                    .unwrap_or_else(|| name.rsplit('$').next().unwrap_or_default().to_string()),
            };
            if simple.is_empty() {
                continue;
            }
            let fixed = format!("{prefix}{simple}");
            self.classes.insert(name.clone(), fixed.clone());
            fixes.insert(name, fixed);
        }

        // Nested classes that only follow their enclosing class get an
        // explicit entry too, so every class that moves is recorded.
        for name in graph.sorted_names() {
            if self.classes.contains_key(&name) {
                continue;
            }
            let Some(target) = self.map_class(&name) else { continue };
            if target != name {
                self.classes.insert(name.clone(), target.clone());
                fixes.insert(name, target);
            }
        }
        fixes
    }
}

/// Supertype edges and declared members captured before any record changes.
struct Hierarchy {
    supertypes: HashMap<String, Vec<String>>,
    fields: HashSet<MemberRef>,
}

impl Hierarchy {
    fn capture(graph: &ClassGraph) -> Self {
        let mut supertypes = HashMap::new();
        let mut fields = HashSet::new();
        for class in graph.iter() {
            supertypes.insert(
                class.name.clone(),
                class.super_name.iter().chain(class.interfaces.iter()).cloned().collect(),
            );
            for field in &class.fields {
                fields.insert(MemberRef::new(class.name.as_str(), field.name.as_str(), field.desc.as_str()));
            }
        }
        Self { supertypes, fields }
    }

    fn walk(&self, start: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(&next) {
                queue.extend(parents.iter().cloned());
            }
            order.push(next);
        }
        order
    }

    fn resolve_field<'r>(&self, renames: &'r RenameSet, owner: &str, name: &str, desc: &str) -> Option<&'r str> {
        for class in self.walk(owner) {
            if let Some(to) = renames.field(&class, name, desc) {
                return Some(to);
            }
            if self.fields.contains(&MemberRef::new(class.as_str(), name, desc)) {
                return None;
            }
        }
        None
    }

    fn resolve_method<'r>(&self, renames: &'r RenameSet, owner: &str, name: &str, desc: &str) -> Option<&'r str> {
        if name.starts_with('<') {
            return None;
        }
        self.walk(owner).into_iter().find_map(|class| renames.method(&class, name, desc))
    }
}

enum PoolPatch {
    ClassName(String),
    Member { name: String, desc: String },
    MethodType(String),
    Dynamic { name: String, desc: String },
}

impl ClassGraph {
    /// Apply `renames` to every record in place and rebuild the name index.
    ///
    /// Rewrites constant pool class entries, member references, method types
    /// and dynamic call site descriptors, then the record-level names,
    /// descriptors, signatures and inner-class records. The simple
    /// `inner_name` of inner-class records is left as is.
    ///
    /// Returns the number of classes whose name changed.
    pub fn apply_renames(&mut self, renames: &RenameSet) -> Result<usize, GraphError> {
        if renames.is_empty() {
            return Ok(0);
        }
        let hierarchy = Hierarchy::capture(self);
        let map = |name: &str| renames.map_class(name);
        let mut renamed_classes = 0;
        let mut stale_inner_names = 0;

        for class in self.iter_mut() {
            let old_name = class.name.clone();
            let patches = collect_pool_patches(class.pool(), renames, &hierarchy, &map);
            apply_pool_patches(class.pool_mut(), patches)
                .map_err(|source| GraphError::Rewrite { class: old_name.clone(), source })?;

            for field in &mut class.fields {
                if let Some(to) = renames.field(&old_name, &field.name, &field.desc) {
                    field.name = to.to_string();
                }
                field.desc = remap_descriptor(&field.desc, &map);
                field.signature = field.signature.as_deref().map(|s| remap_signature(s, &map));
            }
            for method in &mut class.methods {
                if let Some(to) = hierarchy.resolve_method(renames, &old_name, &method.name, &method.desc) {
                    method.name = to.to_string();
                }
                method.desc = remap_descriptor(&method.desc, &map);
                method.signature = method.signature.as_deref().map(|s| remap_signature(s, &map));
            }
            for icn in &mut class.inner_classes {
                let new_name = remap_class_ref(&icn.name, &map);
                if new_name != icn.name && icn.inner_name.is_some() {
                    stale_inner_names += 1;
                }
                icn.name = new_name;
                icn.outer_name = icn.outer_name.as_deref().map(|o| remap_class_ref(o, &map));
            }

            class.name = remap_class_ref(&old_name, &map);
            class.super_name = class.super_name.as_deref().map(|s| remap_class_ref(s, &map));
            for interface in &mut class.interfaces {
                *interface = remap_class_ref(interface, &map);
            }
            class.signature = class.signature.as_deref().map(|s| remap_signature(s, &map));
            if class.name != old_name {
                renamed_classes += 1;
            }
        }

        if stale_inner_names > 0 {
            debug!("{stale_inner_names} inner class records keep their previous simple name");
        }
        self.invalidate_name_caches()?;
        Ok(renamed_classes)
    }
}

fn collect_pool_patches(
    pool: &ConstantPool,
    renames: &RenameSet,
    hierarchy: &Hierarchy,
    map: &dyn Fn(&str) -> Option<String>,
) -> Vec<(u16, PoolPatch)> {
    let mut patches = Vec::new();
    for (index, constant) in pool.iter() {
        match constant {
            Constant::Class(_) => {
                let Ok(name) = pool.class_name(index) else { continue };
                let new_name = remap_class_ref(&name, map);
                if new_name != name {
                    patches.push((index, PoolPatch::ClassName(new_name)));
                }
            }
            Constant::FieldRef { .. } | Constant::MethodRef { .. } | Constant::InterfaceMethodRef { .. } => {
                let Ok((kind, owner, name, desc)) = pool.member_ref(index) else { continue };
                // Array owners (`[I.clone()`) never carry renamable members.
                let resolved = if owner.starts_with('[') {
                    None
                } else if kind == RefKind::Field {
                    hierarchy.resolve_field(renames, &owner, &name, &desc)
                } else {
                    hierarchy.resolve_method(renames, &owner, &name, &desc)
                };
                let new_desc = remap_descriptor(&desc, map);
                if resolved.is_some() || new_desc != desc {
                    let name = resolved.map(str::to_string).unwrap_or(name);
                    patches.push((index, PoolPatch::Member { name, desc: new_desc }));
                }
            }
            Constant::MethodType(desc_index) => {
                let Ok(desc) = pool.utf8(*desc_index) else { continue };
                let new_desc = remap_descriptor(&desc, map);
                if new_desc != desc {
                    patches.push((index, PoolPatch::MethodType(new_desc)));
                }
            }
            Constant::Dynamic { name_and_type, .. } | Constant::InvokeDynamic { name_and_type, .. } => {
                let Ok((name, desc)) = pool.name_and_type(*name_and_type) else { continue };
                let new_desc = remap_descriptor(&desc, map);
                if new_desc != desc {
                    patches.push((index, PoolPatch::Dynamic { name, desc: new_desc }));
                }
            }
            _ => {}
        }
    }
    patches
}

fn apply_pool_patches(
    pool: &mut ConstantPool,
    patches: Vec<(u16, PoolPatch)>,
) -> Result<(), crate::classfile::ClassFormatError> {
    for (index, patch) in patches {
        let Some(current) = pool.get(index).cloned() else { continue };
        let replacement = match (patch, current) {
            (PoolPatch::ClassName(name), Constant::Class(_)) => Constant::Class(pool.intern_utf8(&name)?),
            (PoolPatch::Member { name, desc }, Constant::FieldRef { class, .. }) => {
                Constant::FieldRef { class, name_and_type: pool.intern_name_and_type(&name, &desc)? }
            }
            (PoolPatch::Member { name, desc }, Constant::MethodRef { class, .. }) => {
                Constant::MethodRef { class, name_and_type: pool.intern_name_and_type(&name, &desc)? }
            }
            (PoolPatch::Member { name, desc }, Constant::InterfaceMethodRef { class, .. }) => {
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type: pool.intern_name_and_type(&name, &desc)?,
                }
            }
            (PoolPatch::MethodType(desc), Constant::MethodType(_)) => {
                Constant::MethodType(pool.intern_utf8(&desc)?)
            }
            (PoolPatch::Dynamic { name, desc }, Constant::Dynamic { bootstrap, .. }) => {
                Constant::Dynamic { bootstrap, name_and_type: pool.intern_name_and_type(&name, &desc)? }
            }
            (PoolPatch::Dynamic { name, desc }, Constant::InvokeDynamic { bootstrap, .. }) => {
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type: pool.intern_name_and_type(&name, &desc)?,
                }
            }
            _ => continue,
        };
        pool.set(index, replacement);
    }
    Ok(())
}
