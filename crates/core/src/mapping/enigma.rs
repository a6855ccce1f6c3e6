//! Enigma mappings, as a single file or as a directory tree of
//! `*.mapping` files (one per top-level class).
//!
//! Enigma has no namespace header; readers report `source` -> `target`.

use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;

use walkdir::WalkDir;

use crate::mapping::store::ClassEntry;
use crate::mapping::{ElementKind, MappingError, MappingStore, MappingVisitor};

pub const SOURCE_NAMESPACE: &str = "source";
pub const TARGET_NAMESPACE: &str = "target";

fn namespaces(visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
    visitor.visit_namespaces(SOURCE_NAMESPACE, &[TARGET_NAMESPACE.to_string()])
}

/// Parse one Enigma file.
pub fn read(content: &str, origin: &str, visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
    namespaces(visitor)?;
    read_body(content, origin, visitor)?;
    visitor.visit_end()
}

/// Parse every `*.mapping` file below `dir`, in path order, as one visit.
pub fn read_dir(dir: &Path, visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
    namespaces(visitor)?;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| MappingError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("mapping") {
            continue;
        }
        let content = fs::read_to_string(path)
            .map_err(|source| MappingError::Io { path: path.to_path_buf(), source })?;
        read_body(&content, &path.display().to_string(), visitor)?;
    }
    visitor.visit_end()
}

struct OpenClass {
    src: String,
    /// Target name children are nested under (explicit or inherited).
    dst: String,
}

struct PendingComment {
    kind: ElementKind,
    class: String,
    lines: Vec<String>,
}

fn read_body(content: &str, origin: &str, visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
    let mut classes: Vec<OpenClass> = Vec::new();
    let mut elements: Vec<ElementKind> = Vec::new();
    let mut visited_class: Option<String> = None;
    let mut comment: Option<PendingComment> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');
        let depth = line.bytes().take_while(|b| *b == b'\t').count();
        let body = &line[depth..];
        if body.trim().is_empty() || body.starts_with('#') {
            continue;
        }

        if let Some(text) = body.strip_prefix("COMMENT") {
            if depth == 0 || depth > elements.len() {
                return Err(MappingError::parse(origin, line_no, "comment without element"));
            }
            let text = text.strip_prefix(' ').unwrap_or(text).to_string();
            match comment.as_mut() {
                Some(pending) => pending.lines.push(text),
                None => {
                    let class = classes.get(depth - 1).map(|c| c.src.clone()).unwrap_or_default();
                    comment = Some(PendingComment { kind: elements[depth - 1], class, lines: vec![text] });
                }
            }
            continue;
        }
        flush_comment(&mut comment, &mut visited_class, visitor)?;

        let tokens: Vec<&str> = body.split(' ').filter(|t| !t.is_empty() && !t.starts_with("ACC:")).collect();
        match tokens.as_slice() {
            ["CLASS", src, rest @ ..] => {
                if depth > classes.len() {
                    return Err(MappingError::parse(origin, line_no, "class nested too deeply"));
                }
                classes.truncate(depth);
                elements.truncate(depth);
                let (full_src, inherited) = match classes.last() {
                    Some(parent) => (format!("{}${src}", parent.src), format!("{}${src}", parent.dst)),
                    None => (src.to_string(), src.to_string()),
                };
                let explicit = rest.first().map(|dst| match classes.last() {
                    Some(parent) => format!("{}${dst}", parent.dst),
                    None => dst.to_string(),
                });
                visitor.visit_class(&full_src)?;
                if let Some(dst) = &explicit {
                    visitor.visit_dst_name(ElementKind::Class, 0, dst)?;
                }
                visited_class = Some(full_src.clone());
                classes.push(OpenClass { src: full_src, dst: explicit.unwrap_or(inherited) });
                elements.push(ElementKind::Class);
            }
            [kind @ ("FIELD" | "METHOD"), rest @ ..] => {
                if depth == 0 || depth > classes.len() {
                    return Err(MappingError::parse(origin, line_no, "member outside a class"));
                }
                classes.truncate(depth);
                elements.truncate(depth);
                let (src, dst, desc) = match rest {
                    [src, desc] => (*src, None, Some(*desc)),
                    [src, dst, desc] => (*src, Some(*dst), Some(*desc)),
                    [src] => (*src, None, None),
                    _ => return Err(MappingError::parse(origin, line_no, format!("malformed {kind} line"))),
                };
                let owner = &classes[depth - 1].src;
                if visited_class.as_deref() != Some(owner.as_str()) {
                    visitor.visit_class(owner)?;
                    visited_class = Some(owner.clone());
                }
                let element = if *kind == "FIELD" {
                    visitor.visit_field(src, desc)?;
                    ElementKind::Field
                } else {
                    visitor.visit_method(src, desc)?;
                    ElementKind::Method
                };
                if let Some(dst) = dst {
                    visitor.visit_dst_name(element, 0, dst)?;
                }
                elements.push(element);
            }
            ["ARG", index, rest @ ..] => {
                if depth == 0 || elements.get(depth - 1) != Some(&ElementKind::Method) {
                    return Err(MappingError::parse(origin, line_no, "argument outside a method"));
                }
                elements.truncate(depth);
                let index: u16 = index
                    .parse()
                    .map_err(|_| MappingError::parse(origin, line_no, format!("bad argument index '{index}'")))?;
                visitor.visit_method_arg(index, None)?;
                if let Some(name) = rest.first() {
                    visitor.visit_dst_name(ElementKind::MethodArg, 0, name)?;
                }
                elements.push(ElementKind::MethodArg);
            }
            _ => return Err(MappingError::parse(origin, line_no, format!("unrecognized line '{body}'"))),
        }
    }
    flush_comment(&mut comment, &mut visited_class, visitor)
}

fn flush_comment(
    comment: &mut Option<PendingComment>,
    visited_class: &mut Option<String>,
    visitor: &mut dyn MappingVisitor,
) -> Result<(), MappingError> {
    let Some(pending) = comment.take() else { return Ok(()) };
    if pending.kind == ElementKind::Class && visited_class.as_deref() != Some(pending.class.as_str()) {
        visitor.visit_class(&pending.class)?;
        *visited_class = Some(pending.class.clone());
    }
    visitor.visit_comment(pending.kind, &pending.lines.join("\n"))
}

/// Collects a visit and writes it as one Enigma file at `visit_end`.
pub struct EnigmaWriter<W: Write> {
    out: W,
    store: MappingStore,
}

impl<W: Write> EnigmaWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, store: MappingStore::new() }
    }
}

impl<W: Write> MappingVisitor for EnigmaWriter<W> {
    fn visit_namespaces(&mut self, src: &str, dst: &[String]) -> Result<(), MappingError> {
        self.store.visit_namespaces(src, dst)
    }

    fn visit_class(&mut self, src_name: &str) -> Result<bool, MappingError> {
        self.store.visit_class(src_name)
    }

    fn visit_field(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.store.visit_field(src_name, src_desc)
    }

    fn visit_method(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.store.visit_method(src_name, src_desc)
    }

    fn visit_method_arg(&mut self, lv_index: u16, src_name: Option<&str>) -> Result<bool, MappingError> {
        self.store.visit_method_arg(lv_index, src_name)
    }

    fn visit_dst_name(&mut self, kind: ElementKind, namespace: usize, name: &str) -> Result<(), MappingError> {
        self.store.visit_dst_name(kind, namespace, name)
    }

    fn visit_comment(&mut self, kind: ElementKind, comment: &str) -> Result<(), MappingError> {
        self.store.visit_comment(kind, comment)
    }

    fn visit_end(&mut self) -> Result<(), MappingError> {
        self.store.visit_end()?;
        let mut text = String::new();
        for name in top_level_classes(&self.store) {
            render_class(&self.store, &name, 0, None, &mut text);
        }
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Write `store` as a directory of Enigma files, one per top-level class,
/// named after the class' target name.
pub fn write_dir(store: &MappingStore, dir: &Path) -> Result<(), MappingError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| MappingError::Io { path, source }
    };
    fs::create_dir_all(dir).map_err(io(dir))?;
    for name in top_level_classes(store) {
        let target = store.class_dst(&name, 0).unwrap_or(&name).to_string();
        let path = dir.join(format!("{target}.mapping"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io(parent))?;
        }
        let mut text = String::new();
        render_class(store, &name, 0, None, &mut text);
        fs::write(&path, text).map_err(io(&path))?;
    }
    Ok(())
}

/// Outer class a nested class is written under, if the store has it.
fn enclosing(store: &MappingStore, name: &str) -> Option<String> {
    let idx = name.rfind('$')?;
    let outer = &name[..idx];
    (idx + 1 < name.len() && store.class(outer).is_some()).then(|| outer.to_string())
}

fn top_level_classes(store: &MappingStore) -> Vec<String> {
    store.classes().keys().filter(|name| enclosing(store, name).is_none()).cloned().collect()
}

fn render_class(store: &MappingStore, name: &str, depth: usize, parent: Option<(&str, &str)>, out: &mut String) {
    let Some(class) = store.class(name) else { return };
    let indent = "\t".repeat(depth);
    let explicit = store.class_dst(name, 0);
    let (src_token, dst_token, effective) = match parent {
        Some((parent_src, parent_dst)) => {
            let simple = &name[parent_src.len() + 1..];
            let dst_token = explicit.map(|dst| {
                dst.strip_prefix(parent_dst)
                    .and_then(|rest| rest.strip_prefix('$'))
                    .unwrap_or_else(|| dst.rsplit(['$', '/']).next().unwrap_or(dst))
                    .to_string()
            });
            let effective = explicit.map(str::to_string).unwrap_or_else(|| format!("{parent_dst}${simple}"));
            (simple.to_string(), dst_token, effective)
        }
        None => (name.to_string(), explicit.map(str::to_string), explicit.unwrap_or(name).to_string()),
    };

    let _ = write!(out, "{indent}CLASS {src_token}");
    if let Some(dst) = &dst_token {
        let _ = write!(out, " {dst}");
    }
    out.push('\n');
    render_comment(class.comment.as_deref(), depth + 1, out);
    render_members(class, depth + 1, out);

    let nested: Vec<&String> = store
        .classes()
        .keys()
        .filter(|candidate| enclosing(store, candidate).as_deref() == Some(name))
        .collect();
    for inner in nested {
        render_class(store, inner, depth + 1, Some((name, effective.as_str())), out);
    }
}

fn render_members(class: &ClassEntry, depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    for (tag, members) in [("FIELD", &class.fields), ("METHOD", &class.methods)] {
        for (key, member) in members {
            let dst = member.dst_names.first().and_then(|n| n.as_deref());
            if dst.is_none() && member.comment.is_none() && member.args.is_empty() {
                continue;
            }
            let _ = write!(out, "{indent}{tag} {}", key.name);
            if let Some(dst) = dst {
                let _ = write!(out, " {dst}");
            }
            if let Some(desc) = &key.desc {
                let _ = write!(out, " {desc}");
            }
            out.push('\n');
            render_comment(member.comment.as_deref(), depth + 1, out);
            for (index, arg) in &member.args {
                let Some(name) = arg.dst_names.first().and_then(|n| n.as_deref()) else { continue };
                let _ = writeln!(out, "{indent}\tARG {index} {name}");
                render_comment(arg.comment.as_deref(), depth + 2, out);
            }
        }
    }
}

fn render_comment(comment: Option<&str>, depth: usize, out: &mut String) {
    let Some(comment) = comment else { return };
    let indent = "\t".repeat(depth);
    for line in comment.split('\n') {
        let _ = writeln!(out, "{indent}COMMENT {line}");
    }
}
