//! ProGuard (R8) mapping files.
//!
//! The left-hand side of every `->` is read as the `source` namespace and the
//! right-hand side as `target`. Line number ranges are ignored, and inlined
//! frames (qualified method names) carry no mapping of their own.

use std::fmt::Write as _;
use std::io::Write;

use crate::classfile::descriptor::{descriptor_to_java, java_to_descriptor, method_params, return_type};
use crate::mapping::enigma::{SOURCE_NAMESPACE, TARGET_NAMESPACE};
use crate::mapping::{ElementKind, MappingError, MappingStore, MappingVisitor};

fn internal(java_name: &str) -> String {
    java_name.replace('.', "/")
}

fn strip_line_numbers(text: &str) -> &str {
    let mut rest = text;
    // Leading `start:end:`
    loop {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && rest[digits..].starts_with(':') {
            rest = &rest[digits + 1..];
        } else {
            break;
        }
    }
    rest
}

pub fn read(content: &str, origin: &str, visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
    visitor.visit_namespaces(SOURCE_NAMESPACE, &[TARGET_NAMESPACE.to_string()])?;
    let mut in_class = false;
    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((left, right)) = trimmed.split_once(" -> ") else {
            return Err(MappingError::parse(origin, line_no, format!("expected '->' in '{trimmed}'")));
        };

        if !line.starts_with(char::is_whitespace) {
            let Some(dst) = right.strip_suffix(':') else {
                return Err(MappingError::parse(origin, line_no, "class line must end with ':'"));
            };
            in_class = visitor.visit_class(&internal(left.trim()))?;
            if in_class {
                visitor.visit_dst_name(ElementKind::Class, 0, &internal(dst.trim()))?;
            }
            continue;
        }
        if !in_class {
            continue;
        }

        let dst = right.trim();
        let left = strip_line_numbers(left.trim());
        if let Some(open) = left.find('(') {
            let close = left
                .rfind(')')
                .ok_or_else(|| MappingError::parse(origin, line_no, "unterminated parameter list"))?;
            let Some((ret, name)) = left[..open].trim().rsplit_once(' ') else {
                return Err(MappingError::parse(origin, line_no, "method without return type"));
            };
            if name.contains('.') {
                continue;
            }
            let params: String = left[open + 1..close]
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(java_to_descriptor)
                .collect();
            let desc = format!("({params}){}", java_to_descriptor(ret));
            if visitor.visit_method(name, Some(&desc))? {
                visitor.visit_dst_name(ElementKind::Method, 0, dst)?;
            }
        } else {
            let Some((ty, name)) = left.rsplit_once(' ') else {
                return Err(MappingError::parse(origin, line_no, "field without type"));
            };
            let desc = java_to_descriptor(ty);
            if visitor.visit_field(name.trim(), Some(&desc))? {
                visitor.visit_dst_name(ElementKind::Field, 0, dst)?;
            }
        }
    }
    visitor.visit_end()
}

/// Collects a visit and writes it as a ProGuard file at `visit_end`.
///
/// Only the first destination namespace is written. Members without a
/// destination name and arguments are omitted.
pub struct ProguardWriter<W: Write> {
    out: W,
    store: MappingStore,
}

impl<W: Write> ProguardWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, store: MappingStore::new() }
    }

    fn render(&self) -> String {
        let mut text = String::new();
        for (name, class) in self.store.classes() {
            let dst = self.store.class_dst(name, 0).unwrap_or(name);
            let _ = writeln!(text, "{} -> {}:", name.replace('/', "."), dst.replace('/', "."));
            for (key, field) in &class.fields {
                let (Some(desc), Some(Some(dst))) = (&key.desc, field.dst_names.first()) else { continue };
                let Some(ty) = descriptor_to_java(desc) else { continue };
                let _ = writeln!(text, "    {ty} {} -> {dst}", key.name);
            }
            for (key, method) in &class.methods {
                let (Some(desc), Some(Some(dst))) = (&key.desc, method.dst_names.first()) else { continue };
                let Some(params) = method_params(desc) else { continue };
                let Some(ret) = return_type(desc).and_then(descriptor_to_java) else { continue };
                let params: Option<Vec<String>> = params.iter().map(|p| descriptor_to_java(p)).collect();
                let Some(params) = params else { continue };
                let _ = writeln!(text, "    {ret} {}({}) -> {dst}", key.name, params.join(","));
            }
        }
        text
    }
}

impl<W: Write> MappingVisitor for ProguardWriter<W> {
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

    fn visit_dst_name(&mut self, kind: ElementKind, namespace: usize, name: &str) -> Result<(), MappingError> {
        if kind == ElementKind::MethodArg {
            return Ok(());
        }
        self.store.visit_dst_name(kind, namespace, name)
    }

    fn visit_end(&mut self) -> Result<(), MappingError> {
        self.store.visit_end()?;
        let text = self.render();
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}
