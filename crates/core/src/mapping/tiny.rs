//! Tiny v1 and Tiny v2 mappings.
//!
//! v1: header `v1\t<src>\t<dst>...`, then flat `CLASS`, `FIELD` and `METHOD`
//! lines. v2: header `tiny\t2\t<minor>\t<src>\t<dst>...`, optional indented
//! properties, then a tab-indented tree of `c`, `f`, `m`, `p`, `v` and
//! comment lines.

use std::io::Write;

use crate::mapping::{ElementKind, MappingError, MappingVisitor};

/// Parse Tiny v1 or v2 content, picking the dialect from the header.
pub fn read(content: &str, origin: &str, visitor: &mut dyn MappingVisitor) -> Result<(), MappingError> {
    let mut lines = content.lines().enumerate();
    let Some((_, header)) = lines.next() else {
        return Err(MappingError::parse(origin, 1, "empty file"));
    };
    let header: Vec<&str> = header.trim_end_matches('\r').split('\t').collect();
    match header.as_slice() {
        ["v1", src, dst @ ..] => {
            let dst: Vec<String> = dst.iter().map(|s| s.to_string()).collect();
            visitor.visit_namespaces(src, &dst)?;
            read_v1(lines, dst.len(), origin, visitor)?;
        }
        ["tiny", "2", _, src, dst @ ..] => {
            let dst: Vec<String> = dst.iter().map(|s| s.to_string()).collect();
            visitor.visit_namespaces(src, &dst)?;
            read_v2(lines, dst.len(), origin, visitor)?;
        }
        _ => return Err(MappingError::parse(origin, 1, "not a Tiny v1 or v2 header")),
    }
    visitor.visit_end()
}

fn visit_names(
    visitor: &mut dyn MappingVisitor,
    kind: ElementKind,
    names: &[&str],
    escaped: bool,
) -> Result<(), MappingError> {
    for (namespace, name) in names.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        if escaped {
            visitor.visit_dst_name(kind, namespace, &unescape(name))?;
        } else {
            visitor.visit_dst_name(kind, namespace, name)?;
        }
    }
    Ok(())
}

fn read_v1<'a>(
    lines: impl Iterator<Item = (usize, &'a str)>,
    dst_count: usize,
    origin: &str,
    visitor: &mut dyn MappingVisitor,
) -> Result<(), MappingError> {
    let mut current_class: Option<String> = None;
    for (idx, raw) in lines {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        match parts.as_slice() {
            ["CLASS", src, names @ ..] => {
                if names.len() > dst_count {
                    return Err(MappingError::parse(origin, line_no, "too many names"));
                }
                current_class = Some(src.to_string());
                if visitor.visit_class(src)? {
                    visit_names(visitor, ElementKind::Class, names, false)?;
                }
            }
            [kind @ ("FIELD" | "METHOD"), owner, desc, src, names @ ..] => {
                if names.len() > dst_count {
                    return Err(MappingError::parse(origin, line_no, "too many names"));
                }
                if current_class.as_deref() != Some(*owner) {
                    current_class = Some(owner.to_string());
                    if !visitor.visit_class(owner)? {
                        continue;
                    }
                }
                let element = if *kind == "FIELD" {
                    visitor.visit_field(src, Some(desc))?;
                    ElementKind::Field
                } else {
                    visitor.visit_method(src, Some(desc))?;
                    ElementKind::Method
                };
                visit_names(visitor, element, names, false)?;
            }
            _ => return Err(MappingError::parse(origin, line_no, format!("unrecognized line '{line}'"))),
        }
    }
    Ok(())
}

fn read_v2<'a>(
    lines: impl Iterator<Item = (usize, &'a str)>,
    dst_count: usize,
    origin: &str,
    visitor: &mut dyn MappingVisitor,
) -> Result<(), MappingError> {
    let mut escaped = false;
    let mut seen_class = false;
    // Kind of the element most recently opened at depth 0, 1 and 2.
    let mut open: [Option<ElementKind>; 3] = [None; 3];
    let mut skip_below: Option<usize> = None;

    for (idx, raw) in lines {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let depth = line.bytes().take_while(|b| *b == b'\t').count();
        let parts: Vec<&str> = line[depth..].split('\t').collect();

        if !seen_class && depth == 1 {
            if parts.first() == Some(&"escaped-names") {
                escaped = true;
            }
            continue;
        }
        if let Some(limit) = skip_below {
            if depth > limit {
                continue;
            }
            skip_below = None;
        }
        let too_many = |names: &[&str]| names.len() > dst_count;

        match (depth, parts.as_slice()) {
            (0, ["c", src, names @ ..]) => {
                seen_class = true;
                if too_many(names) {
                    return Err(MappingError::parse(origin, line_no, "too many names"));
                }
                let src = maybe_unescape(src, escaped);
                open = [Some(ElementKind::Class), None, None];
                if visitor.visit_class(&src)? {
                    visit_names(visitor, ElementKind::Class, names, escaped)?;
                } else {
                    skip_below = Some(0);
                }
            }
            (1, [kind @ ("f" | "m"), desc, src, names @ ..]) if open[0].is_some() => {
                if too_many(names) {
                    return Err(MappingError::parse(origin, line_no, "too many names"));
                }
                let src = maybe_unescape(src, escaped);
                let desc = maybe_unescape(desc, escaped);
                let desc = if desc.is_empty() { None } else { Some(desc.as_str()) };
                let (wanted, element) = if *kind == "f" {
                    (visitor.visit_field(&src, desc)?, ElementKind::Field)
                } else {
                    (visitor.visit_method(&src, desc)?, ElementKind::Method)
                };
                open[1] = Some(element);
                open[2] = None;
                if wanted {
                    visit_names(visitor, element, names, escaped)?;
                } else {
                    skip_below = Some(1);
                }
            }
            (2, ["p", index, src, names @ ..]) if open[1] == Some(ElementKind::Method) => {
                let index: u16 = index
                    .parse()
                    .map_err(|_| MappingError::parse(origin, line_no, format!("bad argument index '{index}'")))?;
                let src = maybe_unescape(src, escaped);
                let src = if src.is_empty() { None } else { Some(src.as_str()) };
                open[2] = Some(ElementKind::MethodArg);
                if visitor.visit_method_arg(index, src)? {
                    visit_names(visitor, ElementKind::MethodArg, names, escaped)?;
                } else {
                    skip_below = Some(2);
                }
            }
            (2, ["v", ..]) => {
                // Local variables are not kept; skip the variable and its comment.
                open[2] = None;
                skip_below = Some(2);
            }
            (d @ 1..=3, ["c", comment]) => match open[d - 1] {
                Some(kind) => visitor.visit_comment(kind, &unescape(comment))?,
                None => return Err(MappingError::parse(origin, line_no, "comment without element")),
            },
            _ => return Err(MappingError::parse(origin, line_no, format!("unrecognized line '{line}'"))),
        }
    }
    Ok(())
}

fn maybe_unescape(text: &str, escaped: bool) -> String {
    if escaped {
        unescape(text)
    } else {
        text.to_string()
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Class,
    Field,
    Method,
    Arg,
}

#[derive(Debug)]
struct Pending {
    kind: PendingKind,
    /// Prefix written before the names (`CLASS\tfoo` or `\tm\t()V\tbar`).
    prefix: String,
    /// Source name substituted for a missing name (v1 only).
    fallback: String,
    names: Vec<Option<String>>,
}

/// Streams a visit as Tiny v1. Elements without any destination name are
/// omitted; missing names of a partially named element repeat the source
/// name. Arguments and comments have no v1 representation and are dropped.
pub struct TinyV1Writer<W: Write> {
    out: W,
    dst_count: usize,
    class: Option<String>,
    pending: Option<Pending>,
}

impl<W: Write> TinyV1Writer<W> {
    pub fn new(out: W) -> Self {
        Self { out, dst_count: 0, class: None, pending: None }
    }

    fn flush_pending(&mut self) -> Result<(), MappingError> {
        let Some(pending) = self.pending.take() else { return Ok(()) };
        if pending.names.iter().all(Option::is_none) {
            return Ok(());
        }
        self.out.write_all(pending.prefix.as_bytes())?;
        for name in &pending.names {
            self.out.write_all(b"\t")?;
            self.out.write_all(name.as_deref().unwrap_or(&pending.fallback).as_bytes())?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn open_member(&mut self, tag: &str, name: &str, desc: Option<&str>) -> Result<bool, MappingError> {
        self.flush_pending()?;
        let owner = self
            .class
            .clone()
            .ok_or_else(|| MappingError::Visitor(format!("member {name} visited before any class")))?;
        let kind = if tag == "FIELD" { PendingKind::Field } else { PendingKind::Method };
        self.pending = Some(Pending {
            kind,
            prefix: format!("{tag}\t{owner}\t{}\t{name}", desc.unwrap_or_default()),
            fallback: name.to_string(),
            names: vec![None; self.dst_count],
        });
        Ok(true)
    }
}

impl<W: Write> MappingVisitor for TinyV1Writer<W> {
    fn visit_namespaces(&mut self, src: &str, dst: &[String]) -> Result<(), MappingError> {
        self.dst_count = dst.len();
        write!(self.out, "v1\t{src}")?;
        for namespace in dst {
            write!(self.out, "\t{namespace}")?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn visit_class(&mut self, src_name: &str) -> Result<bool, MappingError> {
        self.flush_pending()?;
        self.class = Some(src_name.to_string());
        self.pending = Some(Pending {
            kind: PendingKind::Class,
            prefix: format!("CLASS\t{src_name}"),
            fallback: src_name.to_string(),
            names: vec![None; self.dst_count],
        });
        Ok(true)
    }

    fn visit_field(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.open_member("FIELD", src_name, src_desc)
    }

    fn visit_method(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.open_member("METHOD", src_name, src_desc)
    }

    fn visit_dst_name(&mut self, kind: ElementKind, namespace: usize, name: &str) -> Result<(), MappingError> {
        if kind == ElementKind::MethodArg {
            return Ok(());
        }
        if let Some(pending) = self.pending.as_mut() {
            if let Some(slot) = pending.names.get_mut(namespace) {
                *slot = Some(name.to_string());
            }
        }
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), MappingError> {
        self.flush_pending()?;
        self.out.flush()?;
        Ok(())
    }
}

/// Streams a visit as Tiny v2 (minor version 0, unescaped names).
pub struct TinyV2Writer<W: Write> {
    out: W,
    dst_count: usize,
    pending: Option<Pending>,
}

impl<W: Write> TinyV2Writer<W> {
    pub fn new(out: W) -> Self {
        Self { out, dst_count: 0, pending: None }
    }

    fn flush_pending(&mut self) -> Result<(), MappingError> {
        let Some(pending) = self.pending.take() else { return Ok(()) };
        self.out.write_all(pending.prefix.as_bytes())?;
        for name in &pending.names {
            self.out.write_all(b"\t")?;
            self.out.write_all(name.as_deref().unwrap_or_default().as_bytes())?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn open(&mut self, kind: PendingKind, prefix: String) -> Result<bool, MappingError> {
        self.flush_pending()?;
        self.pending = Some(Pending { kind, prefix, fallback: String::new(), names: vec![None; self.dst_count] });
        Ok(true)
    }
}

impl<W: Write> MappingVisitor for TinyV2Writer<W> {
    fn visit_namespaces(&mut self, src: &str, dst: &[String]) -> Result<(), MappingError> {
        self.dst_count = dst.len();
        write!(self.out, "tiny\t2\t0\t{src}")?;
        for namespace in dst {
            write!(self.out, "\t{namespace}")?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn visit_class(&mut self, src_name: &str) -> Result<bool, MappingError> {
        self.open(PendingKind::Class, format!("c\t{src_name}"))
    }

    fn visit_field(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.open(PendingKind::Field, format!("\tf\t{}\t{src_name}", src_desc.unwrap_or_default()))
    }

    fn visit_method(&mut self, src_name: &str, src_desc: Option<&str>) -> Result<bool, MappingError> {
        self.open(PendingKind::Method, format!("\tm\t{}\t{src_name}", src_desc.unwrap_or_default()))
    }

    fn visit_method_arg(&mut self, lv_index: u16, src_name: Option<&str>) -> Result<bool, MappingError> {
        self.open(PendingKind::Arg, format!("\t\tp\t{lv_index}\t{}", src_name.unwrap_or_default()))
    }

    fn visit_dst_name(&mut self, _kind: ElementKind, namespace: usize, name: &str) -> Result<(), MappingError> {
        if let Some(pending) = self.pending.as_mut() {
            if let Some(slot) = pending.names.get_mut(namespace) {
                *slot = Some(name.to_string());
            }
        }
        Ok(())
    }

    fn visit_comment(&mut self, kind: ElementKind, comment: &str) -> Result<(), MappingError> {
        let depth = match self.pending.as_ref().map(|p| p.kind) {
            Some(PendingKind::Class) => 1,
            Some(PendingKind::Field | PendingKind::Method) => 2,
            Some(PendingKind::Arg) => 3,
            None => match kind {
                ElementKind::Class => 1,
                ElementKind::Field | ElementKind::Method => 2,
                ElementKind::MethodArg => 3,
            },
        };
        self.flush_pending()?;
        writeln!(self.out, "{}c\t{}", "\t".repeat(depth), escape(comment))?;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), MappingError> {
        self.flush_pending()?;
        self.out.flush()?;
        Ok(())
    }
}
