//! Descriptor and generic signature helpers.

/// Remap an internal class name or an array descriptor (`[Lfoo;`).
pub fn remap_class_ref(name: &str, map: &dyn Fn(&str) -> Option<String>) -> String {
    if name.starts_with('[') {
        remap_descriptor(name, map)
    } else {
        map(name).unwrap_or_else(|| name.to_string())
    }
}

/// Remap every class named in a field or method descriptor.
pub fn remap_descriptor(desc: &str, map: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(idx) = rest.find('L') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx + 1..];
        match tail.find(';') {
            Some(end) => {
                let class = &tail[..end];
                out.push('L');
                out.push_str(&map(class).unwrap_or_else(|| class.to_string()));
                out.push(';');
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[idx..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Remap every class named in a generic signature. Malformed signatures are
/// returned unchanged.
pub fn remap_signature(signature: &str, map: &dyn Fn(&str) -> Option<String>) -> String {
    let mut parser = SignatureRemapper { chars: signature.as_bytes(), pos: 0, out: String::new(), map };
    match parser.signature() {
        Some(()) if parser.pos == parser.chars.len() => parser.out,
        _ => signature.to_string(),
    }
}

struct SignatureRemapper<'a> {
    chars: &'a [u8],
    pos: usize,
    out: String,
    map: &'a dyn Fn(&str) -> Option<String>,
}

impl SignatureRemapper<'_> {
    fn peek(&self) -> Option<u8> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        self.out.push(c as char);
        Some(c)
    }

    fn expect(&mut self, c: u8) -> Option<()> {
        if self.peek() == Some(c) {
            self.bump().map(|_| ())
        } else {
            None
        }
    }

    fn identifier(&mut self, stops: &[u8]) -> Option<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.chars[start..self.pos]).ok().map(str::to_string)
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.formal_type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            self.bump();
            while self.peek() != Some(b')') {
                self.type_signature()?;
            }
            self.bump();
            if self.peek() == Some(b'V') {
                self.bump();
            } else {
                self.type_signature()?;
            }
            while self.peek() == Some(b'^') {
                self.bump();
                self.reference_type()?;
            }
            Some(())
        } else {
            // Class signature (superclass then interfaces) or a field type.
            while self.pos < self.chars.len() {
                self.type_signature()?;
            }
            Some(())
        }
    }

    fn formal_type_parameters(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":>")?;
            self.out.push_str(&name);
            // Class bound (possibly empty), then interface bounds.
            self.expect(b':')?;
            if !matches!(self.peek(), Some(b':') | Some(b'>')) {
                self.reference_type()?;
            }
            while self.peek() == Some(b':') {
                self.bump();
                self.reference_type()?;
            }
        }
        self.expect(b'>')
    }

    fn type_signature(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => self.bump().map(|_| ()),
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.bump();
                let name = self.identifier(b";")?;
                self.out.push_str(&name);
                self.expect(b';')
            }
            b'[' => {
                self.bump();
                self.type_signature()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let mut name = self.identifier(b"<.;")?;
        let mapped = (self.map)(&name).unwrap_or_else(|| name.clone());
        self.out.push_str(&mapped);
        if self.peek() == Some(b'<') {
            self.type_arguments()?;
        }
        while self.peek() == Some(b'.') {
            // Inner class suffix: the mapped name of `Outer$Inner` decides the emitted segment.
            self.pos += 1;
            let inner = self.identifier(b"<.;")?;
            let outer_mapped = (self.map)(&name).unwrap_or_else(|| name.clone());
            name = format!("{name}${inner}");
            let segment = match (self.map)(&name) {
                Some(full) => match full.strip_prefix(&format!("{outer_mapped}$")) {
                    Some(simple) => simple.to_string(),
                    None => full.rsplit(['$', '/']).next().unwrap_or(&inner).to_string(),
                },
                None => inner,
            };
            self.out.push('.');
            self.out.push_str(&segment);
            if self.peek() == Some(b'<') {
                self.type_arguments()?;
            }
        }
        self.expect(b';')
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek()? {
                b'*' => {
                    self.bump();
                }
                b'+' | b'-' => {
                    self.bump();
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.expect(b'>')
    }
}

/// Parameter descriptors of a method descriptor, e.g. `(I[Ljava/lang/String;)V` gives
/// `["I", "[Ljava/lang/String;"]`.
pub fn method_params(desc: &str) -> Option<Vec<String>> {
    let inner = desc.strip_prefix('(')?;
    let end = inner.find(')')?;
    let mut params = Vec::new();
    let bytes = inner[..end].as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        while bytes.get(pos) == Some(&b'[') {
            pos += 1;
        }
        match bytes.get(pos)? {
            b'L' => {
                let close = inner[pos..end].find(';')?;
                pos += close + 1;
            }
            _ => pos += 1,
        }
        params.push(inner[start..pos].to_string());
    }
    Some(params)
}

/// Return descriptor of a method descriptor.
pub fn return_type(desc: &str) -> Option<&str> {
    desc.find(')').map(|idx| &desc[idx + 1..])
}

/// Convert a field descriptor to a Java source type name (`[I` gives `int[]`).
pub fn descriptor_to_java(desc: &str) -> Option<String> {
    let dims = desc.bytes().take_while(|b| *b == b'[').count();
    let element = &desc[dims..];
    let base = match element {
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "D" => "double".to_string(),
        "F" => "float".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "S" => "short".to_string(),
        "Z" => "boolean".to_string(),
        "V" => "void".to_string(),
        _ => element.strip_prefix('L')?.strip_suffix(';')?.replace('/', "."),
    };
    Some(format!("{base}{}", "[]".repeat(dims)))
}

/// Convert a Java source type name to a field descriptor (`int[]` gives `[I`).
pub fn java_to_descriptor(java: &str) -> String {
    let mut base = java.trim();
    let mut dims = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        dims += 1;
    }
    let element = match base {
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "double" => "D".to_string(),
        "float" => "F".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "short" => "S".to_string(),
        "boolean" => "Z".to_string(),
        "void" => "V".to_string(),
        other => format!("L{};", other.replace('.', "/")),
    };
    format!("{}{element}", "[".repeat(dims))
}

/// Internal class name referenced by a plain object descriptor (`Lfoo/Bar;`).
pub fn object_type(desc: &str) -> Option<&str> {
    desc.strip_prefix('L')?.strip_suffix(';')
}
