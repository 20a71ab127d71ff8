//! Identifier mangling, pool naming and literal quoting.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::node::TagNode;

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while",
];

/// Turns arbitrary text into a Rust identifier: characters outside
/// `[A-Za-z0-9_]` become `_xxxx` with the code point in hex.
pub fn mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, ch) in name.chars().enumerate() {
        if i == 0 && ch.is_ascii_digit() {
            out.push('_');
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push_str(&format!("_{:04x}", ch as u32));
        }
    }
    if out.is_empty() || RESERVED.contains(&out.as_str()) {
        out.insert(0, '_');
    }
    out
}

/// Upper camel case type name for a unit, e.g. `admin/user-list` becomes
/// `AdminUserList`.
pub fn unit_type_name(unit_name: &str) -> String {
    let mut out = String::new();
    for part in unit_name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "Unit");
    }
    out
}

/// Structural key of a pooled handler slot, plus the handler it is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolSignature {
    prefix: String,
    local_name: String,
    attributes: Vec<String>,
    empty_body: bool,
    handler: String,
}

impl PoolSignature {
    pub fn of(tag: &TagNode) -> Self {
        let mut attributes: Vec<String> = tag.attributes.iter().map(|a| a.name.clone()).collect();
        attributes.sort_unstable_by(|a, b| b.cmp(a));
        Self {
            prefix: tag.prefix.clone(),
            local_name: tag.local_name.clone(),
            attributes,
            empty_body: tag.has_empty_body,
            handler: tag
                .binding
                .as_ref()
                .map(|binding| binding.handler.clone())
                .unwrap_or_default(),
        }
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Registry key shared by every unit: `prefix:local[attr,...]`, with a
    /// trailing `/` for an empty body. Tag and attribute names cannot contain
    /// the separators, so distinct signatures never share a key.
    pub fn key(&self) -> String {
        format!(
            "{}:{}[{}]{}",
            self.prefix,
            self.local_name,
            self.attributes.join(","),
            if self.empty_body { "/" } else { "" }
        )
    }

    /// `_tp_<prefix>_<local>[_<attr>...][_nobody]`, mangled.
    pub fn base_name(&self) -> String {
        let mut name = format!("_tp_{}_{}", self.prefix, self.local_name);
        for attr in &self.attributes {
            name.push('_');
            name.push_str(attr);
        }
        if self.empty_body {
            name.push_str("_nobody");
        }
        mangle(&name)
    }
}

/// Pool names in registration order. Equal signatures share a name; a
/// signature whose base name is already taken gets a numeric suffix.
#[derive(Debug, Default)]
pub struct PoolNames {
    by_signature: IndexMap<PoolSignature, String>,
    taken: FxHashSet<String>,
}

impl PoolNames {
    pub fn register(&mut self, signature: PoolSignature) -> &str {
        let base = signature.base_name();
        let taken = &mut self.taken;
        self.by_signature.entry(signature).or_insert_with(|| {
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
    }

    pub fn get(&self, signature: &PoolSignature) -> Option<&str> {
        self.by_signature.get(signature).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_signature.values().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PoolSignature, &str)> {
        self.by_signature
            .iter()
            .map(|(signature, name)| (signature, name.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

fn escape_char_into(out: &mut String, ch: char, quote: char) {
    match ch {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
        c => out.push(c),
    }
}

/// Rust string literal for `text`.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        escape_char_into(&mut out, ch, '"');
    }
    out.push('"');
    out
}

/// Rust char literal for `ch`.
pub fn quote_char(ch: char) -> String {
    let mut out = String::from("'");
    escape_char_into(&mut out, ch, '\'');
    out.push('\'');
    out
}

/// Rust byte string literal for `bytes`.
pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b\"");
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(b)),
            other => out.push_str(&format!("\\x{other:02x}")),
        }
    }
    out.push('"');
    out
}
