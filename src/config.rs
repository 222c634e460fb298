//! A hierarchical, ordered parameter tree with typed leaves, validation and
//! a lossless XML round trip.
//!
//! Entries are addressed by dotted path (`"extractor:reporter_mass_shift"`
//! style paths are equally fine; the separator is `:`). The XML rendition is
//! the rooted `<PARAMETERS>/<NODE>/<ITEM>/<ITEMLIST>` document used by the
//! wider toolchain.
use std::fmt::Display;
use std::io::{BufRead, Write};

use bitflags::bitflags;
use indexmap::IndexMap;
use log::warn;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// The file-format version this module writes and fully understands.
pub const PARAM_XML_VERSION: &str = "1.7.0";

bitflags! {
    /// Qualifiers attached to a parameter entry.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u8 {
        const ADVANCED      = 0b0000_0001;
        const REQUIRED      = 0b0000_0010;
        const INPUT_FILE    = 0b0000_0100;
        const OUTPUT_FILE   = 0b0000_1000;
        const OUTPUT_PREFIX = 0b0001_0000;
    }
}

/// A typed parameter value. Booleans are stored as restricted strings, so a
/// `bool`-typed entry is a `Str` whose restriction is `true|false`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "double",
            ParamValue::Str(_) => "string",
            ParamValue::IntList(_) => "int",
            ParamValue::FloatList(_) => "double",
            ParamValue::StrList(_) => "string",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ParamValue::IntList(_) | ParamValue::FloatList(_) | ParamValue::StrList(_)
        )
    }

    fn same_shape(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::IntList(v) => {
                let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ParamValue::FloatList(v) => {
                let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ParamValue::StrList(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

/// The restriction attached to an entry, checked by [`ParamEntry::validate`].
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Restriction {
    #[default]
    None,
    /// Closed interval, either bound optional.
    IntRange(Option<i64>, Option<i64>),
    FloatRange(Option<f64>, Option<f64>),
    /// Enumerated allowed values; also used for supported file extensions.
    ValidStrings(Vec<String>),
}

impl Restriction {
    fn admits(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Restriction::None, _) => true,
            (Restriction::IntRange(lo, hi), ParamValue::Int(v)) => {
                lo.map_or(true, |lo| *v >= lo) && hi.map_or(true, |hi| *v <= hi)
            }
            (Restriction::IntRange(lo, hi), ParamValue::IntList(vs)) => vs
                .iter()
                .all(|v| lo.map_or(true, |lo| *v >= lo) && hi.map_or(true, |hi| *v <= hi)),
            (Restriction::FloatRange(lo, hi), ParamValue::Float(v)) => {
                lo.map_or(true, |lo| *v >= lo) && hi.map_or(true, |hi| *v <= hi)
            }
            (Restriction::FloatRange(lo, hi), ParamValue::FloatList(vs)) => vs
                .iter()
                .all(|v| lo.map_or(true, |lo| *v >= lo) && hi.map_or(true, |hi| *v <= hi)),
            (Restriction::ValidStrings(allowed), ParamValue::Str(v)) => allowed.contains(v),
            (Restriction::ValidStrings(allowed), ParamValue::StrList(vs)) => {
                vs.iter().all(|v| allowed.contains(v))
            }
            _ => false,
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            Restriction::None => None,
            Restriction::IntRange(lo, hi) => Some(format!(
                "{}:{}",
                lo.map(|v| v.to_string()).unwrap_or_default(),
                hi.map(|v| v.to_string()).unwrap_or_default()
            )),
            Restriction::FloatRange(lo, hi) => Some(format!(
                "{}:{}",
                lo.map(|v| v.to_string()).unwrap_or_default(),
                hi.map(|v| v.to_string()).unwrap_or_default()
            )),
            Restriction::ValidStrings(vals) => Some(vals.join(",")),
        }
    }
}

/// One leaf of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub value: ParamValue,
    pub description: String,
    pub flags: ParamFlags,
    pub restriction: Restriction,
}

impl ParamEntry {
    pub fn new(value: ParamValue, description: &str) -> Self {
        Self {
            value,
            description: description.to_string(),
            flags: ParamFlags::empty(),
            restriction: Restriction::None,
        }
    }

    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    pub fn validate(&self) -> Result<(), ParamTreeError> {
        if self.restriction.admits(&self.value) {
            Ok(())
        } else {
            Err(ParamTreeError::RestrictionViolated {
                value: self.value.to_string(),
                restriction: format!("{:?}", self.restriction),
            })
        }
    }

    fn is_file(&self) -> bool {
        self.flags
            .intersects(ParamFlags::INPUT_FILE | ParamFlags::OUTPUT_FILE | ParamFlags::OUTPUT_PREFIX)
    }

    fn xml_type(&self) -> &'static str {
        if self.flags.contains(ParamFlags::INPUT_FILE) {
            "input-file"
        } else if self.flags.contains(ParamFlags::OUTPUT_FILE) {
            "output-file"
        } else if self.flags.contains(ParamFlags::OUTPUT_PREFIX) {
            "output-prefix"
        } else if self.is_bool() {
            "bool"
        } else {
            self.value.type_name()
        }
    }

    fn is_bool(&self) -> bool {
        matches!(&self.value, ParamValue::Str(_))
            && self.restriction
                == Restriction::ValidStrings(vec!["true".to_string(), "false".to_string()])
    }
}

#[derive(Debug, Error)]
pub enum ParamTreeError {
    #[error("Parameter path not found: {0}")]
    PathNotFound(String),
    #[error("Unknown parameter {0} rejected")]
    UnknownParameter(String),
    #[error("Value {value} violates restriction {restriction}")]
    RestrictionViolated { value: String, restriction: String },
    #[error("Type mismatch at {path}: expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },
    #[error("XML error: {0}")]
    Xml(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ParamTreeError {
    fn from(value: quick_xml::Error) -> Self {
        ParamTreeError::Xml(value.to_string())
    }
}

/// The ordered tree itself: a flat, insertion-ordered mapping from dotted
/// path to entry, with per-section descriptions kept separately.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParamTree {
    entries: IndexMap<String, ParamEntry>,
    section_descriptions: IndexMap<String, String>,
}

impl ParamTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, path: &str, entry: ParamEntry) {
        self.entries.insert(path.to_string(), entry);
    }

    /// Convenience setters mirroring the common leaf shapes.
    pub fn set_int(&mut self, path: &str, value: i64, description: &str) {
        self.set(path, ParamEntry::new(ParamValue::Int(value), description));
    }

    pub fn set_float(&mut self, path: &str, value: f64, description: &str) {
        self.set(path, ParamEntry::new(ParamValue::Float(value), description));
    }

    pub fn set_string(&mut self, path: &str, value: &str, description: &str) {
        self.set(
            path,
            ParamEntry::new(ParamValue::Str(value.to_string()), description),
        );
    }

    pub fn set_bool(&mut self, path: &str, value: bool, description: &str) {
        self.set(
            path,
            ParamEntry::new(ParamValue::Str(value.to_string()), description).with_restriction(
                Restriction::ValidStrings(vec!["true".to_string(), "false".to_string()]),
            ),
        );
    }

    pub fn set_section_description(&mut self, path: &str, description: &str) {
        self.section_descriptions
            .insert(path.to_string(), description.to_string());
    }

    pub fn get(&self, path: &str) -> Result<&ParamEntry, ParamTreeError> {
        self.entries
            .get(path)
            .ok_or_else(|| ParamTreeError::PathNotFound(path.to_string()))
    }

    pub fn get_int(&self, path: &str) -> Result<i64, ParamTreeError> {
        match &self.get(path)?.value {
            ParamValue::Int(v) => Ok(*v),
            other => Err(ParamTreeError::TypeMismatch {
                path: path.to_string(),
                expected: "int".into(),
                got: other.type_name().into(),
            }),
        }
    }

    pub fn get_float(&self, path: &str) -> Result<f64, ParamTreeError> {
        match &self.get(path)?.value {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(ParamTreeError::TypeMismatch {
                path: path.to_string(),
                expected: "double".into(),
                got: other.type_name().into(),
            }),
        }
    }

    pub fn get_string(&self, path: &str) -> Result<&str, ParamTreeError> {
        match &self.get(path)?.value {
            ParamValue::Str(v) => Ok(v),
            other => Err(ParamTreeError::TypeMismatch {
                path: path.to_string(),
                expected: "string".into(),
                got: other.type_name().into(),
            }),
        }
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, ParamTreeError> {
        Ok(self.get_string(path)? == "true")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamEntry)> {
        self.entries.iter()
    }

    pub fn validate(&self) -> Result<(), ParamTreeError> {
        for entry in self.entries.values() {
            entry.validate()?;
        }
        Ok(())
    }

    /// Merge values from `old` into this (default-populated) tree.
    ///
    /// Matching paths with matching shapes take the old value when it passes
    /// this tree's restriction; otherwise the default stays and a warning is
    /// emitted. Unknown paths are inserted when `add_new`, rejected when
    /// `fail_on_unknown`, and dropped with a warning otherwise.
    pub fn update(
        &mut self,
        old: &ParamTree,
        add_new: bool,
        fail_on_unknown: bool,
    ) -> Result<(), ParamTreeError> {
        for (path, old_entry) in old.iter() {
            match self.entries.get_mut(path) {
                Some(current) => {
                    if !current.value.same_shape(&old_entry.value) {
                        warn!(
                            "parameter '{}' changed type from {} to {}; keeping default",
                            path,
                            old_entry.value.type_name(),
                            current.value.type_name()
                        );
                        continue;
                    }
                    let candidate = ParamEntry {
                        value: old_entry.value.clone(),
                        ..current.clone()
                    };
                    if candidate.validate().is_ok() {
                        current.value = old_entry.value.clone();
                    } else {
                        warn!(
                            "previous value '{}' of parameter '{}' no longer passes its restriction; keeping default",
                            old_entry.value, path
                        );
                    }
                }
                None => {
                    if add_new {
                        self.entries.insert(path.clone(), old_entry.clone());
                    } else if fail_on_unknown {
                        return Err(ParamTreeError::UnknownParameter(path.clone()));
                    } else {
                        warn!("dropping unknown parameter '{}'", path);
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize as a rooted `<PARAMETERS>` document.
    pub fn write_xml<W: Write>(&self, sink: W) -> Result<(), ParamTreeError> {
        let mut writer = Writer::new_with_indent(sink, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("PARAMETERS");
        root.push_attribute(("version", PARAM_XML_VERSION));
        writer.write_event(Event::Start(root))?;

        let mut open_nodes: Vec<String> = Vec::new();
        for (path, entry) in self.entries.iter() {
            let segments: Vec<&str> = path.split(':').collect();
            let (leaf, sections) = segments.split_last().unwrap();

            // Close nodes that are no longer on the path, then open new ones.
            let shared = open_nodes
                .iter()
                .zip(sections.iter())
                .take_while(|(a, b)| a.as_str() == **b)
                .count();
            for _ in shared..open_nodes.len() {
                writer.write_event(Event::End(BytesEnd::new("NODE")))?;
                open_nodes.pop();
            }
            for section in &sections[shared..] {
                let mut node = BytesStart::new("NODE");
                node.push_attribute(("name", *section));
                let prefix = {
                    let mut p = open_nodes.clone();
                    p.push(section.to_string());
                    p.join(":")
                };
                if let Some(desc) = self.section_descriptions.get(&prefix) {
                    node.push_attribute(("description", desc.as_str()));
                }
                writer.write_event(Event::Start(node))?;
                open_nodes.push(section.to_string());
            }

            self.write_entry(&mut writer, leaf, entry)?;
        }
        for _ in 0..open_nodes.len() {
            writer.write_event(Event::End(BytesEnd::new("NODE")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("PARAMETERS")))?;
        Ok(())
    }

    fn write_entry<W: Write>(
        &self,
        writer: &mut Writer<W>,
        name: &str,
        entry: &ParamEntry,
    ) -> Result<(), ParamTreeError> {
        let restriction_attr = if entry.is_bool() {
            // true|false is implied by the bool type.
            None
        } else {
            entry.restriction.render()
        };
        if entry.value.is_list() {
            let mut list = BytesStart::new("ITEMLIST");
            list.push_attribute(("name", name));
            list.push_attribute(("type", entry.value.type_name()));
            list.push_attribute(("description", entry.description.as_str()));
            self.push_flag_attrs(&mut list, entry, restriction_attr.as_deref());
            writer.write_event(Event::Start(list))?;
            let items: Vec<String> = match &entry.value {
                ParamValue::IntList(vs) => vs.iter().map(|v| v.to_string()).collect(),
                ParamValue::FloatList(vs) => vs.iter().map(|v| v.to_string()).collect(),
                ParamValue::StrList(vs) => vs.clone(),
                _ => unreachable!(),
            };
            for item in items {
                let mut elt = BytesStart::new("LISTITEM");
                elt.push_attribute(("value", item.as_str()));
                writer.write_event(Event::Empty(elt))?;
            }
            writer.write_event(Event::End(BytesEnd::new("ITEMLIST")))?;
        } else {
            let value = entry.value.to_string();
            let mut item = BytesStart::new("ITEM");
            item.push_attribute(("name", name));
            item.push_attribute(("value", value.as_str()));
            item.push_attribute(("type", entry.xml_type()));
            item.push_attribute(("description", entry.description.as_str()));
            self.push_flag_attrs(&mut item, entry, restriction_attr.as_deref());
            writer.write_event(Event::Empty(item))?;
        }
        Ok(())
    }

    fn push_flag_attrs(&self, elt: &mut BytesStart, entry: &ParamEntry, restriction: Option<&str>) {
        if entry.flags.contains(ParamFlags::REQUIRED) {
            elt.push_attribute(("required", "true"));
        }
        if entry.flags.contains(ParamFlags::ADVANCED) {
            elt.push_attribute(("advanced", "true"));
        }
        if let Some(r) = restriction {
            let key = if entry.is_file() {
                "supported_formats"
            } else {
                "restrictions"
            };
            elt.push_attribute((key, r));
        }
    }

    /// Parse a `<PARAMETERS>` document. A newer file version than
    /// [`PARAM_XML_VERSION`] warns and proceeds.
    pub fn read_xml<R: BufRead>(source: R) -> Result<Self, ParamTreeError> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        let mut buffer = Vec::new();

        let mut tree = ParamTree::new();
        let mut node_stack: Vec<String> = Vec::new();
        let mut pending_list: Option<(String, ParamEntry, Vec<String>)> = None;

        loop {
            match reader.read_event_into(&mut buffer) {
                Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                    match start.name().as_ref() {
                        b"PARAMETERS" => {
                            if let Some(version) = get_attr(&start, b"version")? {
                                if version_newer(&version, PARAM_XML_VERSION) {
                                    warn!(
                                        "parameter file version {} is newer than supported {}; loading anyway",
                                        version, PARAM_XML_VERSION
                                    );
                                }
                            }
                        }
                        b"NODE" => {
                            let name = get_attr(&start, b"name")?.unwrap_or_default();
                            node_stack.push(name);
                            let path = node_stack.join(":");
                            if let Some(desc) = get_attr(&start, b"description")? {
                                if !desc.is_empty() {
                                    tree.set_section_description(&path, &desc);
                                }
                            }
                        }
                        b"ITEM" => {
                            let (name, entry) = parse_item(&start)?;
                            let path = join_path(&node_stack, &name);
                            tree.set(&path, entry);
                        }
                        b"ITEMLIST" => {
                            let name = get_attr(&start, b"name")?.unwrap_or_default();
                            let entry = parse_list_header(&start)?;
                            pending_list = Some((name, entry, Vec::new()));
                        }
                        b"LISTITEM" => {
                            if let Some((_, _, values)) = pending_list.as_mut() {
                                values.push(get_attr(&start, b"value")?.unwrap_or_default());
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(end)) => match end.name().as_ref() {
                    b"NODE" => {
                        node_stack.pop();
                    }
                    b"ITEMLIST" => {
                        if let Some((name, mut entry, values)) = pending_list.take() {
                            entry.value = match entry.value {
                                ParamValue::IntList(_) => ParamValue::IntList(
                                    values.iter().filter_map(|v| v.parse().ok()).collect(),
                                ),
                                ParamValue::FloatList(_) => ParamValue::FloatList(
                                    values.iter().filter_map(|v| v.parse().ok()).collect(),
                                ),
                                _ => ParamValue::StrList(values),
                            };
                            let path = join_path(&node_stack, &name);
                            tree.set(&path, entry);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(ParamTreeError::Xml(e.to_string())),
            }
            buffer.clear();
        }
        Ok(tree)
    }
}

fn join_path(stack: &[String], leaf: &str) -> String {
    if stack.is_empty() {
        leaf.to_string()
    } else {
        format!("{}:{}", stack.join(":"), leaf)
    }
}

fn get_attr(start: &BytesStart, key: &[u8]) -> Result<Option<String>, ParamTreeError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParamTreeError::Xml(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| ParamTreeError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_flags(start: &BytesStart, ty: &str) -> Result<ParamFlags, ParamTreeError> {
    let mut flags = ParamFlags::empty();
    if get_attr(start, b"required")?.as_deref() == Some("true") {
        flags |= ParamFlags::REQUIRED;
    }
    if get_attr(start, b"advanced")?.as_deref() == Some("true") {
        flags |= ParamFlags::ADVANCED;
    }
    match ty {
        "input-file" => flags |= ParamFlags::INPUT_FILE,
        "output-file" => flags |= ParamFlags::OUTPUT_FILE,
        "output-prefix" => flags |= ParamFlags::OUTPUT_PREFIX,
        _ => {}
    }
    Ok(flags)
}

fn parse_restriction(
    start: &BytesStart,
    ty: &str,
    is_file: bool,
) -> Result<Restriction, ParamTreeError> {
    let raw = if is_file {
        get_attr(start, b"supported_formats")?
    } else {
        get_attr(start, b"restrictions")?
    };
    let Some(raw) = raw else {
        return Ok(Restriction::None);
    };
    if raw.is_empty() {
        warn!("entry has an empty restrictions attribute");
        return Ok(Restriction::None);
    }
    let restriction = match ty {
        "int" => {
            let (lo, hi) = raw.split_once(':').unwrap_or((raw.as_str(), ""));
            Restriction::IntRange(lo.parse().ok(), hi.parse().ok())
        }
        "double" | "float" => {
            let (lo, hi) = raw.split_once(':').unwrap_or((raw.as_str(), ""));
            Restriction::FloatRange(lo.parse().ok(), hi.parse().ok())
        }
        _ => Restriction::ValidStrings(raw.split(',').map(|s| s.trim().to_string()).collect()),
    };
    Ok(restriction)
}

fn parse_item(start: &BytesStart) -> Result<(String, ParamEntry), ParamTreeError> {
    let name = get_attr(start, b"name")?.unwrap_or_default();
    let raw_value = get_attr(start, b"value")?.unwrap_or_default();
    let ty = get_attr(start, b"type")?.unwrap_or_default();
    let description = get_attr(start, b"description")?.unwrap_or_default();
    let flags = parse_flags(start, &ty)?;

    let (value, restriction) = match ty.as_str() {
        "int" => (
            ParamValue::Int(raw_value.parse().map_err(|_| ParamTreeError::TypeMismatch {
                path: name.clone(),
                expected: "int".into(),
                got: raw_value.clone(),
            })?),
            parse_restriction(start, "int", false)?,
        ),
        "double" | "float" => (
            ParamValue::Float(raw_value.parse().map_err(|_| {
                ParamTreeError::TypeMismatch {
                    path: name.clone(),
                    expected: "double".into(),
                    got: raw_value.clone(),
                }
            })?),
            parse_restriction(start, "double", false)?,
        ),
        "bool" => (
            ParamValue::Str(raw_value),
            Restriction::ValidStrings(vec!["true".to_string(), "false".to_string()]),
        ),
        "string" => (
            ParamValue::Str(raw_value),
            parse_restriction(start, "string", false)?,
        ),
        "input-file" | "output-file" | "output-prefix" => (
            ParamValue::Str(raw_value),
            parse_restriction(start, "string", true)?,
        ),
        other => {
            warn!("ignoring entry '{}' because of unknown type '{}'", name, other);
            (ParamValue::Str(raw_value), Restriction::None)
        }
    };

    let entry = ParamEntry {
        value,
        description,
        flags,
        restriction,
    };
    Ok((name, entry))
}

fn parse_list_header(start: &BytesStart) -> Result<ParamEntry, ParamTreeError> {
    let ty = get_attr(start, b"type")?.unwrap_or_default();
    let description = get_attr(start, b"description")?.unwrap_or_default();
    let flags = parse_flags(start, &ty)?;
    let value = match ty.as_str() {
        "int" => ParamValue::IntList(Vec::new()),
        "double" | "float" => ParamValue::FloatList(Vec::new()),
        _ => ParamValue::StrList(Vec::new()),
    };
    let restriction = match ty.as_str() {
        "int" => parse_restriction(start, "int", false)?,
        "double" | "float" => parse_restriction(start, "double", false)?,
        "input-file" | "output-file" => parse_restriction(start, "string", true)?,
        _ => parse_restriction(start, "string", false)?,
    };
    Ok(ParamEntry {
        value,
        description,
        flags,
        restriction,
    })
}

/// Dotted numeric version comparison; non-numeric segments compare equal.
fn version_newer(candidate: &str, reference: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|seg| seg.parse().unwrap_or_default())
            .collect()
    };
    parse(candidate) > parse(reference)
}

#[cfg(test)]
mod test {
    use super::*;

    fn example_tree() -> ParamTree {
        let mut tree = ParamTree::new();
        tree.set_section_description("extractor", "Reporter channel extraction");
        tree.set(
            "extractor:reporter_mass_shift",
            ParamEntry::new(ParamValue::Float(0.002), "Allowed reporter mass delta")
                .with_restriction(Restriction::FloatRange(Some(1e-4), Some(0.5))),
        );
        tree.set(
            "extractor:select_activation",
            ParamEntry::new(
                ParamValue::Str("HCD".to_string()),
                "Restrict to this activation",
            )
            .with_restriction(Restriction::ValidStrings(vec![
                "HCD".into(),
                "CID".into(),
                "ETD".into(),
            ])),
        );
        tree.set_bool("extractor:keep_unannotated", false, "Keep channels without hits");
        tree.set(
            "deconv:charge_range",
            ParamEntry::new(ParamValue::IntList(vec![2, 100]), "Charge bounds")
                .with_flags(ParamFlags::ADVANCED),
        );
        tree.set(
            "in",
            ParamEntry::new(ParamValue::Str("input.mzML".to_string()), "Input file")
                .with_flags(ParamFlags::INPUT_FILE | ParamFlags::REQUIRED)
                .with_restriction(Restriction::ValidStrings(vec!["*.mzML".into()])),
        );
        tree
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let tree = example_tree();
        let mut xml = Vec::new();
        tree.write_xml(&mut xml).unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("<PARAMETERS"));
        assert!(text.contains("ITEMLIST"));
        assert!(text.contains("supported_formats"));

        let reloaded = ParamTree::read_xml(text.as_bytes()).unwrap();
        assert_eq!(reloaded, tree);
    }

    #[test]
    fn test_typed_access_and_validation() {
        let tree = example_tree();
        assert_eq!(tree.get_float("extractor:reporter_mass_shift").unwrap(), 0.002);
        assert!(!tree.get_bool("extractor:keep_unannotated").unwrap());
        assert!(tree.get_int("extractor:reporter_mass_shift").is_err());
        assert!(tree.validate().is_ok());

        let mut bad = tree.clone();
        bad.set(
            "extractor:reporter_mass_shift",
            ParamEntry::new(ParamValue::Float(0.9), "")
                .with_restriction(Restriction::FloatRange(Some(1e-4), Some(0.5))),
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_update_preserves_user_values() {
        let mut defaults = example_tree();
        let mut old = ParamTree::new();
        old.set(
            "extractor:reporter_mass_shift",
            ParamEntry::new(ParamValue::Float(0.003), ""),
        );
        old.set("obsolete:gone", ParamEntry::new(ParamValue::Int(1), ""));

        defaults.update(&old, false, false).unwrap();
        assert_eq!(defaults.get_float("extractor:reporter_mass_shift").unwrap(), 0.003);
        assert!(defaults.get("obsolete:gone").is_err());
    }

    #[test]
    fn test_update_fail_on_unknown() {
        let mut defaults = example_tree();
        let mut old = ParamTree::new();
        old.set("obsolete:gone", ParamEntry::new(ParamValue::Int(1), ""));
        assert!(matches!(
            defaults.update(&old, false, true),
            Err(ParamTreeError::UnknownParameter(_))
        ));

        let mut defaults = example_tree();
        defaults.update(&old, true, false).unwrap();
        assert_eq!(defaults.get_int("obsolete:gone").unwrap(), 1);
    }

    #[test]
    fn test_update_rejects_out_of_restriction_values() {
        let mut defaults = example_tree();
        let mut old = ParamTree::new();
        // Below the floor of the default restriction.
        old.set(
            "extractor:reporter_mass_shift",
            ParamEntry::new(ParamValue::Float(1e-6), ""),
        );
        defaults.update(&old, false, false).unwrap();
        assert_eq!(defaults.get_float("extractor:reporter_mass_shift").unwrap(), 0.002);
    }

    #[test]
    fn test_version_comparison() {
        assert!(version_newer("2.0", PARAM_XML_VERSION));
        assert!(!version_newer("1.6.9", PARAM_XML_VERSION));
        assert!(!version_newer(PARAM_XML_VERSION, PARAM_XML_VERSION));
    }
}
