//! An OBO-backed controlled-vocabulary registry.
//!
//! Loads a vocabulary from an OBO text stream, indexes terms by id and by
//! name, and answers ancestry queries over the `is_a` graph. Only `[Term]`
//! stanzas are interpreted; all other stanza kinds are skipped verbatim.
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read};

use indexmap::IndexMap;
use log::warn;
use thiserror::Error;

/// The XSD primitive a term's value is declared to have via
/// `xref: value-type:xsd\:…`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum XsdType {
    #[default]
    None,
    String,
    Integer,
    Decimal,
    NegativeInteger,
    PositiveInteger,
    NonNegativeInteger,
    NonPositiveInteger,
    Boolean,
    Date,
    AnyUri,
}

impl XsdType {
    fn from_token(token: &str) -> Option<XsdType> {
        // Longest-prefix variants first so "nonNegativeInteger" does not
        // fall through to "integer".
        let ty = if token.contains("value-type:xsd:nonNegativeInteger") {
            Self::NonNegativeInteger
        } else if token.contains("value-type:xsd:nonPositiveInteger") {
            Self::NonPositiveInteger
        } else if token.contains("value-type:xsd:negativeInteger") {
            Self::NegativeInteger
        } else if token.contains("value-type:xsd:positiveInteger") {
            Self::PositiveInteger
        } else if token.contains("value-type:xsd:integer") || token.contains("value-type:xsd:int") {
            Self::Integer
        } else if token.contains("value-type:xsd:decimal")
            || token.contains("value-type:xsd:float")
            || token.contains("value-type:xsd:double")
        {
            Self::Decimal
        } else if token.contains("value-type:xsd:boolean") || token.contains("value-type:xsd:bool")
        {
            Self::Boolean
        } else if token.contains("value-type:xsd:date") {
            Self::Date
        } else if token.contains("value-type:xsd:anyURI") {
            Self::AnyUri
        } else if token.contains("value-type:xsd:string") {
            Self::String
        } else {
            return None;
        };
        Some(ty)
    }
}

/// A value checked against a term's declared XSD type.
#[derive(Debug, Clone, PartialEq)]
pub enum CvValue {
    Str(String),
    Int(i64),
    Decimal(f64),
    Bool(bool),
    Date(chrono::NaiveDate),
    Uri(String),
}

impl XsdType {
    /// Parse and validate `text` against this XSD type. Integer flavours
    /// enforce their sign constraints.
    pub fn parse_value(&self, text: &str) -> Result<CvValue, CvError> {
        let conversion = |message: String| CvError::Conversion {
            value: text.to_string(),
            message,
        };
        let int_in = |check: fn(i64) -> bool, label: &str| -> Result<CvValue, CvError> {
            let v: i64 = text
                .trim()
                .parse()
                .map_err(|_| conversion(format!("not an integer ({})", label)))?;
            if check(v) {
                Ok(CvValue::Int(v))
            } else {
                Err(conversion(format!("{} violates {}", v, label)))
            }
        };
        match self {
            XsdType::None | XsdType::String => Ok(CvValue::Str(text.to_string())),
            XsdType::Integer => int_in(|_| true, "integer"),
            XsdType::NegativeInteger => int_in(|v| v < 0, "negativeInteger"),
            XsdType::PositiveInteger => int_in(|v| v > 0, "positiveInteger"),
            XsdType::NonNegativeInteger => int_in(|v| v >= 0, "nonNegativeInteger"),
            XsdType::NonPositiveInteger => int_in(|v| v <= 0, "nonPositiveInteger"),
            XsdType::Decimal => text
                .trim()
                .parse()
                .map(CvValue::Decimal)
                .map_err(|_| conversion("not a decimal".to_string())),
            XsdType::Boolean => match text.trim() {
                "true" | "1" => Ok(CvValue::Bool(true)),
                "false" | "0" => Ok(CvValue::Bool(false)),
                other => Err(conversion(format!("'{}' is not a boolean", other))),
            },
            XsdType::Date => text
                .trim()
                .parse::<chrono::NaiveDate>()
                .map(CvValue::Date)
                .map_err(|e| conversion(format!("not an ISO date: {}", e))),
            XsdType::AnyUri => Ok(CvValue::Uri(text.trim().to_string())),
        }
    }
}

/// One `[Term]` stanza from an OBO document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CvTerm {
    pub id: String,
    pub name: String,
    pub definition: String,
    pub synonyms: Vec<String>,
    pub parents: HashSet<String>,
    pub children: HashSet<String>,
    pub units: HashSet<String>,
    pub obsolete: bool,
    pub xref_type: XsdType,
    pub xref_binary: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CvError {
    #[error("I/O failure while reading OBO stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("Term not found: {0}")]
    TermNotFound(String),
    #[error("Cannot convert '{value}': {message}")]
    Conversion { value: String, message: String },
}

/// The loaded vocabulary: ordered term table plus name lookup support.
#[derive(Debug, Default, Clone)]
pub struct ControlledVocabularyRegistry {
    name: String,
    terms: IndexMap<String, CvTerm>,
    by_name: HashMap<String, Vec<String>>,
}

impl ControlledVocabularyRegistry {
    /// Parse an OBO document from `source`. The registry name is only used
    /// in diagnostics.
    pub fn load<R: Read>(name: &str, source: R) -> Result<Self, CvError> {
        let mut registry = Self {
            name: name.to_string(),
            ..Default::default()
        };
        let reader = BufReader::new(source);

        let mut current: Option<CvTerm> = None;
        let mut in_term = false;
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') {
                if let Some(term) = current.take() {
                    registry.store(term);
                }
                in_term = trimmed == "[Term]";
                if in_term {
                    current = Some(CvTerm::default());
                }
                continue;
            }
            if !in_term {
                continue;
            }
            let term = current.as_mut().unwrap();
            let squeezed: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

            if let Some(rest) = squeezed.strip_prefix("id:") {
                term.id = rest.to_string();
            } else if trimmed.starts_with("name:") {
                term.name = trimmed["name:".len()..].trim().to_string();
            } else if trimmed.starts_with("is_a:") {
                let (id, display) = split_display_comment(&trimmed["is_a:".len()..]);
                registry.check_display_name(&term.id, &id, display.as_deref(), "parent");
                term.parents.insert(id);
            } else if squeezed.starts_with("relationship:DRV")
                || squeezed.starts_with("relationship:part_of")
            {
                let body = trimmed.split_once(':').map(|x| x.1).unwrap_or_default();
                let body = body
                    .trim_start()
                    .trim_start_matches("DRV")
                    .trim_start_matches("part_of")
                    .trim();
                let (id, display) = split_display_comment(body);
                registry.check_display_name(&term.id, &id, display.as_deref(), "relationship");
                term.parents.insert(id);
            } else if squeezed.starts_with("relationship:has_units") {
                let body = trimmed.split_once("has_units").map(|x| x.1).unwrap_or_default();
                let (id, display) = split_display_comment(body);
                registry.check_display_name(&term.id, &id, display.as_deref(), "has_units");
                term.units.insert(id);
            } else if trimmed.starts_with("def:") {
                // def: "text" [refs]
                let body = &trimmed["def:".len()..];
                term.definition = extract_quoted(body).unwrap_or_else(|| body.trim().to_string());
            } else if trimmed.starts_with("synonym:") {
                if let Some(synonym) = extract_quoted(&trimmed["synonym:".len()..]) {
                    term.synonyms.push(synonym);
                }
            } else if squeezed == "is_obsolete:true" {
                term.obsolete = true;
            } else if squeezed.starts_with("xref:value-type")
                || squeezed.starts_with("xref_analog:value-type")
            {
                if let Some(ty) = XsdType::from_token(&squeezed) {
                    term.xref_type = ty;
                }
            } else if squeezed.starts_with("xref:binary-data-type")
                || squeezed.starts_with("xref_analog:binary-data-type")
            {
                term.xref_binary.push(squeezed);
            }
        }
        if let Some(term) = current.take() {
            registry.store(term);
        }
        registry.link_children();
        Ok(registry)
    }

    fn store(&mut self, term: CvTerm) {
        if term.id.is_empty() {
            return;
        }
        self.by_name
            .entry(term.name.clone())
            .or_default()
            .push(term.id.clone());
        self.terms.insert(term.id.clone(), term);
    }

    /// Invert parent links into child links after the whole document is in.
    fn link_children(&mut self) {
        let edges: Vec<(String, String)> = self
            .terms
            .values()
            .flat_map(|t| t.parents.iter().map(|p| (p.clone(), t.id.clone())))
            .collect();
        for (parent, child) in edges {
            if let Some(parent_term) = self.terms.get_mut(&parent) {
                parent_term.children.insert(child);
            }
        }
    }

    /// `is_a !` comments carry a display name; a mismatch against the loaded
    /// term is reported but never fails the parse.
    fn check_display_name(&self, owner: &str, id: &str, display: Option<&str>, role: &str) {
        if let (Some(display), Some(known)) = (display, self.terms.get(id)) {
            if known.name != display {
                warn!(
                    "while loading term '{}' of CV '{}': {} term name '{}' and id '{}' differ",
                    owner, self.name, role, display, id
                );
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.terms.contains_key(id)
    }

    pub fn term(&self, id: &str) -> Result<&CvTerm, CvError> {
        self.terms
            .get(id)
            .ok_or_else(|| CvError::TermNotFound(id.to_string()))
    }

    /// Look a term up by its display name. Obsolete terms never win a name
    /// collision; among live duplicates, `definition` disambiguates.
    pub fn term_by_name(&self, name: &str) -> Result<&CvTerm, CvError> {
        self.term_by_name_and_definition(name, None)
    }

    pub fn term_by_name_and_definition(
        &self,
        name: &str,
        definition: Option<&str>,
    ) -> Result<&CvTerm, CvError> {
        let candidates = self
            .by_name
            .get(name)
            .ok_or_else(|| CvError::TermNotFound(name.to_string()))?;
        let live: Vec<&CvTerm> = candidates
            .iter()
            .filter_map(|id| self.terms.get(id))
            .filter(|t| !t.obsolete)
            .collect();
        match live.as_slice() {
            [] => Err(CvError::TermNotFound(name.to_string())),
            [only] => Ok(only),
            many => {
                if let Some(def) = definition {
                    if let Some(hit) = many.iter().find(|t| t.definition == def) {
                        return Ok(hit);
                    }
                }
                Ok(many[0])
            }
        }
    }

    /// Depth-first ancestor traversal of `child`'s parent set. Assumes the
    /// graph is acyclic.
    pub fn is_child_of(&self, child: &str, ancestor: &str) -> Result<bool, CvError> {
        let term = self.term(child)?;
        let mut stack: Vec<&String> = term.parents.iter().collect();
        while let Some(parent) = stack.pop() {
            if parent == ancestor {
                return Ok(true);
            }
            if let Some(parent_term) = self.terms.get(parent) {
                stack.extend(parent_term.parents.iter());
            }
        }
        Ok(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CvTerm> {
        self.terms.values()
    }
}

/// Split `"MS:1000572 ! binary data compression type"` into the id and the
/// optional display name after the `!`.
fn split_display_comment(body: &str) -> (String, Option<String>) {
    match body.split_once('!') {
        Some((id, display)) => (id.trim().to_string(), Some(display.trim().to_string())),
        None => (body.trim().to_string(), None),
    }
}

fn extract_quoted(body: &str) -> Option<String> {
    let start = body.find('"')? + 1;
    let end = body[start..].find('"')? + start;
    Some(body[start..end].trim().to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    const OBO_SNIPPET: &str = r#"
format-version: 1.2
data-version: 4.1.130

[Term]
id: MS:1000572
name: binary data compression type
def: "Compression types for binary data arrays." [PSI:MS]

[Term]
id: MS:1000574
name: zlib compression
def: "Zlib (gzip) compression." [PSI:MS]
is_a: MS:1000572 ! binary data compression type

[Term]
id: MS:1000514
name: m/z array
xref: value-type:xsd\:float "The allowed value-type for this CV term."
is_a: MS:1000513 ! binary data array
relationship: has_units MS:1000040 ! m/z

[Term]
id: MS:9999999
name: zlib compression
is_obsolete: true

[Typedef]
id: part_of
name: part of
"#;

    #[test]
    fn test_load_and_ancestry() {
        let registry =
            ControlledVocabularyRegistry::load("psi-ms", OBO_SNIPPET.as_bytes()).unwrap();
        assert_eq!(registry.len(), 4);
        assert!(registry.is_child_of("MS:1000574", "MS:1000572").unwrap());
        assert!(!registry.is_child_of("MS:1000572", "MS:1000574").unwrap());
        assert!(registry.is_child_of("MS:0000000", "MS:1000572").is_err());
    }

    #[test]
    fn test_name_lookup_skips_obsolete() {
        let registry =
            ControlledVocabularyRegistry::load("psi-ms", OBO_SNIPPET.as_bytes()).unwrap();
        let term = registry.term_by_name("zlib compression").unwrap();
        assert_eq!(term.id, "MS:1000574");
    }

    #[test]
    fn test_value_type_and_units() {
        let registry =
            ControlledVocabularyRegistry::load("psi-ms", OBO_SNIPPET.as_bytes()).unwrap();
        let term = registry.term("MS:1000514").unwrap();
        assert_eq!(term.xref_type, XsdType::Decimal);
        assert!(term.units.contains("MS:1000040"));
        assert_eq!(
            registry.term("MS:1000572").unwrap().definition,
            "Compression types for binary data arrays."
        );
    }

    #[test]
    fn test_children_inverted() {
        let registry =
            ControlledVocabularyRegistry::load("psi-ms", OBO_SNIPPET.as_bytes()).unwrap();
        let parent = registry.term("MS:1000572").unwrap();
        assert!(parent.children.contains("MS:1000574"));
    }

    #[test]
    fn test_typed_value_parsing() {
        assert_eq!(
            XsdType::Integer.parse_value("42").unwrap(),
            CvValue::Int(42)
        );
        assert!(XsdType::NonNegativeInteger.parse_value("-1").is_err());
        assert!(XsdType::PositiveInteger.parse_value("0").is_err());
        assert_eq!(
            XsdType::NegativeInteger.parse_value("-3").unwrap(),
            CvValue::Int(-3)
        );
        assert_eq!(
            XsdType::Decimal.parse_value("1.5e3").unwrap(),
            CvValue::Decimal(1500.0)
        );
        assert_eq!(
            XsdType::Boolean.parse_value("true").unwrap(),
            CvValue::Bool(true)
        );
        assert!(XsdType::Boolean.parse_value("yes").is_err());
        assert_eq!(
            XsdType::Date.parse_value("2024-03-01").unwrap(),
            CvValue::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(XsdType::Date.parse_value("not-a-date").is_err());
        assert_eq!(
            XsdType::AnyUri.parse_value("https://example.org").unwrap(),
            CvValue::Uri("https://example.org".to_string())
        );
    }

    #[test]
    fn test_integer_flavours() {
        assert_eq!(
            XsdType::from_token("xref:value-type:xsd:nonNegativeInteger"),
            Some(XsdType::NonNegativeInteger)
        );
        assert_eq!(
            XsdType::from_token("xref:value-type:xsd:integer"),
            Some(XsdType::Integer)
        );
        assert_eq!(
            XsdType::from_token("xref:value-type:xsd:anyURI"),
            Some(XsdType::AnyUri)
        );
        assert_eq!(XsdType::from_token("xref:something-else"), None);
    }
}
