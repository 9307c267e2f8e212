//! RDFa evaluation context and attribute value resolution.
//!
//! The initial context (default prefixes and terms every RDFa 1.1 document
//! starts with) is a compile-time `phf` table. Prefixes declared by the
//! document live in the [`Scope`] and shadow the initial ones.

use std::collections::HashMap;
use std::rc::Rc;

use phf::phf_map;
use unicode_xid::UnicodeXID;

use super::iri;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFA_NS: &str = "http://www.w3.org/ns/rdfa#";
pub const RDFA_USES_VOCABULARY: &str = "http://www.w3.org/ns/rdfa#usesVocabulary";
pub const DCTERMS_DESCRIPTION: &str = "http://purl.org/dc/terms/description";
pub const XHV_NS: &str = "http://www.w3.org/1999/xhtml/vocab#";

/// RDFa 1.1 initial context: prefixes.
static INITIAL_PREFIXES: phf::Map<&'static str, &'static str> = phf_map! {
    "as" => "https://www.w3.org/ns/activitystreams#",
    "cc" => "http://creativecommons.org/ns#",
    "csvw" => "http://www.w3.org/ns/csvw#",
    "ctag" => "http://commontag.org/ns#",
    "dc" => "http://purl.org/dc/terms/",
    "dc11" => "http://purl.org/dc/elements/1.1/",
    "dcat" => "http://www.w3.org/ns/dcat#",
    "dcterms" => "http://purl.org/dc/terms/",
    "dqv" => "http://www.w3.org/ns/dqv#",
    "duv" => "https://www.w3.org/ns/duv#",
    "foaf" => "http://xmlns.com/foaf/0.1/",
    "gr" => "http://purl.org/goodrelations/v1#",
    "grddl" => "http://www.w3.org/2003/g/data-view#",
    "ical" => "http://www.w3.org/2002/12/cal/icaltzd#",
    "jsonld" => "http://www.w3.org/ns/json-ld#",
    "ldp" => "http://www.w3.org/ns/ldp#",
    "ma" => "http://www.w3.org/ns/ma-ont#",
    "oa" => "http://www.w3.org/ns/oa#",
    "odrl" => "http://www.w3.org/ns/odrl/2/",
    "og" => "http://ogp.me/ns#",
    "org" => "http://www.w3.org/ns/org#",
    "owl" => "http://www.w3.org/2002/07/owl#",
    "prov" => "http://www.w3.org/ns/prov#",
    "qb" => "http://purl.org/linked-data/cube#",
    "rdf" => "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
    "rdfa" => "http://www.w3.org/ns/rdfa#",
    "rdfs" => "http://www.w3.org/2000/01/rdf-schema#",
    "rev" => "http://purl.org/stuff/rev#",
    "rif" => "http://www.w3.org/2007/rif#",
    "rr" => "http://www.w3.org/ns/r2rml#",
    "schema" => "http://schema.org/",
    "sd" => "http://www.w3.org/ns/sparql-service-description#",
    "sioc" => "http://rdfs.org/sioc/ns#",
    "skos" => "http://www.w3.org/2004/02/skos/core#",
    "skosxl" => "http://www.w3.org/2008/05/skos-xl#",
    "sosa" => "http://www.w3.org/ns/sosa/",
    "ssn" => "http://www.w3.org/ns/ssn/",
    "time" => "http://www.w3.org/2006/time#",
    "v" => "http://rdf.data-vocabulary.org/#",
    "vcard" => "http://www.w3.org/2006/vcard/ns#",
    "void" => "http://rdfs.org/ns/void#",
    "wdr" => "http://www.w3.org/2007/05/powder#",
    "wdrs" => "http://www.w3.org/2007/05/powder-s#",
    "xhv" => "http://www.w3.org/1999/xhtml/vocab#",
    "xml" => "http://www.w3.org/XML/1998/namespace",
    "xsd" => "http://www.w3.org/2001/XMLSchema#",
};

/// RDFa 1.1 initial context: terms. Matched case-insensitively.
static INITIAL_TERMS: phf::Map<&'static str, &'static str> = phf_map! {
    "describedby" => "http://www.w3.org/2007/05/powder-s#describedby",
    "license" => "http://www.w3.org/1999/xhtml/vocab#license",
    "role" => "http://www.w3.org/1999/xhtml/vocab#role",
};

/// Processor-graph warning classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningClass {
    UnresolvedTerm,
    UnresolvedCurie,
    PrefixRedefinition,
    DocumentError,
}

impl WarningClass {
    /// The `rdfa:` class IRI.
    pub fn iri(self) -> &'static str {
        match self {
            Self::UnresolvedTerm => "http://www.w3.org/ns/rdfa#UnresolvedTerm",
            Self::UnresolvedCurie => "http://www.w3.org/ns/rdfa#UnresolvedCURIE",
            Self::PrefixRedefinition => "http://www.w3.org/ns/rdfa#PrefixRedefinition",
            Self::DocumentError => "http://www.w3.org/ns/rdfa#DocumentError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub class: WarningClass,
    pub message: String,
}

impl Warning {
    fn new(class: WarningClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// A `@rel`/`@rev` predicate waiting for a descendant to supply its object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incomplete {
    pub predicate: String,
    /// `true` for `@rel` (parent → child), `false` for `@rev` (child → parent).
    pub forward: bool,
}

/// The evaluation context handed from an element to its children.
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent_subject: Rc<str>,
    pub parent_object: Option<Rc<str>>,
    pub incomplete: Rc<Vec<Incomplete>>,
    pub language: Option<Rc<str>>,
    pub vocab: Option<Rc<str>>,
    prefixes: Rc<HashMap<String, String>>,
}

impl Scope {
    /// The context of the document itself.
    pub fn root(base: &str) -> Self {
        Self {
            parent_subject: Rc::from(base),
            parent_object: None,
            incomplete: Rc::new(Vec::new()),
            language: None,
            vocab: None,
            prefixes: Rc::new(HashMap::new()),
        }
    }

    /// Declare `prefix` for this scope and its descendants.
    ///
    /// Prefixes are case-insensitive and stored lowercased.
    pub fn declare_prefix(&mut self, prefix: &str, namespace: &str) -> Result<(), Warning> {
        if prefix == "_" {
            return Err(Warning::new(
                WarningClass::PrefixRedefinition,
                "the '_' prefix is reserved for blank nodes",
            ));
        }
        if !is_ncname(prefix) {
            return Err(Warning::new(
                WarningClass::PrefixRedefinition,
                format!("'{prefix}' is not a valid prefix name"),
            ));
        }
        Rc::make_mut(&mut self.prefixes).insert(prefix.to_lowercase(), namespace.to_string());
        Ok(())
    }

    pub fn lookup_prefix(&self, prefix: &str) -> Option<&str> {
        let lower = prefix.to_lowercase();
        if let Some(namespace) = self.prefixes.get(&lower) {
            return Some(namespace.as_str());
        }
        INITIAL_PREFIXES.get(lower.as_str()).copied()
    }

    /// Expand `prefix:reference` if the prefix is known.
    ///
    /// `_:` labels pass through unchanged; the empty prefix is the XHTML
    /// vocabulary.
    fn expand_curie(&self, value: &str) -> Option<String> {
        let colon = memchr::memchr(b':', value.as_bytes())?;
        let (prefix, reference) = (&value[..colon], &value[colon + 1..]);
        if prefix == "_" {
            return Some(value.to_string());
        }
        if prefix.is_empty() {
            return Some(format!("{XHV_NS}{reference}"));
        }
        self.lookup_prefix(prefix)
            .map(|namespace| format!("{namespace}{reference}"))
    }

    /// Resolve a `@property`, `@typeof`, `@rel`, `@rev` or `@datatype` token:
    /// a term, a CURIE, or an absolute IRI.
    pub fn resolve_term_or_curie(&self, token: &str) -> Result<String, Warning> {
        if memchr::memchr(b':', token.as_bytes()).is_some() {
            if let Some(expanded) = self.expand_curie(token) {
                return Ok(expanded);
            }
            if iri::is_absolute(token) {
                return Ok(token.to_string());
            }
            return Err(Warning::new(
                WarningClass::UnresolvedCurie,
                format!("unresolved CURIE '{token}'"),
            ));
        }
        if let Some(vocab) = &self.vocab {
            return Ok(format!("{vocab}{token}"));
        }
        INITIAL_TERMS
            .get(token.to_lowercase().as_str())
            .map(|term| term.to_string())
            .ok_or_else(|| Warning::new(WarningClass::UnresolvedTerm, format!("unresolved term '{token}'")))
    }

    /// Resolve an `@about` or `@resource` value: a safe CURIE, a CURIE, or an
    /// IRI reference.
    pub fn resolve_about(&self, value: &str, base: &str) -> Result<String, Warning> {
        if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            return self.expand_curie(inner).ok_or_else(|| {
                Warning::new(
                    WarningClass::UnresolvedCurie,
                    format!("unresolved safe CURIE '{value}'"),
                )
            });
        }
        if let Some(expanded) = self.expand_curie(value) {
            // An IRI whose scheme happens to be a declared prefix still reads
            // as a CURIE, matching the RDFa 1.1 processing rules.
            return Ok(expanded);
        }
        Ok(iri::resolve(base, value))
    }
}

/// NCName check for prefix names, using Unicode identifier classes.
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_xid_start() => {}
        _ => return false,
    }
    chars.all(|c| c == '-' || c == '.' || c.is_xid_continue())
}

/// Parse an `@prefix` attribute: whitespace-separated `name: iri` pairs.
///
/// Malformed pairs are skipped and reported.
pub fn parse_prefix_attr(value: &str) -> (Vec<(String, String)>, Vec<Warning>) {
    let mut pairs = Vec::new();
    let mut warnings = Vec::new();
    let mut tokens = value.split_ascii_whitespace();

    while let Some(token) = tokens.next() {
        let Some(name) = token.strip_suffix(':') else {
            warnings.push(Warning::new(
                WarningClass::PrefixRedefinition,
                format!("expected 'prefix:' in @prefix, found '{token}'"),
            ));
            continue;
        };
        match tokens.next() {
            Some(namespace) => pairs.push((name.to_string(), namespace.to_string())),
            None => warnings.push(Warning::new(
                WarningClass::PrefixRedefinition,
                format!("prefix '{name}' has no namespace IRI"),
            )),
        }
    }
    (pairs, warnings)
}
