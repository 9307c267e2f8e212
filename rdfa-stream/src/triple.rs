//! Triples as seen by the consumer.
//!
//! The engine hands the bridge a [`RawTriple`](crate::engine::RawTriple)
//! whose object kind is a bare integer code. That code is translated exactly
//! once, in the emission adapter, into the closed [`ObjectKind`] enum below;
//! nothing past the adapter ever sees the raw number.
//!
//! [`Triple`] borrows its strings from the engine's allocation, which is
//! released as soon as the consumer callback returns. Consumers that want to
//! keep a triple call [`Triple::to_owned_triple`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// `rdf:XMLLiteral`, the datatype attached to XML literals.
pub const RDF_XML_LITERAL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#XMLLiteral";

/// Raw object-type codes used by the parse engine.
///
/// These mirror the numbering of the C RDFa engine the bridge was first
/// written against, so engines wrapping it can pass codes through untouched.
pub mod raw {
    /// A prefix declaration: predicate is the prefix, object the namespace IRI.
    pub const NAMESPACE_PREFIX: u8 = 0;
    /// Object is an IRI or a `_:` blank node label.
    pub const IRI: u8 = 1;
    /// Object is a plain literal, optionally language tagged.
    pub const PLAIN_LITERAL: u8 = 2;
    /// Object is an XML literal.
    pub const XML_LITERAL: u8 = 3;
    /// Object is a literal with an explicit datatype.
    pub const TYPED_LITERAL: u8 = 4;
    /// The engine could not classify the object.
    pub const UNKNOWN: u8 = 5;
}

/// Which logical output stream a triple belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputGraph {
    /// Facts extracted from document content.
    Default,
    /// Facts about the parse itself: warnings, vocabulary usage.
    Processor,
}

impl OutputGraph {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputGraph::Default => "default",
            OutputGraph::Processor => "processor",
        }
    }
}

impl fmt::Display for OutputGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of a triple's object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// An IRI reference.
    Resource,
    /// A blank node label (`_:name`).
    BlankNode,
    /// A literal; see [`Triple::datatype`] and [`Triple::language`].
    Literal,
}

/// What a raw object-type code means once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decoded {
    Object(ObjectKind),
    /// An XML literal: a [`ObjectKind::Literal`] that gets `rdf:XMLLiteral`.
    XmlLiteral,
    Namespace,
}

impl ObjectKind {
    /// Decode a raw engine code.
    ///
    /// IRI objects are split on the `_:` label prefix into resources and
    /// blank nodes. Returns `None` for codes outside the known range.
    pub(crate) fn decode(code: u8, object: &str) -> Option<Decoded> {
        match code {
            raw::NAMESPACE_PREFIX => Some(Decoded::Namespace),
            raw::IRI if object.starts_with("_:") => Some(Decoded::Object(ObjectKind::BlankNode)),
            raw::IRI => Some(Decoded::Object(ObjectKind::Resource)),
            raw::PLAIN_LITERAL | raw::TYPED_LITERAL => Some(Decoded::Object(ObjectKind::Literal)),
            raw::XML_LITERAL => Some(Decoded::XmlLiteral),
            _ => None,
        }
    }
}

/// One extracted fact, borrowed for the duration of a consumer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple<'a> {
    pub subject: &'a str,
    pub predicate: &'a str,
    pub object: &'a str,
    pub object_kind: ObjectKind,
    /// Only meaningful for literals.
    pub datatype: Option<&'a str>,
    /// Only meaningful for plain literals.
    pub language: Option<&'a str>,
}

impl<'a> Triple<'a> {
    /// Copy the triple out of the engine's storage.
    pub fn to_owned_triple(&self) -> OwnedTriple {
        OwnedTriple {
            subject: self.subject.to_string(),
            predicate: self.predicate.to_string(),
            object: self.object.to_string(),
            object_kind: self.object_kind,
            datatype: self.datatype.map(str::to_string),
            language: self.language.map(str::to_string),
        }
    }

    #[inline]
    pub fn is_literal(&self) -> bool {
        self.object_kind == ObjectKind::Literal
    }
}

impl fmt::Display for Triple<'_> {
    /// Renders the triple as an N-Triples statement (without the newline).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self.subject)?;
        f.write_str(" ")?;
        write_term(f, self.predicate)?;
        f.write_str(" ")?;
        match self.object_kind {
            ObjectKind::Resource | ObjectKind::BlankNode => write_term(f, self.object)?,
            ObjectKind::Literal => {
                f.write_str("\"")?;
                write_escaped(f, self.object)?;
                f.write_str("\"")?;
                if let Some(language) = self.language {
                    write!(f, "@{language}")?;
                } else if let Some(datatype) = self.datatype {
                    write!(f, "^^<{datatype}>")?;
                }
            }
        }
        f.write_str(" .")
    }
}

/// A triple that owns its strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnedTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub object_kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl OwnedTriple {
    /// Borrow as a [`Triple`].
    pub fn as_triple(&self) -> Triple<'_> {
        Triple {
            subject: &self.subject,
            predicate: &self.predicate,
            object: &self.object,
            object_kind: self.object_kind,
            datatype: self.datatype.as_deref(),
            language: self.language.as_deref(),
        }
    }
}

impl fmt::Display for OwnedTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_triple().fmt(f)
    }
}

/// Subjects and predicates are IRIs unless they carry a blank node label.
fn write_term(f: &mut fmt::Formatter<'_>, term: &str) -> fmt::Result {
    if term.starts_with("_:") {
        f.write_str(term)
    } else {
        write!(f, "<{term}>")
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let mut last = 0;
    for (idx, ch) in value.char_indices() {
        let escape = match ch {
            '"' => "\\\"",
            '\\' => "\\\\",
            '\n' => "\\n",
            '\r' => "\\r",
            '\t' => "\\t",
            _ => continue,
        };
        f.write_str(&value[last..idx])?;
        f.write_str(escape)?;
        last = idx + ch.len_utf8();
    }
    f.write_str(&value[last..])
}
