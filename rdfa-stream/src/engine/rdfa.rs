//! Bundled RDFa 1.1 engine.
//!
//! Markup is tokenized by `quick-xml`, reading through a [`HookReader`] so
//! every byte arrives via the bridge's fill hook. Elements are processed as
//! their start tags are seen; the evaluation context lives on an element
//! stack instead of the call stack, so arbitrarily long documents stream in
//! constant memory per nesting level.
//!
//! Triples go out as soon as they are known. The one exception is a
//! `@property` whose value is the element's text: that literal is complete
//! only at the end tag, and is emitted then.

use std::collections::HashMap;
use std::io::BufReader;
use std::rc::Rc;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use super::context::{
    self, Incomplete, Scope, Warning, WarningClass, DCTERMS_DESCRIPTION, RDFA_USES_VOCABULARY,
    RDF_TYPE,
};
use super::{iri, EngineError, EngineHooks, HookReader, Interrupted, ParseEngine, RawTriple};
use crate::config::{BridgeConfig, EngineConfig};
use crate::error::{BridgeError, EngineFault};
use crate::triple::{raw, OutputGraph, RDF_XML_LITERAL};

/// HTML elements that never have content or an end tag.
const VOID_ELEMENTS: [&[u8]; 14] = [
    b"area", b"base", b"br", b"col", b"embed", b"hr", b"img", b"input", b"link", b"meta",
    b"param", b"source", b"track", b"wbr",
];

/// Predicate used as subject of prefix declarations reported to the consumer.
const PREFIX_SUBJECT: &str = "@prefix";

/// RDFa engine for one document.
#[derive(Debug)]
pub struct RdfaEngine {
    base: String,
    config: EngineConfig,
    buffer_capacity: usize,
    consumed: bool,
}

impl RdfaEngine {
    /// Seed an engine with the document's base identifier.
    ///
    /// The base must be an absolute IRI.
    pub fn new(base: &str, config: &BridgeConfig) -> Result<Self, BridgeError> {
        if base.is_empty() {
            return Err(BridgeError::Initialization("base identifier is empty".into()));
        }
        if base.chars().any(char::is_whitespace) {
            return Err(BridgeError::Initialization(format!(
                "base identifier {base:?} contains whitespace"
            )));
        }
        if !iri::is_absolute(base) {
            return Err(BridgeError::Initialization(format!(
                "base identifier {base:?} is not an absolute IRI"
            )));
        }
        config
            .validate()
            .map_err(|err| BridgeError::Initialization(err.to_string()))?;

        Ok(Self {
            base: base.to_string(),
            config: config.engine.clone(),
            buffer_capacity: config.chunk_capacity,
            consumed: false,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

impl ParseEngine for RdfaEngine {
    fn parse(&mut self, hooks: &dyn EngineHooks) -> Result<(), EngineError> {
        if self.consumed {
            return Err(EngineFault::internal("engine has already parsed its input").into());
        }
        self.consumed = true;

        let source = BufReader::with_capacity(self.buffer_capacity, HookReader::new(hooks));
        let mut processor = Processor::new(&self.base, &self.config, hooks);
        processor.run(source)
    }
}

/// RDFa attributes of one element, decoded and unescaped.
#[derive(Debug, Default)]
struct Attrs {
    about: Option<String>,
    resource: Option<String>,
    href: Option<String>,
    src: Option<String>,
    type_of: Option<String>,
    property: Option<String>,
    content: Option<String>,
    datatype: Option<String>,
    rel: Option<String>,
    rev: Option<String>,
    vocab: Option<String>,
    prefix: Option<String>,
    lang: Option<String>,
    xmlns: Vec<(String, String)>,
}

impl Attrs {
    fn collect(start: &BytesStart<'_>, position: u64) -> Result<Self, EngineError> {
        let mut attrs = Attrs::default();
        for attr in start.html_attributes() {
            let attr = attr.map_err(|err| EngineFault::malformed(position, err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = decode(&attr.value);

            if let Some(prefix) = key.strip_prefix("xmlns:") {
                attrs.xmlns.push((prefix.to_string(), value));
                continue;
            }
            let slot = match key.as_str() {
                "about" => &mut attrs.about,
                "resource" => &mut attrs.resource,
                "href" => &mut attrs.href,
                "src" => &mut attrs.src,
                "typeof" => &mut attrs.type_of,
                "property" => &mut attrs.property,
                "content" => &mut attrs.content,
                "datatype" => &mut attrs.datatype,
                "rel" => &mut attrs.rel,
                "rev" => &mut attrs.rev,
                "vocab" => &mut attrs.vocab,
                "prefix" => &mut attrs.prefix,
                // xml:lang wins over lang
                "xml:lang" => {
                    attrs.lang = Some(value);
                    continue;
                }
                "lang" => &mut attrs.lang,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        Ok(attrs)
    }
}

/// How `@datatype` was given.
enum Datatype {
    Absent,
    /// Present but empty: forces a plain literal.
    Empty,
    Iri(String),
}

/// A text-valued `@property` waiting for its element to close.
#[derive(Debug)]
struct PendingLiteral {
    subject: Rc<str>,
    predicates: Vec<String>,
    datatype: Option<String>,
    language: Option<Rc<str>>,
    text: String,
}

#[derive(Debug)]
struct Frame {
    name: Vec<u8>,
    /// Context for the children of this element.
    scope: Scope,
    literal: Option<PendingLiteral>,
}

struct Processor<'a> {
    hooks: &'a dyn EngineHooks,
    config: &'a EngineConfig,
    /// Current document base; `<base href>` may move it.
    base: String,
    root: Scope,
    stack: Vec<Frame>,
    blank_nodes: u64,
    /// Blank node labels written in the document, renamed to generated ones.
    labels: HashMap<String, Rc<str>>,
    warnings: u64,
}

impl<'a> Processor<'a> {
    fn new(base: &str, config: &'a EngineConfig, hooks: &'a dyn EngineHooks) -> Self {
        Self {
            hooks,
            config,
            base: base.to_string(),
            root: Scope::root(base),
            stack: Vec::with_capacity(32),
            blank_nodes: 0,
            labels: HashMap::new(),
            warnings: 0,
        }
    }

    fn run(&mut self, source: BufReader<HookReader<'_>>) -> Result<(), EngineError> {
        let mut reader = Reader::from_reader(source);
        {
            let config = reader.config_mut();
            // End tags are matched here so that HTML void elements can be tolerated.
            config.check_end_names = false;
            config.expand_empty_elements = false;
        }

        let mut buf = Vec::new();
        loop {
            buf.clear();
            let position = reader.buffer_position() as u64;
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => {
                    if reader.get_ref().get_ref().is_interrupted() {
                        return Err(Interrupted.into());
                    }
                    let position = reader.error_position() as u64;
                    return Err(EngineFault::malformed(position, err.to_string()).into());
                }
            };

            match event {
                Event::Start(start) => {
                    self.open_element(&start, position)?;
                    if self.config.html_void_elements && is_void(start.local_name().as_ref()) {
                        self.close_top()?;
                    }
                }
                Event::Empty(start) => {
                    self.open_element(&start, position)?;
                    self.close_top()?;
                }
                Event::End(end) => self.end_element(end.name().as_ref(), position)?,
                Event::Text(text) => self.append_text(&decode(&text)),
                Event::CData(data) => self.append_text(&String::from_utf8_lossy(&data)),
                Event::Eof => break,
                _ => {}
            }
        }

        self.finish()?;
        debug!(
            blank_nodes = self.blank_nodes,
            warnings = self.warnings,
            "rdfa engine reached end of input"
        );
        Ok(())
    }

    fn open_element(&mut self, start: &BytesStart<'_>, position: u64) -> Result<(), EngineError> {
        if self.stack.len() >= self.config.max_depth {
            return Err(EngineFault::malformed(
                position,
                format!("elements nested deeper than {}", self.config.max_depth),
            )
            .into());
        }
        let attrs = Attrs::collect(start, position)?;

        if start.local_name().as_ref().eq_ignore_ascii_case(b"base") {
            if let Some(href) = &attrs.href {
                self.base = iri::resolve(&self.base, href);
                debug!(base = %self.base, "document base changed");
            }
        }

        let parent = self
            .stack
            .last()
            .map_or(&self.root, |frame| &frame.scope)
            .clone();
        let frame = self.process(start.name().as_ref().to_vec(), attrs, parent)?;
        self.stack.push(frame);
        Ok(())
    }

    /// Apply the RDFa processing rules to one start tag.
    fn process(&mut self, name: Vec<u8>, mut attrs: Attrs, parent: Scope) -> Result<Frame, EngineError> {
        let is_root = self.stack.is_empty();
        let document: Rc<str> = Rc::from(self.base.as_str());
        let mut local = parent.clone();

        if let Some(vocab) = attrs.vocab.as_deref() {
            if vocab.is_empty() {
                local.vocab = None;
            } else {
                let vocab = iri::resolve(&self.base, vocab);
                self.emit(
                    OutputGraph::Default,
                    RawTriple::new(self.base.as_str(), RDFA_USES_VOCABULARY, vocab.as_str(), raw::IRI),
                )?;
                local.vocab = Some(Rc::from(vocab));
            }
        }

        let mut declared = std::mem::take(&mut attrs.xmlns);
        if let Some(prefix_attr) = attrs.prefix.as_deref() {
            let (pairs, warnings) = context::parse_prefix_attr(prefix_attr);
            for warning in warnings {
                self.warn(warning)?;
            }
            declared.extend(pairs);
        }
        for (prefix, namespace) in declared {
            match local.declare_prefix(&prefix, &namespace) {
                Ok(()) if self.config.emit_prefix_mappings => self.emit(
                    OutputGraph::Processor,
                    RawTriple::new(PREFIX_SUBJECT, prefix, namespace, raw::NAMESPACE_PREFIX),
                )?,
                Ok(()) => {}
                Err(warning) => self.warn(warning)?,
            }
        }

        if let Some(lang) = attrs.lang.as_deref() {
            local.language = (!lang.is_empty()).then(|| Rc::from(lang));
        }

        let types = self.resolve_tokens(&local, attrs.type_of.as_deref())?;
        let rels = self.resolve_tokens(&local, attrs.rel.as_deref())?;
        let revs = self.resolve_tokens(&local, attrs.rev.as_deref())?;
        let properties = self.resolve_tokens(&local, attrs.property.as_deref())?;
        let about = self.resolve_resource(&local, attrs.about.as_deref())?;
        let object_attr = match self.resolve_resource(&local, attrs.resource.as_deref())? {
            Some(resource) => Some(resource),
            None => attrs
                .href
                .as_deref()
                .or(attrs.src.as_deref())
                .map(|value| Rc::from(iri::resolve(&self.base, value))),
        };

        let has_rel_rev = attrs.rel.is_some() || attrs.rev.is_some();
        let mut skip = false;
        let mut new_subject: Option<Rc<str>>;
        let mut current_object: Option<Rc<str>> = None;
        let mut typed_resource: Option<Rc<str>> = None;

        if !has_rel_rev {
            if attrs.property.is_some() && attrs.content.is_none() && attrs.datatype.is_none() {
                new_subject = about
                    .clone()
                    .or_else(|| is_root.then(|| document.clone()))
                    .or_else(|| parent.parent_object.clone());
                if attrs.type_of.is_some() {
                    let typed = match (&about, &object_attr) {
                        (Some(about), _) => about.clone(),
                        (None, _) if is_root => document.clone(),
                        (None, Some(object)) => object.clone(),
                        (None, None) => self.next_blank(),
                    };
                    typed_resource = Some(typed.clone());
                    current_object = Some(typed);
                }
            } else {
                new_subject = about.clone().or_else(|| object_attr.clone());
                if new_subject.is_none() {
                    if is_root {
                        new_subject = Some(document.clone());
                    } else if attrs.type_of.is_some() {
                        new_subject = Some(self.next_blank());
                    } else {
                        new_subject = parent.parent_object.clone();
                        skip = attrs.property.is_none();
                    }
                }
                if attrs.type_of.is_some() {
                    typed_resource = new_subject.clone();
                }
            }
        } else {
            new_subject = about.clone();
            if attrs.type_of.is_some() {
                typed_resource = new_subject.clone();
            }
            if new_subject.is_none() {
                new_subject = if is_root {
                    Some(document.clone())
                } else {
                    parent.parent_object.clone()
                };
            }
            current_object = object_attr.clone();
            if attrs.type_of.is_some() && attrs.about.is_none() {
                if current_object.is_none() {
                    current_object = Some(self.next_blank());
                }
                typed_resource = current_object.clone();
            }
        }

        if let Some(typed) = &typed_resource {
            for type_iri in &types {
                self.emit(
                    OutputGraph::Default,
                    RawTriple::new(typed.to_string(), RDF_TYPE, type_iri.as_str(), raw::IRI),
                )?;
            }
        }

        let mut incomplete = Vec::new();
        if has_rel_rev {
            match (new_subject.clone(), current_object.clone()) {
                (Some(subject), Some(object)) => {
                    for rel in &rels {
                        self.emit(
                            OutputGraph::Default,
                            RawTriple::new(subject.to_string(), rel.as_str(), object.to_string(), raw::IRI),
                        )?;
                    }
                    for rev in &revs {
                        self.emit(
                            OutputGraph::Default,
                            RawTriple::new(object.to_string(), rev.as_str(), subject.to_string(), raw::IRI),
                        )?;
                    }
                }
                _ => {
                    incomplete.extend(rels.iter().map(|predicate| Incomplete {
                        predicate: predicate.clone(),
                        forward: true,
                    }));
                    incomplete.extend(revs.iter().map(|predicate| Incomplete {
                        predicate: predicate.clone(),
                        forward: false,
                    }));
                    current_object = Some(self.next_blank());
                }
            }
        }

        let mut literal = None;
        if let (Some(subject), false) = (&new_subject, properties.is_empty()) {
            let datatype = match attrs.datatype.as_deref().map(str::trim) {
                None => Datatype::Absent,
                Some("") => Datatype::Empty,
                Some(token) => match local.resolve_term_or_curie(token) {
                    Ok(datatype) => Datatype::Iri(datatype),
                    Err(warning) => {
                        self.warn(warning)?;
                        Datatype::Empty
                    }
                },
            };

            let value = match (datatype, attrs.content.as_deref()) {
                (Datatype::Iri(datatype), Some(content)) => Some(typed_literal(content, datatype)),
                (Datatype::Iri(datatype), None) => {
                    literal = Some(PendingLiteral {
                        subject: subject.clone(),
                        predicates: properties.clone(),
                        datatype: Some(datatype),
                        language: None,
                        text: String::new(),
                    });
                    None
                }
                (_, Some(content)) => Some(plain_literal(content, local.language.as_deref())),
                (Datatype::Absent, None) if !has_rel_rev && object_attr.is_some() => {
                    object_attr.as_deref().map(|object| (object.to_string(), raw::IRI, None, None))
                }
                (Datatype::Absent, None) if attrs.type_of.is_some() && attrs.about.is_none() => {
                    typed_resource.as_deref().map(|object| (object.to_string(), raw::IRI, None, None))
                }
                (_, None) => {
                    literal = Some(PendingLiteral {
                        subject: subject.clone(),
                        predicates: properties.clone(),
                        datatype: None,
                        language: local.language.clone(),
                        text: String::new(),
                    });
                    None
                }
            };

            if let Some((object, code, datatype, language)) = value {
                for property in &properties {
                    let mut triple = RawTriple::new(subject.to_string(), property.as_str(), object.as_str(), code);
                    triple.datatype = datatype.clone();
                    triple.language = language.clone();
                    self.emit(OutputGraph::Default, triple)?;
                }
            }
        }

        if !skip {
            if let Some(subject) = &new_subject {
                for pending in parent.incomplete.iter() {
                    let triple = if pending.forward {
                        RawTriple::new(
                            parent.parent_subject.to_string(),
                            pending.predicate.as_str(),
                            subject.to_string(),
                            raw::IRI,
                        )
                    } else {
                        RawTriple::new(
                            subject.to_string(),
                            pending.predicate.as_str(),
                            parent.parent_subject.to_string(),
                            raw::IRI,
                        )
                    };
                    self.emit(OutputGraph::Default, triple)?;
                }
            }

            local.parent_object = current_object
                .or_else(|| new_subject.clone())
                .or_else(|| Some(parent.parent_subject.clone()));
            local.parent_subject = new_subject.unwrap_or_else(|| parent.parent_subject.clone());
            local.incomplete = Rc::new(incomplete);
        }

        Ok(Frame {
            name,
            scope: local,
            literal,
        })
    }

    fn end_element(&mut self, name: &[u8], position: u64) -> Result<(), EngineError> {
        match self.stack.last() {
            // HTML tag names are case-insensitive; XML ones are not.
            Some(top)
                if top.name == name
                    || (self.config.html_void_elements && top.name.eq_ignore_ascii_case(name)) =>
            {
                self.close_top()
            }
            _ if self.config.html_void_elements && is_void(local_part(name)) => Ok(()),
            Some(top) => Err(EngineFault::malformed(
                position,
                format!(
                    "mismatched end tag: expected </{}>, found </{}>",
                    String::from_utf8_lossy(&top.name),
                    String::from_utf8_lossy(name)
                ),
            )
            .into()),
            None => Err(EngineFault::malformed(
                position,
                format!("unexpected end tag </{}>", String::from_utf8_lossy(name)),
            )
            .into()),
        }
    }

    fn close_top(&mut self) -> Result<(), EngineError> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        match frame.literal {
            Some(literal) => self.emit_literal(literal),
            None => Ok(()),
        }
    }

    fn emit_literal(&self, literal: PendingLiteral) -> Result<(), EngineError> {
        for predicate in &literal.predicates {
            let triple = match &literal.datatype {
                Some(datatype) => {
                    let (object, code, datatype, _) = typed_literal(&literal.text, datatype.clone());
                    let mut triple = RawTriple::new(literal.subject.to_string(), predicate.as_str(), object, code);
                    triple.datatype = datatype;
                    triple
                }
                None => {
                    let triple = RawTriple::new(
                        literal.subject.to_string(),
                        predicate.as_str(),
                        literal.text.as_str(),
                        raw::PLAIN_LITERAL,
                    );
                    match &literal.language {
                        Some(language) => triple.with_language(language.to_string()),
                        None => triple,
                    }
                }
            };
            self.emit(OutputGraph::Default, triple)?;
        }
        Ok(())
    }

    fn append_text(&mut self, text: &str) {
        for frame in &mut self.stack {
            if let Some(literal) = &mut frame.literal {
                literal.text.push_str(text);
            }
        }
    }

    /// Close whatever the document left open.
    fn finish(&mut self) -> Result<(), EngineError> {
        let unclosed = self.stack.len();
        while !self.stack.is_empty() {
            self.close_top()?;
        }
        if unclosed > 0 {
            self.warn(Warning {
                class: WarningClass::DocumentError,
                message: format!("{unclosed} element(s) still open at end of input"),
            })?;
        }
        Ok(())
    }

    fn resolve_tokens(&mut self, scope: &Scope, value: Option<&str>) -> Result<Vec<String>, EngineError> {
        let mut resolved = Vec::new();
        for token in value.unwrap_or_default().split_ascii_whitespace() {
            match scope.resolve_term_or_curie(token) {
                Ok(iri) => resolved.push(iri),
                Err(warning) => self.warn(warning)?,
            }
        }
        Ok(resolved)
    }

    fn resolve_resource(&mut self, scope: &Scope, value: Option<&str>) -> Result<Option<Rc<str>>, EngineError> {
        let Some(value) = value else {
            return Ok(None);
        };
        match scope.resolve_about(value, &self.base) {
            Ok(label) if label.starts_with("_:") => Ok(Some(self.authored_blank(label))),
            Ok(iri) => Ok(Some(Rc::from(iri))),
            Err(warning) => {
                self.warn(warning)?;
                Ok(None)
            }
        }
    }

    /// Map an authored `_:label` onto the generated namespace, so it can
    /// never meet a node minted by [`Self::next_blank`].
    fn authored_blank(&mut self, label: String) -> Rc<str> {
        if let Some(node) = self.labels.get(&label) {
            return node.clone();
        }
        let node = self.next_blank();
        self.labels.insert(label, node.clone());
        node
    }

    fn next_blank(&mut self) -> Rc<str> {
        let id = self.blank_nodes;
        self.blank_nodes += 1;
        Rc::from(format!("_:b{id}"))
    }

    /// Report a warning to the processor graph.
    fn warn(&mut self, warning: Warning) -> Result<(), EngineError> {
        debug!(class = ?warning.class, message = %warning.message, "rdfa processor warning");
        self.warnings += 1;
        if !self.config.emit_warnings {
            return Ok(());
        }
        let node = self.next_blank();
        self.emit(
            OutputGraph::Processor,
            RawTriple::new(node.to_string(), RDF_TYPE, warning.class.iri(), raw::IRI),
        )?;
        self.emit(
            OutputGraph::Processor,
            RawTriple::new(node.to_string(), DCTERMS_DESCRIPTION, warning.message, raw::PLAIN_LITERAL),
        )
    }

    #[inline]
    fn emit(&self, graph: OutputGraph, triple: RawTriple) -> Result<(), EngineError> {
        self.hooks.emit_triple(graph, triple).map_err(EngineError::from)
    }
}

type LiteralParts = (String, u8, Option<String>, Option<String>);

fn typed_literal(value: &str, datatype: String) -> LiteralParts {
    let code = if datatype == RDF_XML_LITERAL {
        raw::XML_LITERAL
    } else {
        raw::TYPED_LITERAL
    };
    (value.to_string(), code, Some(datatype), None)
}

fn plain_literal(value: &str, language: Option<&str>) -> LiteralParts {
    (value.to_string(), raw::PLAIN_LITERAL, None, language.map(str::to_string))
}

/// Decode bytes as UTF-8 and expand character references and HTML5 named
/// entities. An entity that cannot be resolved is kept verbatim on its own.
fn decode(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    if memchr::memchr(b'&', raw.as_bytes()).is_none() {
        return raw.into_owned();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest: &str = &raw;
    while let Some(amp) = memchr::memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match memchr::memchr2(b'&', b';', &tail.as_bytes()[1..]) {
            Some(end) if tail.as_bytes()[end + 1] == b';' => {
                let entity = &tail[..end + 2];
                match unescape_with(entity, resolve_html5_entity) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(entity),
                }
                rest = &tail[end + 2..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn local_part(name: &[u8]) -> &[u8] {
    match memchr::memrchr(b':', name) {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

fn is_void(name: &[u8]) -> bool {
    VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(name))
}
