//! Shared harness for integration tests.
//!
//! - `Recorder` - consumer that replays scripted chunks and records callbacks
//! - `ScriptedEngine` - engine that performs a fixed list of hook calls
//! - `chunks_of` / `split_at_points` - input chunking helpers

#![allow(dead_code)]

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rdfa_stream::{
    BridgeConfig, Consumer, ConsumerError, EngineError, EngineFault, EngineHooks, OutputGraph,
    OwnedTriple, ParseEngine, ParseOutcome, RawTriple, Session, Triple,
};

pub const BASE: &str = "http://example.org/";

/// Every callback a consumer saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fill { max_len: usize },
    Triple(OutputGraph, OwnedTriple),
    Namespace(String, String),
}

/// Consumer replaying pre-cut chunks. Chunks are returned as-is, even when
/// longer than requested.
#[derive(Debug, Default)]
pub struct Recorder {
    pub chunks: VecDeque<Vec<u8>>,
    pub calls: Vec<Call>,
    /// Zero-based fill call that fails.
    pub fail_fill_at: Option<usize>,
    /// Zero-based triple delivery that fails.
    pub fail_triple_at: Option<usize>,
    fills: usize,
    deliveries: usize,
}

impl Recorder {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn document(document: &str) -> Self {
        Self::new([document.as_bytes().to_vec()])
    }

    pub fn fills(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Fill { max_len } => Some(*max_len),
                _ => None,
            })
            .collect()
    }

    pub fn triples(&self) -> Vec<(OutputGraph, OwnedTriple)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Triple(graph, triple) => Some((*graph, triple.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn graph(&self, wanted: OutputGraph) -> Vec<OwnedTriple> {
        self.triples()
            .into_iter()
            .filter(|(graph, _)| *graph == wanted)
            .map(|(_, triple)| triple)
            .collect()
    }

    pub fn namespaces(&self) -> Vec<(String, String)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Namespace(prefix, iri) => Some((prefix.clone(), iri.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Consumer for Recorder {
    fn produce_next_chunk(&mut self, max_len: usize) -> Result<Cow<'_, [u8]>, ConsumerError> {
        self.calls.push(Call::Fill { max_len });
        let call = self.fills;
        self.fills += 1;
        if self.fail_fill_at == Some(call) {
            return Err(format!("fill {call} failed").into());
        }
        Ok(Cow::Owned(self.chunks.pop_front().unwrap_or_default()))
    }

    fn receive_triple(&mut self, graph: OutputGraph, triple: &Triple<'_>) -> Result<(), ConsumerError> {
        let call = self.deliveries;
        self.deliveries += 1;
        if self.fail_triple_at == Some(call) {
            return Err(format!("delivery {call} refused").into());
        }
        self.calls.push(Call::Triple(graph, triple.to_owned_triple()));
        Ok(())
    }

    fn receive_namespace(&mut self, prefix: &str, iri: &str) -> Result<(), ConsumerError> {
        self.calls.push(Call::Namespace(prefix.to_string(), iri.to_string()));
        Ok(())
    }
}

/// One hook call of a [`ScriptedEngine`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Ask for input with a buffer of this size.
    Fill(usize),
    Emit(OutputGraph, RawTriple),
    Fail(EngineFault),
}

/// What a [`ScriptedEngine`] observed.
#[derive(Debug, Default)]
pub struct EngineLog {
    /// Lengths returned by each fill.
    pub lengths: Vec<usize>,
    /// Full fill buffers, including bytes past the returned length.
    pub buffers: Vec<Vec<u8>>,
    pub interrupted: bool,
}

/// Engine that replays a script of hook calls.
pub struct ScriptedEngine {
    steps: Vec<Step>,
    log: Arc<Mutex<EngineLog>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<EngineLog>>) {
        let log = Arc::new(Mutex::new(EngineLog::default()));
        (
            Self {
                steps,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl ParseEngine for ScriptedEngine {
    fn parse(&mut self, hooks: &dyn EngineHooks) -> Result<(), EngineError> {
        for step in self.steps.drain(..) {
            let result = match step {
                Step::Fill(size) => {
                    let mut buf = vec![0u8; size];
                    hooks.fill_buffer(&mut buf).map(|len| {
                        let mut log = self.log.lock().unwrap();
                        log.lengths.push(len);
                        log.buffers.push(buf);
                    })
                }
                Step::Emit(graph, triple) => hooks.emit_triple(graph, triple),
                Step::Fail(fault) => return Err(fault.into()),
            };
            if let Err(interrupted) = result {
                self.log.lock().unwrap().interrupted = true;
                return Err(interrupted.into());
            }
        }
        Ok(())
    }
}

/// Open a session around a scripted engine.
pub fn scripted_session<'c>(steps: Vec<Step>, config: BridgeConfig) -> (Session<'c>, Arc<Mutex<EngineLog>>) {
    let (engine, log) = ScriptedEngine::new(steps);
    let session = Session::with_engine(BASE, Box::new(engine), config).expect("session opens");
    (session, log)
}

/// Run `document` through the bundled engine, cut into the given chunks.
pub fn run_chunks(chunks: Vec<Vec<u8>>, config: BridgeConfig) -> (ParseOutcome, Recorder) {
    let mut recorder = Recorder::new(chunks);
    let outcome = {
        let mut session = Session::open_with_config(BASE, config).expect("session opens");
        session.bind(&mut recorder);
        let outcome = session.run();
        assert_eq!(session.live_triples(), 0);
        outcome
    };
    (outcome, recorder)
}

/// Run `document` through the bundled engine in one chunk.
pub fn run_document(document: &str) -> (ParseOutcome, Recorder) {
    run_chunks(vec![document.as_bytes().to_vec()], BridgeConfig::default())
}

pub fn chunks_of(input: &[u8], size: usize) -> Vec<Vec<u8>> {
    input.chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}

/// Split `input` at the given offsets (clamped and sorted).
pub fn split_at_points(input: &[u8], points: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = points.iter().map(|&p| p.min(input.len())).collect();
    cuts.sort_unstable();
    cuts.dedup();
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        if cut > start {
            chunks.push(input[start..cut].to_vec());
            start = cut;
        }
    }
    if start < input.len() {
        chunks.push(input[start..].to_vec());
    }
    chunks
}

pub fn literal(subject: &str, predicate: &str, object: &str) -> OwnedTriple {
    OwnedTriple {
        subject: subject.into(),
        predicate: predicate.into(),
        object: object.into(),
        object_kind: rdfa_stream::ObjectKind::Literal,
        datatype: None,
        language: None,
    }
}

pub fn resource(subject: &str, predicate: &str, object: &str) -> OwnedTriple {
    let kind = if object.starts_with("_:") {
        rdfa_stream::ObjectKind::BlankNode
    } else {
        rdfa_stream::ObjectKind::Resource
    };
    OwnedTriple {
        subject: subject.into(),
        predicate: predicate.into(),
        object: object.into(),
        object_kind: kind,
        datatype: None,
        language: None,
    }
}
