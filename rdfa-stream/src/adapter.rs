//! Buffer-fill and triple-emission adapters.
//!
//! [`BridgeHooks`] is what a running engine sees as its [`EngineHooks`]. It
//! forwards fill requests to the consumer's `produce_next_chunk` and emitted
//! triples to `receive_triple`, translating representations on the way.
//!
//! The first consumer failure is parked in the hooks and every later hook call
//! answers [`Interrupted`] without touching the consumer again. The driver
//! picks the parked error up in [`BridgeHooks::finish`].

use std::cell::{Cell, RefCell};
use std::ops::Deref;

use serde::Serialize;
use tracing::{trace, warn};

use crate::config::BridgeConfig;
use crate::consumer::Consumer;
use crate::engine::{EngineError, EngineHooks, Interrupted, RawTriple};
use crate::error::{BridgeError, EngineFault};
use crate::triple::{Decoded, ObjectKind, OutputGraph, Triple, RDF_XML_LITERAL};

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Calls made to the consumer's `produce_next_chunk`.
    pub fill_requests: u64,
    pub bytes_read: u64,
    pub default_triples: u64,
    pub processor_triples: u64,
    pub namespaces: u64,
    /// Chunks cut down to the requested capacity.
    pub truncated_chunks: u64,
}

/// Tracks engine triple allocations between emission and release.
#[derive(Debug, Default)]
pub struct TripleLedger {
    live: Cell<u64>,
    acquired: Cell<u64>,
    released: Cell<u64>,
}

impl TripleLedger {
    /// Triples taken from the engine and not yet released.
    pub fn live(&self) -> u64 {
        self.live.get()
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.get()
    }

    pub fn released(&self) -> u64 {
        self.released.get()
    }

    fn acquire(&self, triple: RawTriple) -> Lease<'_> {
        self.live.set(self.live.get() + 1);
        self.acquired.set(self.acquired.get() + 1);
        Lease {
            triple,
            ledger: self,
        }
    }
}

/// An engine triple in flight. Released on drop, on every path.
struct Lease<'l> {
    triple: RawTriple,
    ledger: &'l TripleLedger,
}

impl Deref for Lease<'_> {
    type Target = RawTriple;

    fn deref(&self) -> &RawTriple {
        &self.triple
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.ledger.live.set(self.ledger.live.get() - 1);
        self.ledger.released.set(self.ledger.released.get() + 1);
    }
}

/// The bridge side of one run.
pub(crate) struct BridgeHooks<'a, C: Consumer + ?Sized> {
    consumer: RefCell<&'a mut C>,
    capacity: usize,
    pad_byte: Option<u8>,
    ledger: &'a TripleLedger,
    stats: Cell<RunStats>,
    eof: Cell<bool>,
    halted: Cell<bool>,
    failure: RefCell<Option<BridgeError>>,
}

impl<'a, C: Consumer + ?Sized> BridgeHooks<'a, C> {
    pub(crate) fn new(consumer: &'a mut C, config: &BridgeConfig, ledger: &'a TripleLedger) -> Self {
        Self {
            consumer: RefCell::new(consumer),
            capacity: config.chunk_capacity,
            pad_byte: config.pad_byte,
            ledger,
            stats: Cell::new(RunStats::default()),
            eof: Cell::new(false),
            halted: Cell::new(false),
            failure: RefCell::new(None),
        }
    }

    /// Settle the run: a parked consumer error wins over whatever the engine
    /// reported while unwinding.
    pub(crate) fn finish(self, result: Result<(), EngineError>) -> (Result<(), BridgeError>, RunStats) {
        let stats = self.stats.get();
        let outcome = match (self.failure.into_inner(), result) {
            (Some(err), _) => Err(err),
            (None, Ok(())) => Ok(()),
            (None, Err(EngineError::Fault(fault))) => Err(BridgeError::Engine(fault)),
            (None, Err(EngineError::Interrupted(_))) => Err(BridgeError::Engine(EngineFault::internal(
                "engine reported an interruption the bridge never raised",
            ))),
        };
        (outcome, stats)
    }

    fn halt(&self, err: BridgeError) {
        self.halted.set(true);
        let mut failure = self.failure.borrow_mut();
        if failure.is_none() {
            *failure = Some(err);
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut RunStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn deliver(&self, graph: OutputGraph, raw: &RawTriple) -> Result<(), BridgeError> {
        let decoded = ObjectKind::decode(raw.object_type, &raw.object).ok_or_else(|| {
            EngineFault::internal(format!("unknown object type code {}", raw.object_type))
        })?;

        let mut consumer = self.consumer.borrow_mut();
        let delivered = match decoded {
            Decoded::Namespace => consumer.receive_namespace(&raw.predicate, &raw.object),
            Decoded::Object(kind) => consumer.receive_triple(graph, &view(raw, kind)),
            Decoded::XmlLiteral => {
                let mut triple = view(raw, ObjectKind::Literal);
                triple.datatype = Some(RDF_XML_LITERAL);
                consumer.receive_triple(graph, &triple)
            }
        };
        delivered.map_err(BridgeError::TripleDelivery)?;

        self.update_stats(|stats| match (decoded, graph) {
            (Decoded::Namespace, _) => stats.namespaces += 1,
            (_, OutputGraph::Default) => stats.default_triples += 1,
            (_, OutputGraph::Processor) => stats.processor_triples += 1,
        });
        Ok(())
    }
}

/// Borrow an engine triple as a consumer-facing [`Triple`].
fn view(raw: &RawTriple, kind: ObjectKind) -> Triple<'_> {
    let literal = kind == ObjectKind::Literal;
    Triple {
        subject: &raw.subject,
        predicate: &raw.predicate,
        object: &raw.object,
        object_kind: kind,
        datatype: raw.datatype.as_deref().filter(|_| literal),
        // Only plain literals carry a language.
        language: raw
            .language
            .as_deref()
            .filter(|_| literal && raw.datatype.is_none()),
    }
}

impl<C: Consumer + ?Sized> EngineHooks for BridgeHooks<'_, C> {
    fn fill_buffer(&self, buf: &mut [u8]) -> Result<usize, Interrupted> {
        if self.halted.get() {
            return Err(Interrupted);
        }
        if self.eof.get() {
            return Ok(0);
        }
        let capacity = buf.len().min(self.capacity);
        if capacity == 0 {
            // The engine reads 0 as end of input; hold it to that.
            trace!("empty fill buffer, treating as end of input");
            self.eof.set(true);
            return Ok(0);
        }

        let mut consumer = self.consumer.borrow_mut();
        let chunk = match consumer.produce_next_chunk(capacity) {
            Ok(chunk) => chunk,
            Err(err) => {
                self.update_stats(|stats| stats.fill_requests += 1);
                self.halt(BridgeError::InputProduction(err));
                return Err(Interrupted);
            }
        };

        let mut len = chunk.len();
        let truncated = len > capacity;
        if truncated {
            warn!(returned = len, capacity, "consumer chunk exceeds requested capacity, truncating");
            len = capacity;
        }
        buf[..len].copy_from_slice(&chunk[..len]);
        if let Some(pad) = self.pad_byte {
            buf[len..].fill(pad);
        }
        trace!(requested = capacity, len, "fill");

        if len == 0 {
            self.eof.set(true);
            trace!("consumer signalled end of input");
        }
        self.update_stats(|stats| {
            stats.fill_requests += 1;
            stats.bytes_read += len as u64;
            stats.truncated_chunks += u64::from(truncated);
        });
        Ok(len)
    }

    fn emit_triple(&self, graph: OutputGraph, triple: RawTriple) -> Result<(), Interrupted> {
        let lease = self.ledger.acquire(triple);
        if self.halted.get() {
            return Err(Interrupted);
        }
        trace!(%graph, subject = %lease.subject, predicate = %lease.predicate, "emit");

        match self.deliver(graph, &lease) {
            Ok(()) => Ok(()),
            Err(err) => {
                drop(lease);
                self.halt(err);
                Err(Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsumerError;
    use crate::triple::{raw, OwnedTriple};
    use std::borrow::Cow;

    #[derive(Default)]
    struct Fixed {
        chunks: Vec<Vec<u8>>,
        requests: Vec<usize>,
        received: Vec<(OutputGraph, OwnedTriple)>,
        namespaces: Vec<(String, String)>,
        reject_triples: bool,
    }

    impl Consumer for Fixed {
        fn produce_next_chunk(&mut self, max_len: usize) -> Result<Cow<'_, [u8]>, ConsumerError> {
            self.requests.push(max_len);
            if self.chunks.is_empty() {
                return Ok(Cow::Borrowed(&[]));
            }
            Ok(Cow::Owned(self.chunks.remove(0)))
        }

        fn receive_triple(&mut self, graph: OutputGraph, triple: &Triple<'_>) -> Result<(), ConsumerError> {
            if self.reject_triples {
                return Err("rejected".into());
            }
            self.received.push((graph, triple.to_owned_triple()));
            Ok(())
        }

        fn receive_namespace(&mut self, prefix: &str, iri: &str) -> Result<(), ConsumerError> {
            self.namespaces.push((prefix.to_string(), iri.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_fill_truncates_and_pads() {
        let mut consumer = Fixed {
            chunks: vec![b"abcdefgh".to_vec()],
            ..Fixed::default()
        };
        let ledger = TripleLedger::default();
        let config = BridgeConfig {
            pad_byte: Some(b'.'),
            ..BridgeConfig::default()
        };
        let hooks = BridgeHooks::new(&mut consumer, &config, &ledger);

        let mut buf = [0u8; 4];
        assert_eq!(hooks.fill_buffer(&mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");

        let mut buf = [0u8; 4];
        assert_eq!(hooks.fill_buffer(&mut buf), Ok(0));
        assert_eq!(&buf, b"....");

        let (outcome, stats) = hooks.finish(Ok(()));
        assert!(outcome.is_ok());
        assert_eq!(stats.truncated_chunks, 1);
        assert_eq!(stats.bytes_read, 4);
        assert_eq!(consumer.requests, vec![4, 4]);
    }

    #[test]
    fn test_no_fill_after_end_of_input() {
        let mut consumer = Fixed::default();
        let ledger = TripleLedger::default();
        let config = BridgeConfig::default();
        let hooks = BridgeHooks::new(&mut consumer, &config, &ledger);

        let mut buf = [0u8; 16];
        for _ in 0..3 {
            assert_eq!(hooks.fill_buffer(&mut buf), Ok(0));
        }
        let (_, stats) = hooks.finish(Ok(()));
        assert_eq!(stats.fill_requests, 1);
        assert_eq!(consumer.requests.len(), 1);
    }

    #[test]
    fn test_emit_translates_codes() {
        let mut consumer = Fixed::default();
        let ledger = TripleLedger::default();
        let config = BridgeConfig::default();
        let hooks = BridgeHooks::new(&mut consumer, &config, &ledger);

        hooks
            .emit_triple(OutputGraph::Default, RawTriple::new("http://s/", "http://p/", "_:b3", raw::IRI))
            .unwrap();
        hooks
            .emit_triple(
                OutputGraph::Default,
                RawTriple::new("http://s/", "http://p/", "<b>x</b>", raw::XML_LITERAL),
            )
            .unwrap();
        hooks
            .emit_triple(
                OutputGraph::Processor,
                RawTriple::new("@prefix", "ex", "http://example.com/", raw::NAMESPACE_PREFIX),
            )
            .unwrap();
        let (outcome, stats) = hooks.finish(Ok(()));
        outcome.unwrap();

        assert_eq!(consumer.received.len(), 2);
        assert_eq!(consumer.received[0].1.object_kind, ObjectKind::BlankNode);
        assert_eq!(consumer.received[1].1.object_kind, ObjectKind::Literal);
        assert_eq!(consumer.received[1].1.datatype.as_deref(), Some(RDF_XML_LITERAL));
        assert_eq!(
            consumer.namespaces,
            vec![("ex".to_string(), "http://example.com/".to_string())]
        );
        assert_eq!(stats.default_triples, 2);
        assert_eq!(stats.namespaces, 1);
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.released(), 3);
    }

    #[test]
    fn test_unknown_code_is_internal_fault() {
        let mut consumer = Fixed::default();
        let ledger = TripleLedger::default();
        let config = BridgeConfig::default();
        let hooks = BridgeHooks::new(&mut consumer, &config, &ledger);

        let triple = RawTriple::new("http://s/", "http://p/", "o", raw::UNKNOWN);
        assert_eq!(hooks.emit_triple(OutputGraph::Default, triple), Err(Interrupted));
        let (outcome, _) = hooks.finish(Err(Interrupted.into()));
        assert!(matches!(outcome, Err(BridgeError::Engine(EngineFault::Internal(_)))));
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_delivery_error_halts_and_releases() {
        let mut consumer = Fixed {
            reject_triples: true,
            ..Fixed::default()
        };
        let ledger = TripleLedger::default();
        let config = BridgeConfig::default();
        let hooks = BridgeHooks::new(&mut consumer, &config, &ledger);

        let triple = RawTriple::new("http://s/", "http://p/", "o", raw::PLAIN_LITERAL);
        assert_eq!(hooks.emit_triple(OutputGraph::Default, triple.clone()), Err(Interrupted));
        assert_eq!(hooks.emit_triple(OutputGraph::Default, triple), Err(Interrupted));
        let mut buf = [0u8; 8];
        assert_eq!(hooks.fill_buffer(&mut buf), Err(Interrupted));

        let (outcome, stats) = hooks.finish(Err(Interrupted.into()));
        assert!(matches!(outcome, Err(BridgeError::TripleDelivery(_))));
        assert_eq!(stats.fill_requests, 0);
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.acquired(), 2);
        assert_eq!(ledger.released(), 2);
    }

    #[test]
    fn test_literal_fields_dropped_for_resources() {
        let engine_triple =
            RawTriple::new("http://s/", "http://p/", "http://o/", raw::IRI).with_language("en");
        let triple = view(&engine_triple, ObjectKind::Resource);
        assert_eq!(triple.language, None);
        assert_eq!(triple.datatype, None);
    }

    #[test]
    fn test_empty_buffer_latches_end_of_input() {
        let mut consumer = Fixed {
            chunks: vec![b"late".to_vec()],
            ..Fixed::default()
        };
        let ledger = TripleLedger::default();
        let config = BridgeConfig::default();
        let hooks = BridgeHooks::new(&mut consumer, &config, &ledger);

        let mut empty: [u8; 0] = [];
        assert_eq!(hooks.fill_buffer(&mut empty), Ok(0));
        let mut buf = [0u8; 8];
        assert_eq!(hooks.fill_buffer(&mut buf), Ok(0));
        let (outcome, stats) = hooks.finish(Ok(()));
        assert!(outcome.is_ok());
        assert_eq!(stats.fill_requests, 0);
        assert!(consumer.requests.is_empty());
    }

    #[test]
    fn test_language_dropped_for_typed_literals() {
        let engine_triple = RawTriple::new("http://s/", "http://p/", "7", raw::TYPED_LITERAL)
            .with_datatype("http://www.w3.org/2001/XMLSchema#integer")
            .with_language("en");
        let triple = view(&engine_triple, ObjectKind::Literal);
        assert_eq!(triple.datatype, Some("http://www.w3.org/2001/XMLSchema#integer"));
        assert_eq!(triple.language, None);

        let engine_triple =
            RawTriple::new("http://s/", "http://p/", "hallo", raw::PLAIN_LITERAL).with_language("de");
        assert_eq!(view(&engine_triple, ObjectKind::Literal).language, Some("de"));
    }
}
