//! The parse-engine seam.
//!
//! An engine consumes a byte stream and reports triples. It never talks to
//! the consumer directly: it pulls bytes through [`EngineHooks::fill_buffer`]
//! and pushes triples through [`EngineHooks::emit_triple`], both implemented
//! by the bridge.
//!
//! ```text
//!   Consumer           Bridge (hooks)              Engine
//!      │                    │                         │
//!      │                    │◀──fill_buffer(buf)──────│
//!      │◀─produce_next──────│                         │
//!      │───bytes───────────▶│──len───────────────────▶│
//!      │                    │◀──emit_triple(t)────────│
//!      │◀─receive_triple────│  (t released here)      │
//! ```
//!
//! Both hooks take `&self`: the engine holds one shared reference for the
//! whole run and may use it from its input reader and its emitter alike. The
//! bridge guarantees the two are never re-entered.

pub mod context;
pub mod iri;
pub mod rdfa;

use std::io::{self, Read};

use thiserror::Error;

use crate::error::EngineFault;
use crate::triple::OutputGraph;

pub use rdfa::RdfaEngine;

/// A triple as allocated by the engine.
///
/// Ownership passes to the bridge on [`EngineHooks::emit_triple`]; the bridge
/// releases it once the consumer has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// One of the codes in [`crate::triple::raw`].
    pub object_type: u8,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl RawTriple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        object_type: u8,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            object_type,
            datatype: None,
            language: None,
        }
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Returned by a hook when the bridge has stopped the run.
///
/// The cause is held by the bridge; the engine only has to unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parse interrupted by the bridge")]
pub struct Interrupted;

/// Why an engine stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A hook returned [`Interrupted`].
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    Fault(#[from] EngineFault),
}

/// Callbacks the bridge offers to a running engine.
pub trait EngineHooks {
    /// Fill `buf` with up to `buf.len()` bytes of input.
    ///
    /// `Ok(0)` is end of input. The engine must not read past the returned
    /// length.
    fn fill_buffer(&self, buf: &mut [u8]) -> Result<usize, Interrupted>;

    /// Hand a discovered triple to the bridge.
    ///
    /// Called once per triple, in discovery order, before the engine reads on.
    fn emit_triple(&self, graph: OutputGraph, triple: RawTriple) -> Result<(), Interrupted>;
}

/// A parse engine bound to one document.
///
/// Engines are created per session, seeded with the base identifier, and
/// parse at most once.
pub trait ParseEngine {
    /// Parse the whole input, driving `hooks` until end of input or failure.
    fn parse(&mut self, hooks: &dyn EngineHooks) -> Result<(), EngineError>;
}

impl<E: ParseEngine + ?Sized> ParseEngine for Box<E> {
    fn parse(&mut self, hooks: &dyn EngineHooks) -> Result<(), EngineError> {
        (**self).parse(hooks)
    }
}

/// `Read` adapter over [`EngineHooks::fill_buffer`].
///
/// Lets byte-oriented tokenizers pull input through the bridge. Once a hook
/// reports [`Interrupted`] every later read fails without calling back.
pub struct HookReader<'h> {
    hooks: &'h dyn EngineHooks,
    interrupted: bool,
    bytes_read: u64,
}

impl<'h> HookReader<'h> {
    pub fn new(hooks: &'h dyn EngineHooks) -> Self {
        Self {
            hooks,
            interrupted: false,
            bytes_read: 0,
        }
    }

    /// Whether a fill was refused by the bridge.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Total bytes delivered so far.
    #[inline]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl Read for HookReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupted {
            return Err(io::Error::other(Interrupted));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        match self.hooks.fill_buffer(buf) {
            Ok(len) => {
                // Never trust a length past the buffer.
                let len = len.min(buf.len());
                self.bytes_read += len as u64;
                Ok(len)
            }
            Err(Interrupted) => {
                self.interrupted = true;
                Err(io::Error::other(Interrupted))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct Canned {
        chunks: RefCell<Vec<&'static [u8]>>,
        fail_at: Option<usize>,
        calls: Cell<usize>,
    }

    impl EngineHooks for Canned {
        fn fill_buffer(&self, buf: &mut [u8]) -> Result<usize, Interrupted> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if self.fail_at == Some(call) {
                return Err(Interrupted);
            }
            let mut chunks = self.chunks.borrow_mut();
            if chunks.is_empty() {
                return Ok(0);
            }
            let chunk = chunks[0];
            let len = chunk.len().min(buf.len());
            buf[..len].copy_from_slice(&chunk[..len]);
            if len == chunk.len() {
                chunks.remove(0);
            } else {
                chunks[0] = &chunk[len..];
            }
            Ok(len)
        }

        fn emit_triple(&self, _: OutputGraph, _: RawTriple) -> Result<(), Interrupted> {
            Ok(())
        }
    }

    #[test]
    fn test_hook_reader_reads_to_end() {
        let hooks = Canned {
            chunks: RefCell::new(vec![b"<p>", b"hi</p>"]),
            fail_at: None,
            calls: Cell::new(0),
        };
        let mut reader = HookReader::new(&hooks);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "<p>hi</p>");
        assert_eq!(reader.bytes_read(), 9);
    }

    #[test]
    fn test_hook_reader_small_reads_keep_remainder() {
        let hooks = Canned {
            chunks: RefCell::new(vec![b"<title>"]),
            fail_at: None,
            calls: Cell::new(0),
        };
        let mut reader = HookReader::new(&hooks);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"<ti");
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"tle");
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'>');
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.bytes_read(), 7);
    }

    #[test]
    fn test_hook_reader_sticks_after_interrupt() {
        let hooks = Canned {
            chunks: RefCell::new(vec![b"abc", b"def"]),
            fail_at: Some(1),
            calls: Cell::new(0),
        };
        let mut reader = HookReader::new(&hooks);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert!(reader.read(&mut buf).is_err());
        assert!(reader.is_interrupted());
        assert!(reader.read(&mut buf).is_err());
        assert_eq!(hooks.calls.get(), 2);
    }

    #[test]
    fn test_raw_triple_builders() {
        let triple = RawTriple::new("s", "p", "o", crate::triple::raw::TYPED_LITERAL)
            .with_datatype("http://www.w3.org/2001/XMLSchema#integer");
        assert_eq!(triple.datatype.as_deref(), Some("http://www.w3.org/2001/XMLSchema#integer"));
        assert_eq!(triple.language, None);
    }
}
