//! The consumer capability set.
//!
//! A [`Consumer`] is whatever the host plugs into a session: it supplies
//! input bytes when the engine asks for them and receives triples as they
//! are found. Both calls are synchronous; the engine does not move on until
//! the callback returns.

use std::borrow::Cow;
use std::io::{ErrorKind, Read};

use crate::error::ConsumerError;
use crate::triple::{OutputGraph, Triple};

/// Host-side half of the streaming contract.
pub trait Consumer {
    /// Produce up to `max_len` bytes of input.
    ///
    /// An empty chunk means end of input; the session will not ask again.
    /// Longer chunks are truncated to `max_len`.
    fn produce_next_chunk(&mut self, max_len: usize) -> Result<Cow<'_, [u8]>, ConsumerError>;

    /// Receive one triple.
    ///
    /// The triple borrows engine storage that is released when this returns;
    /// use [`Triple::to_owned_triple`] to keep it. Returning an error aborts
    /// the parse.
    fn receive_triple(&mut self, graph: OutputGraph, triple: &Triple<'_>) -> Result<(), ConsumerError>;

    /// Receive a prefix declaration found in the document.
    fn receive_namespace(&mut self, prefix: &str, iri: &str) -> Result<(), ConsumerError> {
        let _ = (prefix, iri);
        Ok(())
    }
}

impl<C: Consumer + ?Sized> Consumer for &mut C {
    fn produce_next_chunk(&mut self, max_len: usize) -> Result<Cow<'_, [u8]>, ConsumerError> {
        (**self).produce_next_chunk(max_len)
    }

    fn receive_triple(&mut self, graph: OutputGraph, triple: &Triple<'_>) -> Result<(), ConsumerError> {
        (**self).receive_triple(graph, triple)
    }

    fn receive_namespace(&mut self, prefix: &str, iri: &str) -> Result<(), ConsumerError> {
        (**self).receive_namespace(prefix, iri)
    }
}

impl<C: Consumer + ?Sized> Consumer for Box<C> {
    fn produce_next_chunk(&mut self, max_len: usize) -> Result<Cow<'_, [u8]>, ConsumerError> {
        (**self).produce_next_chunk(max_len)
    }

    fn receive_triple(&mut self, graph: OutputGraph, triple: &Triple<'_>) -> Result<(), ConsumerError> {
        (**self).receive_triple(graph, triple)
    }

    fn receive_namespace(&mut self, prefix: &str, iri: &str) -> Result<(), ConsumerError> {
        (**self).receive_namespace(prefix, iri)
    }
}

/// Consumer that reads input from any [`Read`] and hands triples to a
/// closure.
///
/// ```
/// use std::io::Cursor;
/// use rdfa_stream::{Session, StreamConsumer};
///
/// let mut titles = Vec::new();
/// let mut session = Session::open("http://example.org/").unwrap();
/// session.bind(StreamConsumer::new(
///     Cursor::new(r#"<p property="dc:title">Hi</p>"#),
///     |_graph, triple: &rdfa_stream::Triple<'_>| {
///         titles.push(triple.object.to_string());
///         Ok(())
///     },
/// ));
/// assert!(session.run().is_success());
/// drop(session);
/// assert_eq!(titles, ["Hi"]);
/// ```
pub struct StreamConsumer<R, F> {
    reader: R,
    handler: F,
    scratch: Vec<u8>,
}

impl<R, F> StreamConsumer<R, F>
where
    R: Read,
    F: FnMut(OutputGraph, &Triple<'_>) -> Result<(), ConsumerError>,
{
    pub fn new(reader: R, handler: F) -> Self {
        Self {
            reader,
            handler,
            scratch: Vec::new(),
        }
    }

    pub fn into_inner(self) -> (R, F) {
        (self.reader, self.handler)
    }
}

impl<R, F> Consumer for StreamConsumer<R, F>
where
    R: Read,
    F: FnMut(OutputGraph, &Triple<'_>) -> Result<(), ConsumerError>,
{
    fn produce_next_chunk(&mut self, max_len: usize) -> Result<Cow<'_, [u8]>, ConsumerError> {
        self.scratch.resize(max_len, 0);
        loop {
            match self.reader.read(&mut self.scratch) {
                Ok(len) => return Ok(Cow::Borrowed(&self.scratch[..len])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn receive_triple(&mut self, graph: OutputGraph, triple: &Triple<'_>) -> Result<(), ConsumerError> {
        (self.handler)(graph, triple)
    }
}
