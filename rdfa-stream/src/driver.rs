//! The parse driver.

use std::io::Read;

use tracing::{debug, info_span, warn};

use crate::adapter::BridgeHooks;
use crate::consumer::StreamConsumer;
use crate::error::{BridgeError, ConsumerError};
use crate::session::{Session, SessionState};
use crate::triple::{OutputGraph, Triple};

/// Result of [`Session::run`].
#[derive(Debug)]
#[must_use]
pub enum ParseOutcome {
    Success,
    Failure(BridgeError),
}

impl ParseOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success)
    }

    /// `0` on success, otherwise [`BridgeError::code`].
    pub fn exit_code(&self) -> i32 {
        match self {
            ParseOutcome::Success => 0,
            ParseOutcome::Failure(err) => err.code(),
        }
    }

    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            ParseOutcome::Success => None,
            ParseOutcome::Failure(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<(), BridgeError> {
        match self {
            ParseOutcome::Success => Ok(()),
            ParseOutcome::Failure(err) => Err(err),
        }
    }
}

impl From<Result<(), BridgeError>> for ParseOutcome {
    fn from(result: Result<(), BridgeError>) -> Self {
        match result {
            Ok(()) => ParseOutcome::Success,
            Err(err) => ParseOutcome::Failure(err),
        }
    }
}

impl Session<'_> {
    /// Drive the engine over the whole input.
    ///
    /// Every failure comes back as [`ParseOutcome::Failure`]. A session
    /// without a consumer stays idle and may be bound and run again; any
    /// other run leaves it completed or failed for good.
    pub fn run(&mut self) -> ParseOutcome {
        let span = info_span!("rdfa_parse", base = %self.base);
        let _enter = span.enter();

        if self.state != SessionState::Idle {
            return ParseOutcome::Failure(BridgeError::InvalidState(self.state));
        }
        let Some(consumer) = self.consumer.as_deref_mut() else {
            return ParseOutcome::Failure(BridgeError::NoConsumer);
        };
        let Some(mut engine) = self.engine.take() else {
            return ParseOutcome::Failure(BridgeError::InvalidState(self.state));
        };

        self.state = SessionState::Running;
        let hooks = BridgeHooks::new(consumer, &self.config, &self.ledger);
        let result = engine.parse(&hooks);
        let (result, stats) = hooks.finish(result);
        drop(engine);
        self.stats = stats;

        match result {
            Ok(()) => {
                self.state = SessionState::Completed;
                debug!(
                    fill_requests = stats.fill_requests,
                    bytes_read = stats.bytes_read,
                    default_triples = stats.default_triples,
                    processor_triples = stats.processor_triples,
                    "parse completed"
                );
                ParseOutcome::Success
            }
            Err(err) => {
                self.state = SessionState::Failed;
                warn!(
                    error = %err,
                    code = err.code(),
                    fill_requests = stats.fill_requests,
                    bytes_read = stats.bytes_read,
                    "parse failed"
                );
                ParseOutcome::Failure(err)
            }
        }
    }
}

/// Parse everything `reader` yields, calling `on_triple` for each triple.
///
/// Opens a session on the bundled engine, runs it and closes it.
pub fn parse_reader<R, F>(base: &str, reader: R, on_triple: F) -> ParseOutcome
where
    R: Read + Send,
    F: FnMut(OutputGraph, &Triple<'_>) -> Result<(), ConsumerError> + Send,
{
    let mut session = match Session::open(base) {
        Ok(session) => session,
        Err(err) => return ParseOutcome::Failure(err),
    };
    session.bind(StreamConsumer::new(reader, on_triple));
    let outcome = session.run();
    session.close();
    outcome
}
