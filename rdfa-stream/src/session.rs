//! Session lifecycle: open, bind, close.

use std::fmt;

use tracing::debug;

use crate::adapter::{RunStats, TripleLedger};
use crate::config::BridgeConfig;
use crate::consumer::Consumer;
use crate::engine::{ParseEngine, RdfaEngine};
use crate::error::{BridgeError, Result};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Opened, not yet run.
    Idle,
    Running,
    Completed,
    Failed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        })
    }
}

/// One parse of one document.
///
/// A session owns its engine and its consumer. Both are released by
/// [`close`](Session::close), which also runs on drop; the engine is
/// released as soon as a run ends. A session runs at most once.
///
/// Sessions share nothing, so each can be moved to its own thread.
pub struct Session<'c> {
    pub(crate) base: String,
    pub(crate) config: BridgeConfig,
    pub(crate) engine: Option<Box<dyn ParseEngine + Send + 'c>>,
    pub(crate) consumer: Option<Box<dyn Consumer + Send + 'c>>,
    pub(crate) state: SessionState,
    pub(crate) ledger: TripleLedger,
    pub(crate) stats: RunStats,
}

impl<'c> Session<'c> {
    /// Open a session on the bundled RDFa engine with default settings.
    pub fn open(base: &str) -> Result<Self> {
        Self::open_with_config(base, BridgeConfig::default())
    }

    pub fn open_with_config(base: &str, config: BridgeConfig) -> Result<Self> {
        let engine = RdfaEngine::new(base, &config)?;
        Self::with_engine(base, Box::new(engine), config)
    }

    /// Open a session around a caller-supplied engine.
    ///
    /// The engine is expected to have been seeded with `base` already.
    pub fn with_engine(
        base: &str,
        engine: Box<dyn ParseEngine + Send + 'c>,
        config: BridgeConfig,
    ) -> Result<Self> {
        if base.is_empty() {
            return Err(BridgeError::Initialization("base identifier is empty".into()));
        }
        config
            .validate()
            .map_err(|err| BridgeError::Initialization(err.to_string()))?;

        debug!(base, chunk_capacity = config.chunk_capacity, "session opened");
        Ok(Self {
            base: base.to_string(),
            config,
            engine: Some(engine),
            consumer: None,
            state: SessionState::Idle,
            ledger: TripleLedger::default(),
            stats: RunStats::default(),
        })
    }

    /// Attach `consumer`, dropping any consumer bound before. Does not parse.
    ///
    /// On a closed session the consumer is dropped straight away.
    pub fn bind<C: Consumer + Send + 'c>(&mut self, consumer: C) {
        if self.state == SessionState::Closed {
            debug!("bind on closed session ignored");
            return;
        }
        if self.consumer.replace(Box::new(consumer)).is_some() {
            debug!("previously bound consumer released");
        } else {
            debug!("consumer bound");
        }
    }

    /// Release the engine and the consumer. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.engine = None;
        self.consumer = None;
        debug!(base = %self.base, previous = %self.state, "session closed");
        self.state = SessionState::Closed;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Engine triples handed to the bridge and not yet released.
    ///
    /// Zero whenever no run is in progress.
    pub fn live_triples(&self) -> u64 {
        self.ledger.live()
    }

    pub fn ledger(&self) -> &TripleLedger {
        &self.ledger
    }

    /// Counters from the last run.
    pub fn stats(&self) -> RunStats {
        self.stats
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base", &self.base)
            .field("state", &self.state)
            .field("consumer_bound", &self.consumer.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}
