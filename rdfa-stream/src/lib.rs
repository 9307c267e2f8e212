//! Streaming RDFa bridge
//!
//! Connects a streaming RDFa parse engine to a host-supplied [`Consumer`].
//! Input is pulled from the consumer a chunk at a time, exactly when the
//! engine's buffer runs dry; triples are pushed to the consumer the moment
//! the engine recognizes them. Neither the document nor the result set is
//! ever held in memory as a whole.
//!
//! # Architecture
//!
//! - **session.rs** - Session lifecycle (open, bind, close)
//! - **driver.rs** - `Session::run`, `ParseOutcome`, `parse_reader`
//! - **adapter.rs** - Buffer-fill and triple-emission adapters, triple ledger
//! - **consumer.rs** - The `Consumer` trait and `StreamConsumer`
//! - **engine/** - The parse-engine seam and the bundled RDFa engine
//! - **triple.rs** - Triples, object kinds, output graphs
//! - **config.rs** - TOML-backed configuration
//! - **error.rs** - Error taxonomy
//!
//! # Example
//!
//! ```
//! use rdfa_stream::{parse_reader, ObjectKind, OutputGraph};
//!
//! let html = r#"<p property="dc:title">Hi</p>"#;
//! let mut found = Vec::new();
//! let outcome = parse_reader("http://example.org/", html.as_bytes(), |graph, triple| {
//!     if graph == OutputGraph::Default {
//!         found.push(triple.to_owned_triple());
//!     }
//!     Ok(())
//! });
//!
//! assert!(outcome.is_success());
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].subject, "http://example.org/");
//! assert_eq!(found[0].predicate, "http://purl.org/dc/terms/title");
//! assert_eq!(found[0].object, "Hi");
//! assert_eq!(found[0].object_kind, ObjectKind::Literal);
//! ```

pub mod adapter;
pub mod config;
pub mod consumer;
pub mod driver;
pub mod engine;
pub mod error;
pub mod session;
pub mod triple;

pub use adapter::{RunStats, TripleLedger};
pub use config::{BridgeConfig, EngineConfig};
pub use consumer::{Consumer, StreamConsumer};
pub use driver::{parse_reader, ParseOutcome};
pub use engine::{EngineError, EngineHooks, Interrupted, ParseEngine, RawTriple, RdfaEngine};
pub use error::{BridgeError, ConfigError, ConsumerError, EngineFault, Result};
pub use session::{Session, SessionState};
pub use triple::{ObjectKind, OutputGraph, OwnedTriple, Triple};
