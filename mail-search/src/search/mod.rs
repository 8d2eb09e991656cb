//! Search result orchestration
//!
//! Turns a parsed search request into a `SearchResponse` element: the query
//! engine (or the calendar summary cache for simple calendar queries)
//! produces hits, the pager windows them and the encoder serializes them.

pub mod calendar;
pub mod detector;
pub mod element;
pub mod encoder;
pub mod engine;
pub mod federation;
pub mod indexer;
pub mod mailbox;
pub mod orchestrator;
pub mod stream;
pub mod types;

pub use calendar::{CalendarSummarySource, InMemoryCalendarCache};
pub use detector::FastPathDetector;
pub use element::Element;
pub use encoder::{HitEncoder, IdFormatter};
pub use engine::{EngineError, QueryEngine, QueryExecutor};
pub use federation::{FolderResolver, HttpRemoteMailbox, MountTableResolver, RemoteFederator, RemoteMailbox};
pub use indexer::{IndexedMessage, MessageIndex};
pub use mailbox::{MailboxStore, StoreError};
pub use orchestrator::{SearchOrchestrator, SearchServices};
pub use stream::{ResultStream, ResultsHandle, ResultsPager, VecResultStream};
pub use types::*;
