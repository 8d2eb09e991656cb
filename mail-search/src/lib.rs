//! mail-search: search result orchestration for a mailbox service
//!
//! Executes parsed search requests against a mailbox and builds the
//! response element clients receive.
//!
//! # Features
//!
//! - **Fast path**: simple calendar folder queries are answered from a
//!   per-folder summary cache, with folders owned by other accounts
//!   federated to their home server
//! - **Paging**: offset skipping and one-hit lookahead for the `more` flag
//! - **Encoding**: per-type hit encoding with inline expansion, mark-read
//!   and sort-field round-tripping
//! - **Index**: a Tantivy-backed message index usable as the query engine
//!
//! # Example
//!
//! ```no_run
//! use mail_search::search::{
//!     HttpRemoteMailbox, InMemoryCalendarCache, MessageIndex, MountTableResolver,
//!     SearchOrchestrator, SearchRequest, SearchServices,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = Arc::new(MessageIndex::open(Path::new("/var/mail/index"), "alice")?);
//!     let services = SearchServices {
//!         engine: index.clone(),
//!         calendar: Arc::new(InMemoryCalendarCache::new()),
//!         folders: Arc::new(MountTableResolver::new("alice")),
//!         remote: Arc::new(HttpRemoteMailbox::new(Default::default())),
//!         mailbox: index,
//!     };
//!
//!     let orchestrator = SearchOrchestrator::new(services, "alice");
//!     let response = orchestrator.search(&SearchRequest::new("report")).await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod search;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SearchError};
