//! Persistence for capsules: the document store abstraction, its backends,
//! and the adapter that turns flat records into typed capsules.

pub mod backend;
pub mod capsules;
pub mod document;
pub mod error;

pub use backend::memory::MemoryDocumentStore;
pub use backend::sqlite::{Database, SqliteDocumentStore};
pub use capsules::{CapsuleStore, DEFAULT_COLLECTION};
pub use document::{Document, DocumentStore};
pub use error::{StoreError, StoreErrorKind, StoreResult};
