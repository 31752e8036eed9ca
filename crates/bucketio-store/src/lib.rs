//! BucketIO Store - Object store boundary
//!
//! This crate defines the operations the adaptation layer consumes from an
//! object store, the cancelable-call contract every store call runs under,
//! and an in-memory store for tests and local development.

pub mod context;
pub mod memory;
pub mod store;
pub mod types;

// Re-exports
pub use context::RequestContext;
pub use memory::{MemoryStore, StoreOp};
pub use store::ObjectStore;
pub use types::*;
