//! BucketIO FS - File-transfer semantics over an object store
//!
//! This crate turns the positional, handle-based operations of a
//! file-transfer server into whole-object store calls:
//! - Downloads are streamed once and replayed from a bounded lookback window
//! - Uploads are buffered in memory and committed with a single put on close
//! - Uploads in flight are visible to stat, listing and read through a
//!   process-wide phantom registry
//! - Listings merge synthetic entries, in-flight uploads and store pages

pub mod acl;
pub mod bucket;
pub mod io;
pub mod lister;
pub mod phantom;
pub mod reader;
pub mod sink;
mod spool;
pub mod stat;

// Re-exports
pub use acl::acl_to_mode;
pub use bucket::{BucketIo, FileCommand, ListMethod};
pub use io::{ListAt, ListPage, ReadAt, SnapshotReader, WriteAt};
pub use lister::ObjectLister;
pub use phantom::{PhantomContent, PhantomObject, PhantomRegistry, PhantomSnapshot};
pub use reader::LookbackReader;
pub use sink::{UploadBuffer, UploadSink};
pub use stat::ObjectStat;
