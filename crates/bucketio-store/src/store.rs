//! Store trait

use crate::types::{
    CopyObjectRequest, GetObjectOutput, GetObjectRequest, ListObjectsPage, ListObjectsRequest,
    ObjectAcl, ObjectHead, PutObjectRequest,
};
use async_trait::async_trait;
use bucketio_common::Result;

/// Operations consumed from an object store
///
/// Implementations report a missing object as
/// [`Error::ObjectNotFound`](bucketio_common::Error::ObjectNotFound) and any
/// other failure as [`Error::Store`](bucketio_common::Error::Store). They do
/// not retry. Callers wrap every call in
/// [`RequestContext::run`](crate::RequestContext::run), so a returned future
/// must stop its transfer when dropped.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    /// Open a streaming download
    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectOutput>;

    /// Atomically create or replace an object
    async fn put_object(&self, request: PutObjectRequest) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<()>;

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<ObjectAcl>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead>;

    /// Fetch one page of a (possibly delimited) key enumeration
    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ListObjectsPage>;
}
