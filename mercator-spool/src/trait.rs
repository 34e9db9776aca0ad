//! The storage-agnostic interface every spool backend implements.

use async_trait::async_trait;
use mercator_common::context::Context;

use crate::types::SpooledMessageId;

/// A pluggable store for in-flight message state.
///
/// Implementors back the spool with memory (`backends::memory`), an in-memory
/// store instrumented for tests (`backends::test`), or the filesystem
/// (`backends::file`). All operations are keyed by [`SpooledMessageId`], which
/// is assigned by [`BackingStore::write`].
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Persists `context`, assigning it a new [`SpooledMessageId`] and recording
    /// that id back onto `context.tracking_id`.
    ///
    /// # Errors
    /// Returns an error if the underlying store cannot accept the write (I/O
    /// failure, capacity limit, lock contention).
    async fn write(&self, context: &mut Context) -> crate::Result<SpooledMessageId>;

    /// Lists every message currently held by the store, oldest first.
    ///
    /// # Errors
    /// Returns an error if the store cannot be enumerated.
    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>>;

    /// Reads back a previously written message.
    ///
    /// # Errors
    /// Returns [`crate::SpoolError::NotFound`] if `id` is not present, or an
    /// I/O or deserialization error.
    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Context>;

    /// Overwrites a previously written message in place.
    ///
    /// # Errors
    /// Returns [`crate::SpoolError::NotFound`] if `id` is not present, or an
    /// I/O or serialization error.
    async fn update(&self, id: &SpooledMessageId, context: &Context) -> crate::Result<()>;

    /// Removes a message from the store.
    ///
    /// # Errors
    /// Returns [`crate::SpoolError::NotFound`] if `id` is not present, or an
    /// I/O error.
    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()>;
}
