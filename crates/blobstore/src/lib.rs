//! Content-addressed artifact exchange.
//!
//! Behaviours move large artifacts out of band: serialize to a local path,
//! push into a content-addressed store, delete the local copy, and share
//! only the returned address through the chain. Peers fetch and
//! deserialize with the inverse call. Every failure collapses into one
//! opaque error kind; callers retry or abort, they never branch on the
//! cause.

pub mod client;
pub mod store;

pub use client::{Artifact, BlobClient, CustomLoader, CustomStorer, Filetype};
pub use store::{ContentStore, LocalStore, MemoryStore};

/// Single opaque kind every blobstore failure collapses into.
#[derive(Debug, thiserror::Error)]
#[error("blob store interaction failed: {0}")]
pub struct BlobStoreError(#[from] anyhow::Error);
