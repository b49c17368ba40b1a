//! Query embedding.
//!
//! The same provider and model must be used at query time as at index build
//! time; the vector index records both and startup checks them.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
