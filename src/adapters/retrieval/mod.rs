//! Retriever adapters.
//!
//! - `HttpRetriever` - JSON-over-HTTP hybrid retrieval service
//! - `StaticRetriever` - Fixed documents, for tests and deployments without retrieval

mod http_retriever;
mod static_retriever;

pub use http_retriever::{HttpRetriever, HttpRetrieverConfig};
pub use static_retriever::StaticRetriever;
