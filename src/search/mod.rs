//! Knowledge retrieval: storage, indexing, term associations and ranked search.

pub mod index;
pub mod indexer;
pub mod patterns;
pub mod searcher;
pub mod store;
