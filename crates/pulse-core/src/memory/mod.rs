pub mod box_embedder;
pub mod cache;
pub mod embedder;
pub mod extractor;
pub mod filter;
pub mod store;
pub mod vector;
