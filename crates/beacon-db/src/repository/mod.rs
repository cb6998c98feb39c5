//! # Repository Module
//!
//! Repositories wrap SQL behind a small typed API. The agent only needs one:
//!
//! - [`KeyValueRepository`](kv::KeyValueRepository) - string values by key

pub mod kv;
