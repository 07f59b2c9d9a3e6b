//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`LruKReplacer`] - backward K-distance eviction with LRU tie-breaking

mod lru_k;

pub use lru_k::LruKReplacer;
