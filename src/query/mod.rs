pub mod engine;
pub mod traversal;

pub use engine::QueryEngine;
pub use traversal::{Alias, ColumnRef, Traversal};
