//! Console output: styling, icons and tables

pub mod console;
pub mod table;

pub use console::{Console, Theme};
