//! IRC message representation, parsing and serialization.

mod parse;
mod serialize;
pub mod tags;
mod types;

pub use types::{Message, Tag};
