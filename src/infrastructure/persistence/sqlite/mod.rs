//! SQLite Persistence - SQLite 片段索引实现

mod database;
mod segment_index;

pub use database::*;
pub use segment_index::*;
