//! Persistence Layer - 数据持久化
//!
//! SQLite 片段索引

pub mod sqlite;

pub use self::sqlite::SqliteSegmentIndex;
