// Record sources backed by real stores

pub mod rest;
pub mod sqlite;

pub use rest::RestSource;
pub use sqlite::SqliteSource;
