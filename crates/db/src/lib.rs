//! `db` crate — the Postgres-backed reference implementation of
//! `engine::storage::Store`.
//!
//! Holds a connection pool, typed row structs, repository functions per
//! table group, and `PgStore`, which adapts those repository functions to
//! the `Store` trait the executor depends on. No scheduling or executor
//! logic lives here — this crate is a durable collaborator, not a caller.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::DbPool;
pub use store::PgStore;
