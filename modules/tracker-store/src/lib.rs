//! Persistence and lookup for the payload tracker.
//!
//! Two traits split the write path from the read path:
//! - [`DimensionStore`]: find a status/service/source row by name, insert new ones.
//! - [`PayloadWriter`]: idempotent payload upserts and status-event inserts.
//!
//! [`PgStore`] implements both against Postgres; [`MemoryStore`] implements both
//! in memory for tests. Name lookups go through a [`DimensionResolver`], either
//! straight to the store ([`DirectLookup`]) or through a TTL cache
//! ([`CachedLookup`]). Pick one with [`build_resolver`].

pub mod cache;
pub mod memory;
pub mod postgres;
pub mod resolver;
pub mod store;

pub use cache::TtlCache;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use resolver::{build_resolver, CacheStats, CachedLookup, DimensionResolver, DirectLookup};
pub use store::{DimensionStore, PayloadWriter};
