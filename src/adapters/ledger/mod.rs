//! Idempotency ledger adapters.
//!
//! - `PostgresIdempotencyLedger` - default, shares the application database
//! - `RedisIdempotencyLedger` - `SET NX EX`, expiry handles retention
//! - `InMemoryIdempotencyLedger` - tests only

mod in_memory;
mod postgres;
mod redis;

pub use in_memory::InMemoryIdempotencyLedger;
pub use postgres::PostgresIdempotencyLedger;
pub use redis::RedisIdempotencyLedger;
