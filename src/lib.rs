//! Herdbook Server Library
//!
//! Offline sync engine for the livestock record-keeping backend. The server
//! binary is in main.rs; everything it wires together is exposed here for
//! integration tests.
//!
//! # Modules
//!
//! - `sync`: entity registry, version guard, push reconciler, pull feed and audit log
//! - `routes`: HTTP surface for the sync protocol
//! - `db`: SQLite pool, schema bootstrap and timestamp encoding

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod sync;
