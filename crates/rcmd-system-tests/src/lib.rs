//! No public API. This crate exists only to hold `tests/integration_test.rs`,
//! which drives the queue, pool, transport, and lifecycle crates together the
//! way the daemon and client binaries wire them up, without depending on
//! either binary crate directly.
