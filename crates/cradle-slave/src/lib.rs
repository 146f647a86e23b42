//! cradle-slave: the worker side of a cradle node.
//!
//! A slave is spawned by the engine's isolate, connects back over the app's
//! bus endpoint, and serves invocations with a single sandbox instance until
//! it is terminated, disowned, or evicted for idleness.
//!
//! The binary in `main.rs` is a thin shell around this library:
//!
//! - [`config`] - startup identity parsed from the isolate's argument pairs.
//! - [`bus`] - the framed duplex channel to the engine.
//! - [`slave`] - the single-threaded event loop.
//! - [`echo`] - the built-in smoke-test sandbox.

pub mod bus;
pub mod config;
pub mod echo;
pub mod slave;
