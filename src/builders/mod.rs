//! Builders to construct a pool and scheduler from configuration.

pub mod runtime_builder;

pub use runtime_builder::build_runtime;
