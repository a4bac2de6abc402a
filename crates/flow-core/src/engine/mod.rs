//! Engine module for FlowEngine implementation
//!
//! Provides the engine facade (load -> pipeline -> persist) and its builder.

pub mod builder;
pub mod core;

pub use builder::EngineBuilder;
pub use core::FlowEngine;
