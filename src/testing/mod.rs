//! Testing utilities and mock implementations
//!
//! Mock audit sinks and a probe mediator kind for driving the engine in
//! tests without real audit backends or business mediators.

pub mod mocks;

pub use mocks::*;
