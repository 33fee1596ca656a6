//! Testing utilities and mock implementations.
//!
//! Compiled into the crate (not behind `cfg(test)`) so that integration
//! tests and downstream consumers can drive the queue without a real
//! transcoder installed.

mod mock_engine;

pub use mock_engine::{MockInProcessEngine, RecordedOp};
