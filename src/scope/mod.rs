//! Guaranteed teardown for resources acquired during a scenario.
//!
//! Handles are pushed onto a [`ResourceScope`] as they are acquired and
//! released in reverse order when the scope is closed. A scope dropped
//! without being closed hands its remaining handles to the runtime.

mod stack;

pub use stack::{Release, ResourceScope};
