//! Synchronization primitives.
//!
//! The crate's one wait primitive is the manual-reset [`Event`]: tasks
//! publish completion through it, cancellation tokens expose a waitable
//! view through it, and the UI dispatcher's combined message/object wait
//! is built from [`Event::wait_any`].

mod event;

pub use event::{Event, WaitOutcome};
