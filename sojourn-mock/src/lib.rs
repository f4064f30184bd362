//! sojourn-mock
//!
//! Scriptable [`MockSource`] and [`MockSink`] plus reservation fixtures for
//! driving the engine deterministically in tests.

mod fixtures;
mod sink;
mod source;

pub use fixtures::{ReservationFixture, reservation};
pub use sink::{MockSink, SinkCall};
pub use source::{MockBehavior, MockSource, SourceCall};
