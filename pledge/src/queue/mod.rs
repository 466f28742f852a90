//! Bounded admission of operations.

mod builder;
mod serial;

pub use builder::QueueBuilder;
pub use serial::SerialQueue;
