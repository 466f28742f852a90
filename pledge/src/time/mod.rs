//! Time-based producers.
//!
//! Delays are ordinary producers: a lazily started timer thread performs
//! their terminal transition once the deadline passes. The operation core
//! itself never owns threads.

mod delay;
mod timer;

#[doc(inline)]
pub use delay::delay;

pub(crate) use delay::Delay;
