//! Operations and their producers.
//!
//! This module defines the state machine at the heart of the crate:
//! - [`OperationCore`], the non-generic state machine holding status,
//!   outcome, continuations and the disposal flag,
//! - [`Operation`], the typed consumer handle,
//! - [`CompletionSource`], the producer capability driving transitions,
//! - [`Awaiter`] and [`OperationFuture`], the await bridge.
//!
//! An operation starts in [`Status::Created`] (or directly in a terminal
//! status for known outcomes) and moves monotonically towards one of the
//! three terminal statuses. The first terminal transition wins; every later
//! attempt fails.

mod awaiter;
mod core;
mod handle;
mod outcome;
mod source;
mod state;

pub use awaiter::{Awaiter, OperationFuture};
pub use self::core::{OperationCore, UserState};
pub use handle::Operation;
pub use outcome::{Fault, Outcome};
pub use source::CompletionSource;
pub use state::Status;

pub(crate) use outcome::{Value, downcast};
