//! # Pledge
//!
//! **Pledge** is a lightweight operation primitive for Rust: a handle to a unit
//! of work that completes exactly once, with a value, a fault or a
//! cancellation.
//!
//! Pledge has no runtime of its own. Producers drive operations through a
//! [`CompletionSource`]; consumers observe them through continuations, by
//! blocking, or by awaiting them from any executor. It offers:
//!
//! - A **single-writer state machine** (`Created → Scheduled → Running → terminal`)
//!   where the first terminal transition wins and every later attempt fails
//! - **Context-aware continuations** that run inline or are posted back to the
//!   [`DispatchContext`](dispatch::DispatchContext) captured at registration
//! - **Combinators** to join, race, retry and time out operations
//! - A **serial queue** admitting operations with bounded concurrency
//! - **Delays** driven by a lazily started timer thread
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pledge::{CompletionSource, combinator::when_all};
//!
//! let first = CompletionSource::<u32>::new();
//! let second = CompletionSource::<u32>::new();
//!
//! let both = when_all([first.operation(), second.operation()]);
//!
//! first.set_result(1)?;
//! second.set_result(2)?;
//!
//! assert_eq!(both.result()?, vec![1, 2]);
//! ```
//!
//! ## Modules
//!
//! - [`operation`]: The state machine, handles and completion sources
//! - [`dispatch`]: Dispatch contexts and the event loop
//! - [`combinator`]: `when_all`, `when_any`, `retry` and `timeout`
//! - [`queue`]: Bounded admission of operations
//! - [`time`]: Delays

mod error;

pub mod combinator;
pub mod dispatch;
pub mod operation;
pub mod queue;
pub mod time;

pub use dispatch::{ContextHandle, ContinuationToken, DispatchContext, EventLoop, LoopThread};
pub use error::{AggregateError, Canceled, Cause, OperationError, Panicked};
pub use operation::{CompletionSource, Fault, Operation, OperationCore, Outcome, Status};
pub use queue::{QueueBuilder, SerialQueue};
