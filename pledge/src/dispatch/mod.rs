//! Continuation dispatch.
//!
//! Every continuation is registered together with the dispatch context it
//! must run on. When an operation reaches a terminal state, each pending
//! continuation is delivered exactly once:
//! - inline, when it captured no context or the context active on the
//!   completing thread,
//! - through [`DispatchContext::post`] otherwise, in which case the
//!   callback observes `completed_synchronously == false`.
//!
//! Continuations registered after completion always run inline on the
//! registering thread.

mod context;

pub mod event_loop;

pub use context::{ContextHandle, DispatchContext, Job, current_context, enter_context};
pub use event_loop::{EventLoop, LoopThread};

pub(crate) use context::is_current;

use crate::error::Panicked;
use crate::operation::OperationCore;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Callback stored by the operation core.
///
/// Receives the completed operation and whether this particular invocation
/// happened synchronously with the completion.
pub(crate) type Callback = Box<dyn FnOnce(&Arc<OperationCore>, bool) + Send + 'static>;

/// Identifies a registered continuation so it can be unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationToken(pub(crate) u64);

/// A callback paired with the dispatch context captured at registration.
pub(crate) struct Continuation {
    pub(crate) token: u64,
    callback: Callback,
    context: Option<ContextHandle>,
}

impl Continuation {
    pub(crate) fn new(token: u64, callback: Callback, context: Option<ContextHandle>) -> Self {
        Self {
            token,
            callback,
            context,
        }
    }

    /// Delivers the continuation after the terminal transition of `operation`.
    pub(crate) fn dispatch(self, operation: &Arc<OperationCore>, completed_synchronously: bool) {
        match self.context {
            Some(context) if !is_current(&context) => {
                tracing::trace!(
                    op.id = operation.id(),
                    token = self.token,
                    "posting continuation to captured context"
                );

                let operation = operation.clone();
                let callback = self.callback;

                context.post(Box::new(move || invoke(callback, &operation, false)));
            }
            _ => invoke(self.callback, operation, completed_synchronously),
        }
    }
}

/// Runs a callback, containing any panic at the dispatch boundary.
pub(crate) fn invoke(callback: Callback, operation: &Arc<OperationCore>, synchronously: bool) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| callback(operation, synchronously)));

    if let Err(payload) = result {
        let panicked = Panicked::from_payload(payload);
        tracing::warn!(op.id = operation.id(), error = %panicked, "continuation panicked");
    }
}
