use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// A unit of work posted to a dispatch context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context continuations can be marshalled onto.
///
/// Implementations decide *where* a posted job runs (a specific thread,
/// an event loop, ...). Jobs posted to the same context must run in the
/// order they were posted.
pub trait DispatchContext: Send + Sync + 'static {
    /// Queues `job` for execution on this context.
    fn post(&self, job: Job);
}

/// Shared handle to a [`DispatchContext`].
///
/// Two handles are equal when they point at the same context instance.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<dyn DispatchContext>,
}

impl ContextHandle {
    /// Wraps a context into a new handle.
    pub fn new<C: DispatchContext>(context: C) -> Self {
        Self {
            inner: Arc::new(context),
        }
    }

    /// Wraps an already shared context.
    pub fn from_arc(inner: Arc<dyn DispatchContext>) -> Self {
        Self { inner }
    }

    /// Posts a job to the underlying context.
    pub fn post(&self, job: Job) {
        self.inner.post(job);
    }

    /// Returns `true` if both handles refer to the same context.
    pub fn same_as(&self, other: &ContextHandle) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for ContextHandle {}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextHandle").field(&self.addr()).finish()
    }
}

thread_local! {
    /// Dispatch context active on the current thread.
    ///
    /// Installed by [`enter_context`] and captured by continuation
    /// registrations that do not name a context explicitly.
    static CURRENT_CONTEXT: RefCell<Option<ContextHandle>> = const { RefCell::new(None) };
}

/// Returns the dispatch context active on the current thread, if any.
pub fn current_context() -> Option<ContextHandle> {
    CURRENT_CONTEXT.with(|cell| cell.borrow().clone())
}

/// Returns `true` if `context` is the one active on the current thread.
pub(crate) fn is_current(context: &ContextHandle) -> bool {
    CURRENT_CONTEXT.with(|cell| {
        cell.borrow()
            .as_ref()
            .is_some_and(|current| current.same_as(context))
    })
}

/// Runs `f` with `context` installed as the current dispatch context.
///
/// The previously active context is restored when `f` returns, including
/// when it unwinds.
pub fn enter_context<R>(context: ContextHandle, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_CONTEXT.with(|cell| cell.replace(Some(context)));
    let _restore = Restore(previous);

    f()
}

/// Reinstates the context that was active before [`enter_context`].
struct Restore(Option<ContextHandle>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_CONTEXT.with(|cell| {
            cell.replace(previous);
        });
    }
}
