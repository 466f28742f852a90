use super::SerialQueue;

/// Builder for configuring and creating a [`SerialQueue`].
///
/// # Examples
///
/// ```rust,ignore
/// let queue = QueueBuilder::new()
///     .max_concurrency(4)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    /// Maximum number of operations admitted at once.
    max_concurrency: usize,

    /// Whether the queue starts without admitting anything.
    suspended: bool,
}

impl QueueBuilder {
    /// Creates a builder for a serial queue: one operation at a time,
    /// admitting immediately.
    pub fn new() -> Self {
        Self {
            max_concurrency: 1,
            suspended: false,
        }
    }

    /// Sets how many admitted operations may be non-terminal at once.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        assert!(n > 0, "max_concurrency must be > 0");

        self.max_concurrency = n;
        self
    }

    /// Starts the queue suspended; call [`SerialQueue::resume`] to begin
    /// admitting.
    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }

    pub fn build(self) -> SerialQueue {
        SerialQueue::with_config(self.max_concurrency, self.suspended)
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
