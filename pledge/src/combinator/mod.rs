//! Operations built out of other operations.
//!
//! Every combinator returns a fresh [`Operation`](crate::Operation) driven
//! by continuations registered on its inputs. None of them cancel or
//! dispose the operations they observe.

mod all;
mod any;
mod retry;
mod timeout;

pub use all::{when_all, when_all_erased};
pub use any::when_any;
pub use retry::{RetryPolicy, retry};
pub use timeout::timeout;
