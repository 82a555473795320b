//! Minimal runtime helpers shared by the broker and the logging layer.

use std::future::Future;
use std::io;
use tokio::runtime::{Builder, Handle};

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// Must not be called from inside a Tokio runtime; check
/// [`in_async_context`] first.
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: Future,
{
    let runtime = Builder::new_current_thread().enable_time().build()?;
    Ok(runtime.block_on(future))
}

/// Whether the current thread is inside a Tokio runtime.
pub fn in_async_context() -> bool {
    Handle::try_current().is_ok()
}
