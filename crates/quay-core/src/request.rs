//! Cancellable request handles for asynchronous remote operations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Handle to an in-flight asynchronous operation.
///
/// Returned immediately by manager operations; awaiting it yields the
/// operation's result. `cancel` aborts the underlying task, after which
/// awaiting resolves to [`Error::Cancelled`]. Dropping the handle detaches
/// the task and lets it run to completion.
#[derive(Debug)]
pub struct Request<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Request<T> {
    /// Spawn the operation onto the runtime and hand back its handle
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }
}

impl<T> Request<T> {
    /// Abort the underlying task
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the operation has finished (completed, failed, or cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for Request<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_error)) => {
                if join_error.is_cancelled() {
                    Poll::Ready(Err(Error::Cancelled))
                } else {
                    Poll::Ready(Err(Error::TaskFailed(join_error.to_string())))
                }
            }
        }
    }
}
