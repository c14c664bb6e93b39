use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project::pin_project;

/// A stream that stops yielding items as soon as the enclosing task's
/// [`crucible_core::cancellation_watcher`] resolves, instead of running the
/// inner stream to exhaustion. This is how a MergeTree read stream
/// (§5: "the cancellation flag is polled between mark ranges") reacts to a
/// client disconnect or query timeout without threading an explicit token
/// through every layer.
#[pin_project]
pub struct TakeUntilCancelled<S> {
    #[pin]
    inner: S,
    cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,
    done: bool,
}

impl<S> TakeUntilCancelled<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cancelled: Box::pin(crucible_core::cancellation_watcher()),
            done: false,
        }
    }
}

impl<S: Stream> Stream for TakeUntilCancelled<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        if this.cancelled.as_mut().poll(cx).is_ready() {
            *this.done = true;
            return Poll::Ready(None);
        }
        this.inner.poll_next(cx)
    }
}

pub trait CancelableStreamExt: Stream + Sized {
    fn take_until_cancelled(self) -> TakeUntilCancelled<Self> {
        TakeUntilCancelled::new(self)
    }
}

impl<S: Stream> CancelableStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_core::{TaskCenterFactory, TaskKind};
    use futures::stream::{self, StreamExt};

    #[tokio::test]
    async fn stream_runs_to_completion_without_cancellation() {
        let tc = TaskCenterFactory::create(tokio::runtime::Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();
        tc.spawn_child(TaskKind::Disposable, "no-cancel", async move {
            let items: Vec<i32> = stream::iter(1..=3).take_until_cancelled().collect().await;
            let _ = tx.send(items);
            Ok(())
        });
        let items = rx.await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stream_stops_early_on_cancellation() {
        let tc = TaskCenterFactory::create(tokio::runtime::Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();
        tc.spawn_child(TaskKind::Disposable, "cancel-mid-stream", async move {
            let infinite = stream::repeat(1u32);
            let mut cancelable = infinite.take_until_cancelled();
            // first item observed before cancellation fires.
            let first = cancelable.next().await;
            let _ = tx.send(first);
            Ok(())
        });

        let first = rx.await.unwrap();
        assert_eq!(first, Some(1));
        tc.cancel_tasks(Some(std::time::Duration::from_secs(1)))
            .await;
    }
}
