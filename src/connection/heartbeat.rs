//! Keepalive ticker driven by the peer's advertised idle timeout.

use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// A ticker that never fires when the peer advertised no idle timeout.
    #[derive(Debug)]
    pub(crate) struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>,
    }
}

impl HeartBeat {
    /// A [`HeartBeat`] that never yields.
    pub fn never() -> Self {
        Self { interval: None }
    }

    /// Ticks at `period`; the caller passes half the peer's idle timeout so
    /// a keepalive is always in flight well before the deadline.
    pub fn new(period: Duration) -> Self {
        let interval = tokio::time::interval(period);
        Self {
            interval: Some(IntervalStream::new(interval)),
        }
    }
}

impl Stream for HeartBeat {
    type Item = ();

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.interval.as_pin_mut() {
            Some(stream) => match stream.poll_next(cx) {
                Poll::Ready(Some(_)) => Poll::Ready(Some(())),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Pending,
        }
    }
}
